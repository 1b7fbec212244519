//! Connection lifecycle for third-party integrations.
//!
//! This crate provides:
//!
//! - **Registry**: the known services and their connection state
//! - **Credential store**: persisted bearer tokens, one per service
//! - **Backend**: the remote integrations API
//! - **Auth URLs and callbacks**: both halves of the OAuth redirect flow
//! - **Item fetcher**: items of connected services, with sample fallback

pub mod auth_url;
pub mod backend;
pub mod callback;
pub mod config;
pub mod credential;
pub mod error;
pub mod items;
pub mod notify;
pub mod registry;
pub mod state;

pub use auth_url::{AuthUrlProvider, Provenance, fallback_auth_url};
pub use backend::{ApiContract, Backend, HttpBackend, TokenGrant};
pub use callback::{
    CallbackHandler, CallbackOutcome, CallbackParams, CallbackPhase, CredentialSource,
    ExchangeOutcome, strip_callback_params,
};
pub use config::{FallbackPolicy, IntegrationConfig};
pub use credential::{CredentialStore, FileStore, KeyValueStore, MemoryStore};
pub use error::{BackendError, CallbackError, FetchError, StateError, StorageError};
pub use items::{FetchOutcome, IntegrationItem, ItemFetcher, mock_items};
pub use notify::{
    ChannelNotifier, Notice, NoticeLevel, Notifier, RecordingNotifier, TracingNotifier,
};
pub use registry::{Registry, ServiceDescriptor};
pub use state::{StateSigner, StateToken, resolve_service};
