//! Error types for the integration crate.
//!
//! Each layer owns its error type:
//! - `StorageError`: key/value storage backing the credential store
//! - `BackendError`: calls to the remote integrations API
//! - `StateError`: decoding the OAuth `state` parameter
//! - `CallbackError`: the OAuth callback flow as a whole
//! - `FetchError`: item retrieval for a connected service
//!
//! Callers that only need to report a failure wrap these in a
//! `rootcause::Report` via `switchboard_core::Result`.

use std::fmt;
use switchboard_core::Service;

/// Errors from the key/value store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Reading the backing storage failed.
    ReadFailed { reason: String },
    /// Writing the backing storage failed.
    WriteFailed { reason: String },
    /// The backing storage holds data that is not a string map.
    Corrupt { reason: String },
    /// A lock guarding in-memory state was poisoned.
    LockPoisoned,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed { reason } => write!(f, "storage read failed: {reason}"),
            Self::WriteFailed { reason } => write!(f, "storage write failed: {reason}"),
            Self::Corrupt { reason } => write!(f, "storage is corrupt: {reason}"),
            Self::LockPoisoned => write!(f, "storage lock poisoned"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Errors from the remote integrations API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The request never produced a response.
    NetworkUnavailable { reason: String },
    /// The server answered with a non-2xx status.
    NonSuccessStatus { status: u16 },
    /// The response body did not have the expected shape.
    InvalidResponse { reason: String },
}

impl BackendError {
    /// Whether repeating the same request later could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkUnavailable { .. } => true,
            Self::NonSuccessStatus { status } => *status == 429 || *status >= 500,
            Self::InvalidResponse { .. } => false,
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkUnavailable { reason } => write!(f, "backend unreachable: {reason}"),
            Self::NonSuccessStatus { status } => {
                write!(f, "backend returned status {status}")
            }
            Self::InvalidResponse { reason } => {
                write!(f, "invalid backend response: {reason}")
            }
        }
    }
}

impl std::error::Error for BackendError {}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::NonSuccessStatus {
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            Self::InvalidResponse {
                reason: err.to_string(),
            }
        } else {
            Self::NetworkUnavailable {
                reason: err.to_string(),
            }
        }
    }
}

/// Errors from decoding the OAuth `state` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// No known service could be derived from the state.
    UnknownService { state: String },
    /// The state looked like a signed token but could not be decoded.
    Malformed { reason: String },
    /// The signature did not match the payload.
    Tampered,
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownService { state } => {
                write!(f, "unknown integration for state '{state}'")
            }
            Self::Malformed { reason } => write!(f, "malformed state token: {reason}"),
            Self::Tampered => write!(f, "state token signature mismatch"),
        }
    }
}

impl std::error::Error for StateError {}

/// Errors that end an OAuth callback in the failed phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    /// The `state` parameter did not identify a service.
    UnknownServiceState { reason: StateError },
    /// The code exchange failed and no placeholder was allowed.
    Exchange {
        service: Service,
        error: BackendError,
    },
    /// The credential could not be persisted.
    Storage {
        service: Service,
        error: StorageError,
    },
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownServiceState { reason } => {
                write!(f, "unknown integration: {reason}")
            }
            Self::Exchange { service, error } => {
                write!(f, "token exchange with {service} failed: {error}")
            }
            Self::Storage { service, error } => {
                write!(f, "could not store {service} credential: {error}")
            }
        }
    }
}

impl std::error::Error for CallbackError {}

/// Errors from fetching integration items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// No credential is stored for the service.
    MissingCredential { service: String },
    /// The backend call failed.
    Backend {
        service: Service,
        error: BackendError,
    },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredential { service } => {
                write!(f, "no token available for {service}")
            }
            Self::Backend { service, error } => {
                write!(f, "failed to fetch {service} items: {error}")
            }
        }
    }
}

impl std::error::Error for FetchError {}
