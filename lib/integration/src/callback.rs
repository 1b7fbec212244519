//! OAuth callback handling.
//!
//! When the page is loaded with `code` and `state`, the handler moves
//! `Idle -> Resolving -> Connected | Failed`:
//!
//! 1. Resolve the target service from `state`.
//! 2. Exchange the code with the backend. The result is classified as
//!    success, retryable failure, or terminal failure.
//! 3. On success, or on failure when placeholder credentials are allowed,
//!    persist the credential and mark the service connected.

use crate::backend::{Backend, TokenGrant};
use crate::credential::CredentialStore;
use crate::error::{BackendError, CallbackError};
use crate::notify::{Notice, Notifier};
use crate::registry::Registry;
use crate::state::{StateSigner, resolve_service};
use chrono::Utc;
use oauth2::{AccessToken, AuthorizationCode};
use std::fmt;
use std::sync::Arc;
use switchboard_core::Service;
use tokio::sync::watch;
use tracing::{info, instrument, warn};
use url::Url;

/// The `code`/`state` pair delivered to the redirect URI.
#[derive(Debug, Clone)]
pub struct CallbackParams {
    pub code: AuthorizationCode,
    pub state: String,
}

impl CallbackParams {
    #[must_use]
    pub fn new(code: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            code: AuthorizationCode::new(code.into()),
            state: state.into(),
        }
    }

    /// Extracts the pair from a page address; both must be present and
    /// non-empty.
    #[must_use]
    pub fn from_url(url: &Url) -> Option<Self> {
        let mut code = None;
        let mut state = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" if code.is_none() => code = Some(value.into_owned()),
                "state" if state.is_none() => state = Some(value.into_owned()),
                _ => {}
            }
        }
        match (code, state) {
            (Some(code), Some(state)) if !code.is_empty() && !state.is_empty() => {
                Some(Self::new(code, state))
            }
            _ => None,
        }
    }
}

/// Returns `url` without `code` and `state`, so a reload does not replay
/// the exchange.
#[must_use]
pub fn strip_callback_params(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "code" && key != "state")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut stripped = url.clone();
    if kept.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(kept);
    }
    stripped
}

/// Where a callback currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackPhase {
    Idle,
    Resolving,
    Connected,
    Failed,
}

impl fmt::Display for CallbackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Connected => "connected",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Classified result of a code exchange.
#[derive(Debug, Clone)]
pub enum ExchangeOutcome {
    Success(AccessToken),
    /// Repeating the exchange later might work.
    Retryable(BackendError),
    /// The exchange will not succeed as issued.
    Terminal(BackendError),
}

impl From<Result<TokenGrant, BackendError>> for ExchangeOutcome {
    fn from(result: Result<TokenGrant, BackendError>) -> Self {
        match result {
            Ok(TokenGrant {
                access_token: Some(token),
                ..
            }) => Self::Success(token),
            Ok(_) => Self::Terminal(BackendError::InvalidResponse {
                reason: "response carried no access token".to_string(),
            }),
            Err(e) if e.is_retryable() => Self::Retryable(e),
            Err(e) => Self::Terminal(e),
        }
    }
}

/// How the stored credential was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Returned by the backend.
    Exchanged,
    /// Synthesized because the exchange failed.
    Placeholder { cause: BackendError },
}

/// Final result of handling a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Connected {
        service: Service,
        source: CredentialSource,
    },
    Failed {
        error: CallbackError,
    },
}

impl CallbackOutcome {
    /// The service that ended up connected, if any.
    #[must_use]
    pub fn connected_service(&self) -> Option<Service> {
        match self {
            Self::Connected { service, .. } => Some(*service),
            Self::Failed { .. } => None,
        }
    }
}

/// A placeholder bearer token for development without a backend.
#[must_use]
pub fn placeholder_token() -> AccessToken {
    AccessToken::new(format!("mock-token-{}", Utc::now().timestamp_millis()))
}

/// Runs the callback state machine.
pub struct CallbackHandler {
    backend: Arc<dyn Backend>,
    credentials: CredentialStore,
    registry: Registry,
    notifier: Arc<dyn Notifier>,
    signer: Option<StateSigner>,
    accept_legacy_state: bool,
    placeholder_on_failure: bool,
    phase: watch::Sender<CallbackPhase>,
}

impl CallbackHandler {
    #[must_use]
    pub fn new(
        backend: Arc<dyn Backend>,
        credentials: CredentialStore,
        registry: Registry,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (phase, _rx) = watch::channel(CallbackPhase::Idle);
        Self {
            backend,
            credentials,
            registry,
            notifier,
            signer: None,
            accept_legacy_state: true,
            placeholder_on_failure: true,
            phase,
        }
    }

    /// Verifies signed state with `signer`.
    #[must_use]
    pub fn with_signer(mut self, signer: Option<StateSigner>) -> Self {
        self.signer = signer;
        self
    }

    /// Whether unsigned `state` strings are matched by service name.
    #[must_use]
    pub fn with_legacy_state(mut self, accept: bool) -> Self {
        self.accept_legacy_state = accept;
        self
    }

    /// Whether a failed exchange still connects with a placeholder token.
    #[must_use]
    pub fn with_placeholder_on_failure(mut self, enabled: bool) -> Self {
        self.placeholder_on_failure = enabled;
        self
    }

    #[must_use]
    pub fn phase(&self) -> CallbackPhase {
        *self.phase.borrow()
    }

    /// Receiver observing phase transitions.
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<CallbackPhase> {
        self.phase.subscribe()
    }

    fn enter(&self, phase: CallbackPhase) {
        self.phase.send_replace(phase);
    }

    fn fail(&self, error: CallbackError) -> CallbackOutcome {
        warn!(error = %error, "oauth callback failed");
        self.notifier.notify(Notice::error(
            "Authentication Error",
            "Failed to complete authentication. Please try again.",
        ));
        self.enter(CallbackPhase::Failed);
        CallbackOutcome::Failed { error }
    }

    /// Handles one callback.
    #[instrument(skip_all)]
    pub async fn handle(&self, params: &CallbackParams) -> CallbackOutcome {
        self.enter(CallbackPhase::Resolving);

        let service = match resolve_service(
            &params.state,
            self.signer.as_ref(),
            self.accept_legacy_state,
        ) {
            Ok(service) => service,
            Err(reason) => return self.fail(CallbackError::UnknownServiceState { reason }),
        };
        info!(%service, "resolved callback service");

        let outcome: ExchangeOutcome = self
            .backend
            .exchange_code(service, &params.code, &params.state)
            .await
            .into();

        let (token, source) = match outcome {
            ExchangeOutcome::Success(token) => (token, CredentialSource::Exchanged),
            ExchangeOutcome::Retryable(error) | ExchangeOutcome::Terminal(error)
                if self.placeholder_on_failure =>
            {
                warn!(%service, error = %error, "token exchange failed, using placeholder credential");
                (placeholder_token(), CredentialSource::Placeholder { cause: error })
            }
            ExchangeOutcome::Retryable(error) | ExchangeOutcome::Terminal(error) => {
                return self.fail(CallbackError::Exchange { service, error });
            }
        };

        if let Err(error) = self.credentials.connect(service, &token) {
            return self.fail(CallbackError::Storage { service, error });
        }
        self.registry.set_connected(service, true);

        self.notifier.notify(Notice::info(
            "Connection Successful",
            format!("Successfully connected to {}!", service.display_name()),
        ));
        self.enter(CallbackPhase::Connected);
        info!(%service, placeholder = matches!(source, CredentialSource::Placeholder { .. }), "integration connected");

        CallbackOutcome::Connected { service, source }
    }
}
