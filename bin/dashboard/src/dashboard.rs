//! The dashboard controller.
//!
//! Ties the registry, credentials, auth URLs, callback handling and item
//! fetching together behind the user-facing actions: connect, disconnect,
//! view items, and returning from an OAuth redirect.

use crate::config::DashboardConfig;
use crate::error::DashboardError;
use chrono::Utc;
use oauth2::AccessToken;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use switchboard_core::{Result, Service};
use switchboard_integration::{
    AuthUrlProvider, Backend, CallbackHandler, CallbackOutcome, CallbackParams,
    CredentialStore, FetchOutcome, FileStore, HttpBackend, IntegrationConfig, IntegrationItem,
    ItemFetcher, MemoryStore, Notice, Notifier, Provenance, Registry, ServiceDescriptor,
    strip_callback_params,
};
use tokio::sync::watch;
use tracing::{info, instrument, warn};
use url::Url;

/// What the Connect action did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectAction {
    /// No authorization URL is known; nothing changed.
    Unavailable,
    /// A placeholder credential was stored without leaving the dashboard.
    Simulated,
    /// The user should be sent to this authorization URL.
    Redirect(Url),
}

/// Result of loading a page address.
#[derive(Debug, Clone)]
pub struct PageLoad {
    /// Set when the address carried an OAuth callback.
    pub callback: Option<CallbackOutcome>,
    /// The address with callback parameters removed.
    pub address: Url,
}

/// Local and remote view of one service's authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthStatus {
    pub service: Service,
    /// A credential is stored locally.
    pub stored: bool,
    /// The backend's answer; `None` if it could not be asked.
    pub backend: Option<bool>,
}

/// Counts in-flight fetches for the loading indicator.
struct Loading<'a>(&'a AtomicUsize);

impl<'a> Loading<'a> {
    fn start(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// State and actions behind the integrations dashboard.
pub struct Dashboard {
    registry: Registry,
    credentials: CredentialStore,
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    auth_urls: AuthUrlProvider,
    callbacks: CallbackHandler,
    fetcher: ItemFetcher,
    simulate_connect: bool,
    items: watch::Sender<Vec<IntegrationItem>>,
    in_flight: AtomicUsize,
}

impl Dashboard {
    /// Builds a dashboard over the given backend and credential store.
    #[must_use]
    pub fn new(
        backend: Arc<dyn Backend>,
        credentials: CredentialStore,
        notifier: Arc<dyn Notifier>,
        config: &IntegrationConfig,
    ) -> Self {
        let registry = Registry::new();
        let signer = config.signer();

        let mut auth_urls = AuthUrlProvider::new(backend.clone(), notifier.clone());
        if let Some(signer) = signer.clone() {
            auth_urls = auth_urls.with_signer(signer, config.user_id.clone());
        }

        let callbacks = CallbackHandler::new(
            backend.clone(),
            credentials.clone(),
            registry.clone(),
            notifier.clone(),
        )
        .with_signer(signer)
        .with_legacy_state(config.accept_legacy_state)
        .with_placeholder_on_failure(config.fallback.mock_on_failure);

        let fetcher = ItemFetcher::new(backend.clone(), credentials.clone(), notifier.clone())
            .with_mock_on_failure(config.fallback.mock_on_failure);

        let (items, _rx) = watch::channel(Vec::new());
        Self {
            registry,
            credentials,
            backend,
            notifier,
            auth_urls,
            callbacks,
            fetcher,
            simulate_connect: config.fallback.simulate_connect,
            items,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Builds a dashboard talking HTTP to the configured API.
    #[must_use]
    pub fn from_config(config: &DashboardConfig, notifier: Arc<dyn Notifier>) -> Self {
        let integration = &config.integration;
        let backend = HttpBackend::new(config.api_base_url.clone(), integration.contract)
            .with_identity(integration.user_id.clone(), integration.org_id.clone());

        let credentials = match &config.storage_path {
            Some(path) => CredentialStore::new(Arc::new(FileStore::new(path.clone()))),
            None => {
                info!("credentials are kept in memory for this run");
                CredentialStore::new(Arc::new(MemoryStore::new()))
            }
        };

        Self::new(Arc::new(backend), credentials, notifier, integration)
    }

    /// Recomputes connection flags from storage and fetches auth URLs.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Provenance {
        self.registry.sync_from(&self.credentials);
        let provenance = self.auth_urls.refresh(&self.registry).await;
        info!(?provenance, "dashboard loaded");
        provenance
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn services(&self) -> Vec<ServiceDescriptor> {
        self.registry.list()
    }

    /// Items currently on display.
    #[must_use]
    pub fn items(&self) -> Vec<IntegrationItem> {
        self.items.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_items(&self) -> watch::Receiver<Vec<IntegrationItem>> {
        self.items.subscribe()
    }

    /// Whether an item fetch is running.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Starts connecting a service.
    ///
    /// # Errors
    ///
    /// Returns an error if a simulated credential cannot be stored.
    #[instrument(skip(self))]
    pub async fn connect(&self, service: Service) -> Result<ConnectAction, DashboardError> {
        let Some(auth_url) = self.registry.get(service).and_then(|d| d.auth_url) else {
            warn!(%service, "connect without auth url");
            self.notifier.notify(Notice::error(
                "Connection Error",
                "Authentication URL not available. Please try again later.",
            ));
            return Ok(ConnectAction::Unavailable);
        };

        if !self.simulate_connect {
            info!(%service, "redirecting to authorization url");
            return Ok(ConnectAction::Redirect(auth_url));
        }

        let token = AccessToken::new(format!(
            "mock-{}-token-{}",
            service.slug(),
            Utc::now().timestamp_millis()
        ));
        self.credentials
            .connect(service, &token)
            .map_err(DashboardError::from)?;
        self.registry.set_connected(service, true);
        self.notifier.notify(Notice::info(
            "Connection Successful",
            format!("Successfully connected to {}!", service.display_name()),
        ));
        info!(%service, "simulated connection");

        self.view_items(service).await;
        Ok(ConnectAction::Simulated)
    }

    /// Removes a service's credential and clears the item list.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential cannot be removed.
    #[instrument(skip(self))]
    pub fn disconnect(&self, service: Service) -> Result<(), DashboardError> {
        self.credentials
            .disconnect(service)
            .map_err(DashboardError::from)?;
        self.registry.set_connected(service, false);
        self.items.send_replace(Vec::new());
        self.notifier.notify(Notice::info(
            "Disconnected",
            format!("Successfully disconnected from {}.", service.display_name()),
        ));
        info!(%service, "disconnected");
        Ok(())
    }

    /// Fetches a service's items and puts them on display.
    ///
    /// Overlapping calls each replace the list when they finish.
    #[instrument(skip(self))]
    pub async fn view_items(&self, service: Service) -> FetchOutcome {
        let _loading = Loading::start(&self.in_flight);
        let outcome = self.fetcher.fetch_items(service).await;
        self.items.send_replace(outcome.items().to_vec());
        outcome
    }

    /// Handles a page address, completing an OAuth callback if present.
    #[instrument(skip_all)]
    pub async fn handle_page_load(&self, address: &Url) -> PageLoad {
        let Some(params) = CallbackParams::from_url(address) else {
            return PageLoad {
                callback: None,
                address: address.clone(),
            };
        };

        let outcome = {
            let _loading = Loading::start(&self.in_flight);
            self.callbacks.handle(&params).await
        };
        if let Some(service) = outcome.connected_service() {
            self.view_items(service).await;
        }

        PageLoad {
            callback: Some(outcome),
            address: strip_callback_params(address),
        }
    }

    /// Compares the stored credential with the backend's view.
    #[instrument(skip(self))]
    pub async fn status(&self, service: Service) -> AuthStatus {
        let backend = match self.backend.check_auth(service).await {
            Ok(authorized) => Some(authorized),
            Err(e) => {
                warn!(%service, error = %e, "auth check failed");
                None
            }
        };
        AuthStatus {
            service,
            stored: self.credentials.is_connected(service),
            backend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use oauth2::AuthorizationCode;
    use std::collections::HashMap;
    use switchboard_integration::{
        BackendError, CredentialSource, RecordingNotifier, TokenGrant, mock_items,
    };

    /// A backend that is down for everything.
    struct OfflineBackend;

    fn offline() -> BackendError {
        BackendError::NetworkUnavailable {
            reason: "connection refused".to_string(),
        }
    }

    #[async_trait]
    impl Backend for OfflineBackend {
        async fn auth_urls(&self) -> std::result::Result<HashMap<String, String>, BackendError> {
            Err(offline())
        }

        async fn exchange_code(
            &self,
            _service: Service,
            _code: &AuthorizationCode,
            _state: &str,
        ) -> std::result::Result<TokenGrant, BackendError> {
            Err(offline())
        }

        async fn items(
            &self,
            _service: Service,
            _token: &AccessToken,
        ) -> std::result::Result<Vec<IntegrationItem>, BackendError> {
            Err(offline())
        }

        async fn check_auth(&self, _service: Service) -> std::result::Result<bool, BackendError> {
            Err(offline())
        }
    }

    /// A backend with auth URLs and live items for every service.
    struct OnlineBackend;

    #[async_trait]
    impl Backend for OnlineBackend {
        async fn auth_urls(&self) -> std::result::Result<HashMap<String, String>, BackendError> {
            Ok(Service::ALL
                .into_iter()
                .map(|s| {
                    (
                        s.slug().to_string(),
                        format!("https://auth.example.com/{}?state={}-u", s.slug(), s.slug()),
                    )
                })
                .collect())
        }

        async fn exchange_code(
            &self,
            _service: Service,
            _code: &AuthorizationCode,
            _state: &str,
        ) -> std::result::Result<TokenGrant, BackendError> {
            Ok(TokenGrant {
                access_token: Some(AccessToken::new("live-token".to_string())),
                refresh_token: None,
                expires_in: None,
            })
        }

        async fn items(
            &self,
            service: Service,
            _token: &AccessToken,
        ) -> std::result::Result<Vec<IntegrationItem>, BackendError> {
            Ok(mock_items(service).into_iter().take(1).collect())
        }

        async fn check_auth(&self, _service: Service) -> std::result::Result<bool, BackendError> {
            Ok(true)
        }
    }

    fn dashboard(
        backend: impl Backend + 'static,
        credentials: CredentialStore,
        config: &IntegrationConfig,
    ) -> (Dashboard, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::new());
        let dashboard = Dashboard::new(Arc::new(backend), credentials, notifier.clone(), config);
        (dashboard, notifier)
    }

    fn address(raw: &str) -> Url {
        Url::parse(raw).expect("url")
    }

    #[tokio::test]
    async fn offline_load_still_offers_every_service() {
        let (dashboard, _notifier) = dashboard(
            OfflineBackend,
            CredentialStore::in_memory(),
            &IntegrationConfig::default(),
        );
        assert_eq!(dashboard.load().await, Provenance::Fallback);

        let services = dashboard.services();
        assert_eq!(services.len(), 3);
        assert!(services.iter().all(|d| d.auth_url.is_some()));
        assert!(services.iter().all(|d| !d.is_connected));
    }

    #[tokio::test]
    async fn simulated_connect_then_disconnect() {
        let credentials = CredentialStore::in_memory();
        let (dashboard, notifier) = dashboard(
            OfflineBackend,
            credentials.clone(),
            &IntegrationConfig::default(),
        );
        dashboard.load().await;
        notifier.drain();

        let action = dashboard.connect(Service::Notion).await.expect("connect");
        assert_eq!(action, ConnectAction::Simulated);
        let token = credentials
            .token(Service::Notion)
            .expect("read")
            .expect("token");
        assert!(token.secret().starts_with("mock-notion-token-"));
        assert!(dashboard.registry().get(Service::Notion).expect("notion").is_connected);
        assert_eq!(dashboard.items().len(), 2);
        assert!(!dashboard.is_loading());

        let titles: Vec<String> = notifier.drain().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["Connection Successful", "Success"]);

        dashboard.disconnect(Service::Notion).expect("disconnect");
        assert!(!credentials.is_connected(Service::Notion));
        assert!(!dashboard.registry().get(Service::Notion).expect("notion").is_connected);
        assert!(dashboard.items().is_empty());
        assert_eq!(
            notifier.drain()[0].description,
            "Successfully disconnected from Notion."
        );
    }

    #[tokio::test]
    async fn connect_redirects_when_simulation_is_off() {
        let mut config = IntegrationConfig::default();
        config.fallback.simulate_connect = false;
        let credentials = CredentialStore::in_memory();
        let (dashboard, _notifier) = dashboard(OnlineBackend, credentials.clone(), &config);
        dashboard.load().await;

        let action = dashboard.connect(Service::Airtable).await.expect("connect");
        assert_eq!(
            action,
            ConnectAction::Redirect(address("https://auth.example.com/airtable?state=airtable-u"))
        );
        assert!(!credentials.is_connected(Service::Airtable));
    }

    #[tokio::test]
    async fn connect_without_auth_url_is_unavailable() {
        let credentials = CredentialStore::in_memory();
        let (dashboard, notifier) = dashboard(
            OnlineBackend,
            credentials.clone(),
            &IntegrationConfig::default(),
        );

        // No load(): the registry has no URLs yet.
        let action = dashboard.connect(Service::HubSpot).await.expect("connect");
        assert_eq!(action, ConnectAction::Unavailable);
        assert!(!credentials.is_connected(Service::HubSpot));

        let notices = notifier.drain();
        assert_eq!(notices.len(), 1);
        assert_eq!(
            notices[0].description,
            "Authentication URL not available. Please try again later."
        );
    }

    #[tokio::test]
    async fn callback_page_load_connects_and_strips_address() {
        let credentials = CredentialStore::in_memory();
        let (dashboard, _notifier) = dashboard(
            OnlineBackend,
            credentials.clone(),
            &IntegrationConfig::default(),
        );
        dashboard.load().await;

        let page = dashboard
            .handle_page_load(&address(
                "http://localhost:3000/?code=abc&state=xyz-hubspot-demo_user",
            ))
            .await;

        match page.callback {
            Some(CallbackOutcome::Connected { service, source }) => {
                assert_eq!(service, Service::HubSpot);
                assert_eq!(source, CredentialSource::Exchanged);
            }
            other => panic!("unexpected callback: {other:?}"),
        }
        assert_eq!(page.address.as_str(), "http://localhost:3000/");
        assert_eq!(
            credentials
                .token(Service::HubSpot)
                .expect("read")
                .expect("token")
                .secret(),
            "live-token"
        );
        assert_eq!(dashboard.items().len(), 1);

        // Reloading the stripped address does nothing further.
        let reload = dashboard.handle_page_load(&page.address).await;
        assert!(reload.callback.is_none());
    }

    #[tokio::test]
    async fn failed_callback_changes_nothing() {
        let (dashboard, notifier) = dashboard(
            OnlineBackend,
            CredentialStore::in_memory(),
            &IntegrationConfig::default(),
        );
        dashboard.load().await;
        notifier.drain();

        let page = dashboard
            .handle_page_load(&address(
                "http://localhost:3000/?code=abc&state=salesforce-demo_user",
            ))
            .await;

        assert!(matches!(page.callback, Some(CallbackOutcome::Failed { .. })));
        assert!(dashboard.services().iter().all(|d| !d.is_connected));
        assert!(dashboard.items().is_empty());
        assert_eq!(notifier.drain()[0].title, "Authentication Error");
    }

    #[tokio::test]
    async fn stored_credentials_survive_a_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("credentials.json");
        let config = IntegrationConfig::default();

        {
            let credentials = CredentialStore::new(Arc::new(FileStore::new(path.clone())));
            let (dashboard, _notifier) = dashboard(OfflineBackend, credentials, &config);
            dashboard.load().await;
            dashboard.connect(Service::Airtable).await.expect("connect");
        }

        let credentials = CredentialStore::new(Arc::new(FileStore::new(path)));
        let (dashboard, _notifier) = dashboard(OfflineBackend, credentials, &config);
        dashboard.load().await;
        let connected: Vec<Service> = dashboard
            .services()
            .into_iter()
            .filter(|d| d.is_connected)
            .map(|d| d.service)
            .collect();
        assert_eq!(connected, vec![Service::Airtable]);
    }

    #[tokio::test]
    async fn view_items_without_credential_clears_display() {
        let (dashboard, notifier) = dashboard(
            OnlineBackend,
            CredentialStore::in_memory(),
            &IntegrationConfig::default(),
        );

        let outcome = dashboard.view_items(Service::HubSpot).await;
        assert!(matches!(outcome, FetchOutcome::NotConnected { .. }));
        assert!(dashboard.items().is_empty());
        assert_eq!(
            notifier.drain()[0].description,
            "Failed to fetch items from hubspot"
        );
    }

    #[tokio::test]
    async fn status_reports_both_sides() {
        let (online, _n) = dashboard(
            OnlineBackend,
            CredentialStore::in_memory(),
            &IntegrationConfig::default(),
        );
        assert_eq!(
            online.status(Service::Notion).await,
            AuthStatus {
                service: Service::Notion,
                stored: false,
                backend: Some(true),
            }
        );

        let (offline, _n) = dashboard(
            OfflineBackend,
            CredentialStore::in_memory(),
            &IntegrationConfig::default(),
        );
        assert_eq!(offline.status(Service::Notion).await.backend, None);
    }
}
