//! Authorization URLs for the Connect action.
//!
//! URLs come from the backend's auth-url map. When that call fails, or the
//! map lacks a usable entry, a fixed development URL is used so Connect
//! keeps working offline. Lookups never fail.

use crate::backend::Backend;
use crate::notify::{Notice, Notifier};
use crate::registry::Registry;
use crate::state::{StateSigner, StateToken, with_state};
use std::collections::HashMap;
use std::sync::Arc;
use switchboard_core::Service;
use tracing::{debug, instrument, warn};
use url::Url;

/// Where a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Backend,
    Fallback,
}

/// Hardcoded development authorization URL for a service.
#[must_use]
pub fn fallback_auth_url(service: Service) -> Url {
    let raw = match service {
        Service::HubSpot => {
            "https://app.hubspot.com/oauth/authorize?client_id=your-hubspot-client-id&redirect_uri=http://localhost:3000&scope=contacts+content+crm.objects.contacts.read+crm.objects.deals.read&state=hubspot-demo_user"
        }
        Service::Notion => {
            "https://api.notion.com/v1/oauth/authorize?client_id=your-notion-client-id&redirect_uri=http://localhost:3000&response_type=code&owner=user&state=notion-demo_user"
        }
        Service::Airtable => {
            "https://airtable.com/oauth2/v1/authorize?client_id=your-airtable-client-id&redirect_uri=http://localhost:3000&response_type=code&state=airtable-demo_user"
        }
    };
    Url::parse(raw).expect("fallback auth URLs are valid")
}

/// Supplies authorization URLs, falling back when the backend is down.
#[derive(Clone)]
pub struct AuthUrlProvider {
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    signer: Option<StateSigner>,
    user_id: String,
}

impl AuthUrlProvider {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            backend,
            notifier,
            signer: None,
            user_id: "demo_user".to_string(),
        }
    }

    /// Rewrites every handed-out URL's `state` to a token signed for
    /// `user_id`.
    #[must_use]
    pub fn with_signer(mut self, signer: StateSigner, user_id: impl Into<String>) -> Self {
        self.signer = Some(signer);
        self.user_id = user_id.into();
        self
    }

    /// The authorization URL for one service.
    #[instrument(skip(self))]
    pub async fn get_auth_url(&self, service: Service) -> Url {
        let urls = self.fetch().await;
        self.resolve(service, urls.as_ref()).0
    }

    /// Writes an authorization URL into every registry entry.
    ///
    /// Returns `Backend` only if every URL came from the backend.
    #[instrument(skip(self, registry))]
    pub async fn refresh(&self, registry: &Registry) -> Provenance {
        let urls = self.fetch().await;
        let mut overall = Provenance::Backend;
        for service in Service::ALL {
            let (url, provenance) = self.resolve(service, urls.as_ref());
            if provenance == Provenance::Fallback {
                overall = Provenance::Fallback;
            }
            registry.set_auth_url(service, Some(url));
        }
        overall
    }

    async fn fetch(&self) -> Option<HashMap<String, String>> {
        match self.backend.auth_urls().await {
            Ok(urls) => Some(urls),
            Err(e) => {
                warn!(error = %e, "using fallback auth urls");
                self.notifier.notify(Notice::error(
                    "Connection Error",
                    "Failed to setup authentication. Using mock data for development.",
                ));
                None
            }
        }
    }

    fn resolve(
        &self,
        service: Service,
        urls: Option<&HashMap<String, String>>,
    ) -> (Url, Provenance) {
        let fetched = urls
            .and_then(|urls| urls.get(service.slug()))
            .and_then(|raw| match Url::parse(raw) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(%service, error = %e, "backend auth url is invalid");
                    None
                }
            });

        let (url, provenance) = match fetched {
            Some(url) => (url, Provenance::Backend),
            None => {
                if urls.is_some() {
                    debug!(%service, "no auth url from backend");
                }
                (fallback_auth_url(service), Provenance::Fallback)
            }
        };

        (self.sign(service, url), provenance)
    }

    fn sign(&self, service: Service, url: Url) -> Url {
        let Some(signer) = &self.signer else {
            return url;
        };
        match signer.sign(&StateToken::new(service, self.user_id.clone())) {
            Ok(state) => with_state(&url, &state),
            Err(e) => {
                warn!(%service, error = %e, "could not sign state");
                url
            }
        }
    }
}
