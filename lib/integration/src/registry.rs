//! Integration registry.
//!
//! Holds one [`ServiceDescriptor`] per known service. All mutation goes
//! through [`Registry::update`]; subscribers receive a fresh snapshot after
//! every update that changed something.

use crate::credential::CredentialStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use switchboard_core::Service;
use tokio::sync::watch;
use tracing::debug;
use url::Url;

/// Display and connection state of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    pub service: Service,
    pub name: String,
    pub description: String,
    pub icon: Url,
    /// Where the Connect action sends the user, once known.
    pub auth_url: Option<Url>,
    /// Mirrors credential presence as of the last resync.
    pub is_connected: bool,
}

impl ServiceDescriptor {
    /// A disconnected descriptor with no authorization URL.
    #[must_use]
    pub fn new(service: Service) -> Self {
        Self {
            service,
            name: service.display_name().to_string(),
            description: service.description().to_string(),
            icon: Url::parse(service.icon()).expect("catalogue icon URLs are valid"),
            auth_url: None,
            is_connected: false,
        }
    }
}

/// Store of service descriptors with change notification.
#[derive(Debug, Clone)]
pub struct Registry {
    tx: Arc<watch::Sender<Vec<ServiceDescriptor>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates the registry with every known service, disconnected.
    #[must_use]
    pub fn new() -> Self {
        let descriptors = Service::ALL.into_iter().map(ServiceDescriptor::new).collect();
        let (tx, _rx) = watch::channel(descriptors);
        Self { tx: Arc::new(tx) }
    }

    /// Snapshot of all descriptors in registry order.
    #[must_use]
    pub fn list(&self) -> Vec<ServiceDescriptor> {
        self.tx.borrow().clone()
    }

    /// Snapshot of one descriptor.
    #[must_use]
    pub fn get(&self, service: Service) -> Option<ServiceDescriptor> {
        self.tx
            .borrow()
            .iter()
            .find(|descriptor| descriptor.service == service)
            .cloned()
    }

    /// Receiver that observes every changing update.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<ServiceDescriptor>> {
        self.tx.subscribe()
    }

    /// Applies `apply` to the service's descriptor.
    ///
    /// Returns whether the descriptor changed. Subscribers are only
    /// notified when it did.
    pub fn update(&self, service: Service, apply: impl FnOnce(&mut ServiceDescriptor)) -> bool {
        self.tx.send_if_modified(|descriptors| {
            let Some(descriptor) = descriptors.iter_mut().find(|d| d.service == service) else {
                return false;
            };
            let before = descriptor.clone();
            apply(descriptor);
            let changed = *descriptor != before;
            if changed {
                debug!(%service, "registry entry updated");
            }
            changed
        })
    }

    /// Sets the connection flag.
    pub fn set_connected(&self, service: Service, connected: bool) -> bool {
        self.update(service, |descriptor| descriptor.is_connected = connected)
    }

    /// Sets the authorization URL.
    pub fn set_auth_url(&self, service: Service, auth_url: Option<Url>) -> bool {
        self.update(service, |descriptor| descriptor.auth_url = auth_url)
    }

    /// Recomputes every connection flag from stored credentials.
    pub fn sync_from(&self, credentials: &CredentialStore) {
        for service in Service::ALL {
            self.set_connected(service, credentials.is_connected(service));
        }
    }
}
