//! Integration items and the fetcher that retrieves them.
//!
//! A fetch needs a stored credential. With one, the backend is asked for
//! the service's items; if that fails, the fixed sample list for the service
//! can stand in so the dashboard still has something to show.

use crate::backend::Backend;
use crate::credential::CredentialStore;
use crate::error::FetchError;
use crate::notify::{Notice, Notifier};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use std::sync::Arc;
use switchboard_core::{FetchId, Service};
use tracing::{info, instrument, warn};

/// A normalized record (contact, deal, page, ...) from a connected service.
///
/// Fields are kept as the backend sent them. Timestamps and links are not
/// validated: services leave them empty when unknown, and rendering shows
/// them verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
}

/// Sample items shown when the backend cannot be reached.
#[must_use]
pub fn mock_items(service: Service) -> Vec<IntegrationItem> {
    let icon = service.icon();
    let raw = match service {
        Service::HubSpot => json!([
            {
                "id": "1",
                "name": "John Doe",
                "description": "Email: john@example.com",
                "type": "contact",
                "icon": icon,
                "created_at": "2023-01-01T12:00:00Z",
                "created_by": "System",
                "updated_at": "2023-01-15T14:30:00Z",
                "url": "https://app.hubspot.com/contacts/1/contact/1",
                "metadata": {
                    "email": "john@example.com",
                    "phone": "+1234567890",
                    "company": "ABC Corp",
                    "website": "https://example.com"
                }
            },
            {
                "id": "2",
                "name": "New Business Deal",
                "description": "Amount: $5000 - Stage: Proposal",
                "type": "deal",
                "icon": icon,
                "created_at": "2023-02-01T10:00:00Z",
                "created_by": "System",
                "updated_at": "2023-02-10T16:45:00Z",
                "url": "https://app.hubspot.com/contacts/2/deal/2",
                "metadata": {
                    "amount": "5000",
                    "stage": "proposal",
                    "close_date": "2023-03-15",
                    "pipeline": "default"
                }
            }
        ]),
        Service::Notion => json!([
            {
                "id": "1",
                "name": "Project Planning",
                "description": "Notes for Q2 planning",
                "type": "page",
                "icon": icon,
                "created_at": "2023-01-05T08:30:00Z",
                "created_by": "User",
                "updated_at": "2023-01-18T11:20:00Z",
                "url": "https://notion.so/Project-Planning-123",
                "metadata": {
                    "tags": ["planning", "q2", "goals"],
                    "status": "in_progress",
                    "parent_page": "Team Workspace"
                }
            },
            {
                "id": "2",
                "name": "Meeting Notes",
                "description": "Weekly sync notes with team",
                "type": "page",
                "icon": icon,
                "created_at": "2023-02-12T15:45:00Z",
                "created_by": "User",
                "updated_at": "2023-02-12T17:00:00Z",
                "url": "https://notion.so/Meeting-Notes-456",
                "metadata": {
                    "tags": ["meeting", "notes", "weekly"],
                    "attendees": ["John", "Mary", "Steve"],
                    "follow_ups": 3
                }
            }
        ]),
        Service::Airtable => json!([
            {
                "id": "rec123abc",
                "name": "Customer Feedback",
                "description": "Record from Feedback table",
                "type": "record",
                "icon": icon,
                "created_at": "2023-01-10T09:15:00Z",
                "created_by": "User",
                "updated_at": "2023-01-20T16:30:00Z",
                "url": "https://airtable.com/tblxyz/rec123abc",
                "metadata": {
                    "rating": "5 stars",
                    "category": "UI/UX",
                    "status": "Reviewed",
                    "priority": "High"
                }
            },
            {
                "id": "rec456def",
                "name": "Product Roadmap",
                "description": "Feature planning document",
                "type": "record",
                "icon": icon,
                "created_at": "2023-02-05T11:45:00Z",
                "created_by": "User",
                "updated_at": "2023-02-15T10:20:00Z",
                "url": "https://airtable.com/tblxyz/rec456def",
                "metadata": {
                    "quarter": "Q2",
                    "team": "Product",
                    "status": "In Progress",
                    "dependencies": 2
                }
            }
        ]),
    };

    serde_json::from_value(raw).unwrap_or_else(|e| {
        warn!(%service, error = %e, "sample items failed to decode");
        Vec::new()
    })
}

/// Result of one item fetch.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Items came from the backend.
    Live(Vec<IntegrationItem>),
    /// The backend failed; sample items stand in.
    Fallback {
        items: Vec<IntegrationItem>,
        error: FetchError,
    },
    /// No credential for the service; nothing was requested.
    NotConnected { error: FetchError },
    /// The backend failed and sample items were not allowed.
    Failed { error: FetchError },
}

impl FetchOutcome {
    /// Items to display; empty unless the fetch produced some.
    #[must_use]
    pub fn items(&self) -> &[IntegrationItem] {
        match self {
            Self::Live(items) | Self::Fallback { items, .. } => items,
            Self::NotConnected { .. } | Self::Failed { .. } => &[],
        }
    }

    #[must_use]
    pub fn into_items(self) -> Vec<IntegrationItem> {
        match self {
            Self::Live(items) | Self::Fallback { items, .. } => items,
            Self::NotConnected { .. } | Self::Failed { .. } => Vec::new(),
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&FetchError> {
        match self {
            Self::Live(_) => None,
            Self::Fallback { error, .. }
            | Self::NotConnected { error }
            | Self::Failed { error } => Some(error),
        }
    }

    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Retrieves items for connected services.
#[derive(Clone)]
pub struct ItemFetcher {
    backend: Arc<dyn Backend>,
    credentials: CredentialStore,
    notifier: Arc<dyn Notifier>,
    mock_on_failure: bool,
}

impl ItemFetcher {
    #[must_use]
    pub fn new(
        backend: Arc<dyn Backend>,
        credentials: CredentialStore,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            backend,
            credentials,
            notifier,
            mock_on_failure: true,
        }
    }

    /// Whether backend failures fall back to sample items.
    #[must_use]
    pub fn with_mock_on_failure(mut self, enabled: bool) -> Self {
        self.mock_on_failure = enabled;
        self
    }

    /// Fetches the service's items.
    #[instrument(skip(self), fields(fetch_id = %FetchId::new()))]
    pub async fn fetch_items(&self, service: Service) -> FetchOutcome {
        let token = match self.credentials.token(service) {
            Ok(Some(token)) => token,
            Ok(None) => return self.not_connected(service.slug()),
            Err(e) => {
                warn!(error = %e, "credential lookup failed");
                return self.not_connected(service.slug());
            }
        };

        match self.backend.items(service, &token).await {
            Ok(items) => {
                info!(count = items.len(), "fetched items from backend");
                self.notify_fetched(service, items.len());
                FetchOutcome::Live(items)
            }
            Err(e) => {
                let error = FetchError::Backend { service, error: e };
                if self.mock_on_failure {
                    warn!(error = %error, "using sample items");
                    let items = mock_items(service);
                    self.notify_fetched(service, items.len());
                    FetchOutcome::Fallback { items, error }
                } else {
                    warn!(error = %error, "item fetch failed");
                    self.notify_failed(service.slug());
                    FetchOutcome::Failed { error }
                }
            }
        }
    }

    /// Fetches by service name; unknown names behave as not connected.
    pub async fn fetch_items_by_name(&self, name: &str) -> FetchOutcome {
        match name.parse::<Service>() {
            Ok(service) => self.fetch_items(service).await,
            Err(e) => {
                warn!(error = %e, "item fetch for unknown service");
                self.not_connected(name)
            }
        }
    }

    fn not_connected(&self, name: &str) -> FetchOutcome {
        let error = FetchError::MissingCredential {
            service: name.to_string(),
        };
        warn!(error = %error, "item fetch without credential");
        self.notify_failed(name);
        FetchOutcome::NotConnected { error }
    }

    fn notify_fetched(&self, service: Service, count: usize) {
        self.notifier.notify(Notice::info(
            "Success",
            format!("Fetched {count} items from {service}"),
        ));
    }

    fn notify_failed(&self, name: &str) {
        self.notifier.notify(Notice::error(
            "Error",
            format!("Failed to fetch items from {name}"),
        ));
    }
}
