//! Integration settings.
//!
//! Deserialized as the `integration` section of the application config.

use crate::backend::ApiContract;
use crate::state::StateSigner;
use serde::Deserialize;

/// Connection lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IntegrationConfig {
    /// API revision used for HubSpot calls.
    #[serde(default)]
    pub contract: ApiContract,

    /// Identity sent to the backend and embedded in signed state.
    #[serde(default = "default_user_id")]
    pub user_id: String,

    #[serde(default = "default_org_id")]
    pub org_id: String,

    /// Secret for signing the OAuth `state` parameter.
    /// Unset means state is not signed.
    #[serde(default)]
    pub state_secret: Option<String>,

    /// Whether unsigned states like `hubspot-demo_user` are accepted.
    #[serde(default = "default_true")]
    pub accept_legacy_state: bool,

    #[serde(default)]
    pub fallback: FallbackPolicy,
}

/// What to do when the backend cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FallbackPolicy {
    /// Serve sample items when an item fetch fails, and connect with a
    /// placeholder credential when a code exchange fails.
    #[serde(default = "default_true")]
    pub mock_on_failure: bool,

    /// Connect stores a placeholder credential instead of redirecting.
    #[serde(default = "default_true")]
    pub simulate_connect: bool,
}

fn default_user_id() -> String {
    "demo_user".to_string()
}

fn default_org_id() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            mock_on_failure: true,
            simulate_connect: true,
        }
    }
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            contract: ApiContract::default(),
            user_id: default_user_id(),
            org_id: default_org_id(),
            state_secret: None,
            accept_legacy_state: true,
            fallback: FallbackPolicy::default(),
        }
    }
}

impl IntegrationConfig {
    /// Signer for the configured secret; empty secrets count as unset.
    #[must_use]
    pub fn signer(&self) -> Option<StateSigner> {
        self.state_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .map(StateSigner::new)
    }
}
