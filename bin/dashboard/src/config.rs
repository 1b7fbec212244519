//! Centralized dashboard configuration.
//!
//! Loaded via the `config` crate from `SWITCHBOARD__*` environment
//! variables, e.g. `SWITCHBOARD__API_BASE_URL` or
//! `SWITCHBOARD__INTEGRATION__FALLBACK__SIMULATE_CONNECT`.
//!
//! See [`IntegrationConfig`] for the connection lifecycle settings.

use serde::Deserialize;
use std::path::PathBuf;
use switchboard_integration::IntegrationConfig;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SWITCHBOARD";

/// Dashboard configuration composed from library configs.
#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Base URL of the integrations API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// File holding stored credentials. Unset keeps them in memory only.
    #[serde(default)]
    pub storage_path: Option<PathBuf>,

    #[serde(default)]
    pub integration: IntegrationConfig,
}

fn default_api_base_url() -> String {
    "http://localhost:8000".to_string()
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            storage_path: None,
            integration: IntegrationConfig::default(),
        }
    }
}

impl DashboardConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_environment(config::Environment::with_prefix(ENV_PREFIX))
    }

    fn from_environment(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(environment.separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }
}
