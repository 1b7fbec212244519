//! Command-line interface.

use crate::dashboard::{AuthStatus, ConnectAction, Dashboard};
use crate::error::DashboardError;
use crate::render::{render_cards, render_items};
use clap::{Parser, Subcommand};
use switchboard_core::{Result, Service};
use switchboard_integration::{CallbackOutcome, CredentialSource, FetchOutcome};
use url::Url;

/// Connect third-party integrations and browse their items.
#[derive(Debug, Parser)]
#[command(name = "switchboard", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Show every integration and its connection state.
    List,
    /// Connect an integration.
    Connect { service: String },
    /// Disconnect an integration and forget its credential.
    Disconnect { service: String },
    /// Fetch and print an integration's items.
    Items { service: String },
    /// Complete an OAuth redirect from the address it landed on.
    Callback { url: String },
    /// Print the authorization URL for an integration.
    AuthUrl { service: String },
    /// Compare the stored credential with the backend's view.
    Status { service: String },
}

fn parse_service(name: &str) -> Result<Service, DashboardError> {
    Ok(name.parse().map_err(|_| DashboardError::UnknownService {
        name: name.to_string(),
    })?)
}

/// Runs one command against a loaded dashboard and returns its output.
///
/// # Errors
///
/// Returns an error for unknown services, malformed addresses, or storage
/// failures.
pub async fn run(command: Command, dashboard: &Dashboard) -> Result<String, DashboardError> {
    let output = match command {
        Command::List => render_cards(&dashboard.services()),
        Command::Connect { service } => {
            let service = parse_service(&service)?;
            match dashboard.connect(service).await? {
                ConnectAction::Unavailable => format!("{service}: no authorization URL"),
                ConnectAction::Simulated => render_items(&dashboard.items()),
                ConnectAction::Redirect(url) => format!("Open {url} to authorize {service}"),
            }
        }
        Command::Disconnect { service } => {
            let service = parse_service(&service)?;
            dashboard.disconnect(service)?;
            render_cards(&dashboard.services())
        }
        Command::Items { service } => {
            let service = parse_service(&service)?;
            match dashboard.view_items(service).await {
                FetchOutcome::NotConnected { error } | FetchOutcome::Failed { error } => {
                    error.to_string()
                }
                outcome => render_items(outcome.items()),
            }
        }
        Command::Callback { url } => {
            let address = Url::parse(&url).map_err(|e| DashboardError::InvalidUrl {
                input: url.clone(),
                reason: e.to_string(),
            })?;
            let page = dashboard.handle_page_load(&address).await;
            let summary = match page.callback {
                None => "no OAuth callback in address".to_string(),
                Some(CallbackOutcome::Connected { service, source }) => match source {
                    CredentialSource::Exchanged => format!("connected {service}"),
                    CredentialSource::Placeholder { cause } => {
                        format!("connected {service} with a placeholder credential ({cause})")
                    }
                },
                Some(CallbackOutcome::Failed { error }) => format!("callback failed: {error}"),
            };
            format!("{summary}\naddress: {}", page.address)
        }
        Command::AuthUrl { service } => {
            let service = parse_service(&service)?;
            dashboard
                .registry()
                .get(service)
                .and_then(|d| d.auth_url)
                .map_or_else(|| format!("{service}: unavailable"), |url| url.to_string())
        }
        Command::Status { service } => {
            let AuthStatus {
                service,
                stored,
                backend,
            } = dashboard.status(parse_service(&service)?).await;
            let remote = match backend {
                Some(true) => "authorized",
                Some(false) => "not authorized",
                None => "unreachable",
            };
            let local = if stored { "stored" } else { "none" };
            format!("{service}: credential {local}, backend {remote}")
        }
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clap::CommandFactory;
    use oauth2::{AccessToken, AuthorizationCode};
    use std::collections::HashMap;
    use std::sync::Arc;
    use switchboard_integration::{
        Backend, BackendError, CredentialStore, IntegrationConfig, IntegrationItem,
        RecordingNotifier, TokenGrant,
    };

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

    async fn loaded() -> Dashboard {
        let dashboard = Dashboard::new(
            Arc::new(OfflineBackend),
            CredentialStore::in_memory(),
            Arc::new(RecordingNotifier::new()),
            &IntegrationConfig::default(),
        );
        dashboard.load().await;
        dashboard
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["switchboard", "auth-url", "notion"]).expect("parse");
        assert!(matches!(cli.command, Command::AuthUrl { service } if service == "notion"));
    }

    #[tokio::test]
    async fn unknown_service_is_an_error() {
        let dashboard = loaded().await;
        let result = run(
            Command::Connect {
                service: "salesforce".to_string(),
            },
            &dashboard,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn connect_then_list_shows_connection() {
        let dashboard = loaded().await;
        run(
            Command::Connect {
                service: "HubSpot".to_string(),
            },
            &dashboard,
        )
        .await
        .expect("connect");

        let cards = run(Command::List, &dashboard).await.expect("list");
        assert!(cards.contains("HubSpot [connected]"));
    }

    #[tokio::test]
    async fn callback_reports_stripped_address() {
        let dashboard = loaded().await;
        let output = run(
            Command::Callback {
                url: "http://localhost:3000/?code=abc&state=airtable-demo_user".to_string(),
            },
            &dashboard,
        )
        .await
        .expect("callback");

        assert!(output.starts_with("connected airtable with a placeholder credential"));
        assert!(output.ends_with("address: http://localhost:3000/"));
    }

    #[tokio::test]
    async fn status_reports_unreachable_backend() {
        let dashboard = loaded().await;
        let output = run(
            Command::Status {
                service: "notion".to_string(),
            },
            &dashboard,
        )
        .await
        .expect("status");
        assert_eq!(output, "notion: credential none, backend unreachable");
    }
}
