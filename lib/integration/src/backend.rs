//! Remote integrations API.
//!
//! [`Backend`] has one method per endpoint the dashboard consumes.
//! [`HttpBackend`] is the reqwest implementation; tests substitute stubs.
//!
//! The API has shipped in two revisions. Every service supports the JSON
//! endpoints; HubSpot additionally had a multipart-form revision under
//! `/integrations/hubspot/*`. [`ApiContract`] picks which one HubSpot uses.

use crate::error::BackendError;
use crate::items::IntegrationItem;
use async_trait::async_trait;
use oauth2::{AccessToken, AuthorizationCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use switchboard_core::Service;
use tracing::{debug, instrument, warn};

/// Which API revision HubSpot calls go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiContract {
    /// JSON bodies on the per-service endpoints.
    #[default]
    Json,
    /// Multipart forms on `/integrations/hubspot/*` for HubSpot.
    HubspotForm,
}

/// Tokens returned by a code exchange.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    /// Absent when the backend answered 2xx without a token.
    pub access_token: Option<AccessToken>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

/// Calls to the remote integrations API.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Authorization URL per lowercase service name.
    async fn auth_urls(&self) -> Result<HashMap<String, String>, BackendError>;

    /// Exchanges an authorization code for tokens.
    async fn exchange_code(
        &self,
        service: Service,
        code: &AuthorizationCode,
        state: &str,
    ) -> Result<TokenGrant, BackendError>;

    /// Items visible to the token holder.
    async fn items(
        &self,
        service: Service,
        token: &AccessToken,
    ) -> Result<Vec<IntegrationItem>, BackendError>;

    /// Whether the backend holds credentials for the service.
    async fn check_auth(&self, service: Service) -> Result<bool, BackendError>;
}

/// Either token response shape seen from the callback endpoint.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenResponse {
    Wrapped { credentials: TokenFields },
    Flat(TokenFields),
}

#[derive(Debug, Default, Deserialize)]
struct TokenFields {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl From<TokenResponse> for TokenGrant {
    fn from(response: TokenResponse) -> Self {
        let fields = match response {
            TokenResponse::Wrapped { credentials } => credentials,
            TokenResponse::Flat(fields) => fields,
        };
        Self {
            access_token: fields
                .access_token
                .filter(|token| !token.is_empty())
                .map(AccessToken::new),
            refresh_token: fields.refresh_token,
            expires_in: fields.expires_in,
        }
    }
}

/// An auth-url map value: a bare URL or `{"auth_url": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AuthUrlEntry {
    Plain(String),
    Wrapped { auth_url: String },
}

impl AuthUrlEntry {
    fn into_url(self) -> String {
        match self {
            Self::Plain(url) | Self::Wrapped { auth_url: url } => url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthStatus {
    #[serde(default)]
    authenticated: bool,
}

#[derive(Debug, Serialize)]
struct CallbackBody<'a> {
    code: &'a str,
    state: &'a str,
}

/// reqwest-backed [`Backend`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    contract: ApiContract,
    user_id: String,
    org_id: String,
}

impl HttpBackend {
    /// Creates a backend rooted at `base_url` (e.g. `http://localhost:8000`).
    #[must_use]
    pub fn new(base_url: impl Into<String>, contract: ApiContract) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            contract,
            user_id: "demo_user".to_string(),
            org_id: "default".to_string(),
        }
    }

    /// Sets the identity sent with HubSpot form requests.
    #[must_use]
    pub fn with_identity(mut self, user_id: impl Into<String>, org_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self.org_id = org_id.into();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn uses_form(&self, service: Service) -> bool {
        self.contract == ApiContract::HubspotForm && service == Service::HubSpot
    }

    fn identity_form(&self) -> reqwest::multipart::Form {
        reqwest::multipart::Form::new()
            .text("user_id", self.user_id.clone())
            .text("org_id", self.org_id.clone())
    }

    async fn hubspot_form_auth_url(&self) -> Result<String, BackendError> {
        let response = self
            .client
            .post(self.endpoint("integrations/hubspot/authorize"))
            .multipart(self.identity_form())
            .send()
            .await?;
        let entry: AuthUrlEntry = read_json(response).await?;
        Ok(entry.into_url())
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
    let status = response.status();
    if !status.is_success() {
        return Err(BackendError::NonSuccessStatus {
            status: status.as_u16(),
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| BackendError::InvalidResponse {
            reason: e.to_string(),
        })
}

#[async_trait]
impl Backend for HttpBackend {
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn auth_urls(&self) -> Result<HashMap<String, String>, BackendError> {
        let response = self.client.get(self.endpoint("auth-urls")).send().await?;
        let entries: HashMap<String, AuthUrlEntry> = read_json(response).await?;
        let mut urls: HashMap<String, String> = entries
            .into_iter()
            .map(|(name, entry)| (name.to_lowercase(), entry.into_url()))
            .collect();

        if self.contract == ApiContract::HubspotForm {
            match self.hubspot_form_auth_url().await {
                Ok(url) => {
                    urls.insert(Service::HubSpot.slug().to_string(), url);
                }
                Err(e) => warn!(error = %e, "hubspot authorize failed, keeping listed url"),
            }
        }

        debug!(count = urls.len(), "fetched auth urls");
        Ok(urls)
    }

    #[instrument(skip(self, code, state))]
    async fn exchange_code(
        &self,
        service: Service,
        code: &AuthorizationCode,
        state: &str,
    ) -> Result<TokenGrant, BackendError> {
        let request = if self.uses_form(service) {
            self.client
                .get(self.endpoint("integrations/hubspot/oauth2callback"))
                .query(&[("code", code.secret().as_str()), ("state", state)])
        } else {
            self.client
                .post(self.endpoint(&format!("oauth2callback/{}", service.slug())))
                .json(&CallbackBody {
                    code: code.secret(),
                    state,
                })
        };

        let response = request.send().await?;
        let body: TokenResponse = read_json(response).await?;
        Ok(body.into())
    }

    #[instrument(skip(self, token))]
    async fn items(
        &self,
        service: Service,
        token: &AccessToken,
    ) -> Result<Vec<IntegrationItem>, BackendError> {
        let request = if self.uses_form(service) {
            let form = reqwest::multipart::Form::new().text("credentials", token.secret().clone());
            self.client
                .post(self.endpoint("integrations/hubspot/load"))
                .multipart(form)
        } else {
            self.client
                .get(self.endpoint(&format!("items/{}", service.slug())))
                .bearer_auth(token.secret())
        };

        let response = request.send().await?;
        let items: Vec<IntegrationItem> = read_json(response).await?;
        debug!(count = items.len(), "fetched items");
        Ok(items)
    }

    #[instrument(skip(self))]
    async fn check_auth(&self, service: Service) -> Result<bool, BackendError> {
        let request = if self.uses_form(service) {
            self.client
                .post(self.endpoint("integrations/hubspot/credentials"))
                .multipart(self.identity_form())
        } else {
            self.client
                .get(self.endpoint(&format!("check-auth/{}", service.slug())))
        };

        let response = request.send().await?;
        let status: AuthStatus = read_json(response).await?;
        Ok(status.authenticated)
    }
}
