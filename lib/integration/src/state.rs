//! OAuth `state` parameter handling.
//!
//! Two forms are understood:
//!
//! - **Signed tokens**: `base64url(json) "." base64url(hmac_sha256)`,
//!   carrying the service explicitly. Issued by [`StateSigner::sign`].
//! - **Legacy strings** such as `hubspot-demo_user`, where the service is
//!   the first known name (in registry order) appearing as a substring.
//!
//! Anything whose second segment is an HMAC-SHA256 tag is treated as a
//! signed token. The tag is checked against the raw payload segment before
//! anything is decoded, so a token with a bad signature or a corrupted
//! payload is rejected outright and never falls through to substring
//! matching.

use crate::error::StateError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use switchboard_core::{FlowId, Service};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Length in bytes of an HMAC-SHA256 tag.
const SIGNATURE_LEN: usize = 32;

/// Payload of a signed state parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateToken {
    pub service: Service,
    pub flow_id: FlowId,
    pub user_id: String,
    pub issued_at: DateTime<Utc>,
}

impl StateToken {
    /// A token for a new connection attempt.
    #[must_use]
    pub fn new(service: Service, user_id: impl Into<String>) -> Self {
        Self {
            service,
            flow_id: FlowId::new(),
            user_id: user_id.into(),
            issued_at: Utc::now(),
        }
    }
}

/// Signs and verifies state tokens with a shared secret.
#[derive(Clone)]
pub struct StateSigner {
    key: Vec<u8>,
}

impl fmt::Debug for StateSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSigner").finish_non_exhaustive()
    }
}

impl StateSigner {
    #[must_use]
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self, payload: &str) -> Result<HmacSha256, StateError> {
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|e| StateError::Malformed {
            reason: e.to_string(),
        })?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    /// Encodes and signs a token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be serialized.
    pub fn sign(&self, token: &StateToken) -> Result<String, StateError> {
        let json = serde_json::to_vec(token).map_err(|e| StateError::Malformed {
            reason: e.to_string(),
        })?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = self.mac(&payload)?.finalize().into_bytes();
        Ok(format!("{payload}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Checks a signed state's signature, then decodes it.
    ///
    /// # Errors
    ///
    /// `Malformed` if `state` is not shaped like a signed token, `Tampered`
    /// if it is but the signature does not cover the payload as given.
    pub fn verify(&self, state: &str) -> Result<StateToken, StateError> {
        let malformed = |reason: String| StateError::Malformed { reason };

        let (payload, signature) = state
            .split_once('.')
            .ok_or_else(|| malformed("missing signature segment".to_string()))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .ok()
            .filter(|tag| tag.len() == SIGNATURE_LEN)
            .ok_or_else(|| malformed("signature segment is not an HMAC-SHA256 tag".to_string()))?;

        self.mac(payload)?
            .verify_slice(&signature)
            .map_err(|_| StateError::Tampered)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| malformed(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| malformed(e.to_string()))
    }
}

/// First service, in registry order, named inside `state`.
#[must_use]
pub fn legacy_service(state: &str) -> Option<Service> {
    Service::ALL
        .into_iter()
        .find(|service| state.contains(service.slug()))
}

/// Determines which service an OAuth callback belongs to.
///
/// # Errors
///
/// `Tampered` for a forged signed token; `UnknownService` when nothing
/// matches (or when legacy states are refused and the state is unsigned).
pub fn resolve_service(
    state: &str,
    signer: Option<&StateSigner>,
    accept_legacy: bool,
) -> Result<Service, StateError> {
    if let Some(signer) = signer {
        match signer.verify(state) {
            Ok(token) => return Ok(token.service),
            Err(StateError::Tampered) => return Err(StateError::Tampered),
            Err(_) if accept_legacy => {}
            Err(e) => return Err(e),
        }
    }

    if accept_legacy {
        legacy_service(state).ok_or_else(|| StateError::UnknownService {
            state: state.to_string(),
        })
    } else {
        Err(StateError::UnknownService {
            state: state.to_string(),
        })
    }
}

/// Returns `url` with its `state` query parameter set to `state`.
///
/// Other query pairs keep their order; a missing `state` is appended.
#[must_use]
pub fn with_state(url: &Url, state: &str) -> Url {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "state")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut url = url.clone();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("state", state);
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_state_resolves_by_substring() {
        assert_eq!(
            resolve_service("xyz-hubspot-demo_user", None, true),
            Ok(Service::HubSpot)
        );
        assert_eq!(
            resolve_service("notion-demo_user", None, true),
            Ok(Service::Notion)
        );
    }

    #[test]
    fn legacy_match_uses_registry_order() {
        assert_eq!(legacy_service("airtable-then-hubspot"), Some(Service::HubSpot));
    }

    #[test]
    fn legacy_match_is_case_sensitive() {
        assert_eq!(legacy_service("HUBSPOT"), None);
    }

    #[test]
    fn unmatched_state_fails() {
        assert_eq!(
            resolve_service("salesforce-demo_user", None, true),
            Err(StateError::UnknownService {
                state: "salesforce-demo_user".to_string()
            })
        );
    }

    #[test]
    fn signed_state_round_trips() {
        let signer = StateSigner::new("s3cret");
        let token = StateToken::new(Service::Airtable, "demo_user");
        let state = signer.sign(&token).expect("sign");

        assert_eq!(signer.verify(&state), Ok(token));
        assert_eq!(
            resolve_service(&state, Some(&signer), false),
            Ok(Service::Airtable)
        );
    }

    #[test]
    fn signed_state_ignores_names_in_payload() {
        // The user id mentions another service; the explicit field wins.
        let signer = StateSigner::new("s3cret");
        let state = signer
            .sign(&StateToken::new(Service::Notion, "hubspot-fan"))
            .expect("sign");
        assert_eq!(
            resolve_service(&state, Some(&signer), true),
            Ok(Service::Notion)
        );
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let signer = StateSigner::new("s3cret");
        let state = signer
            .sign(&StateToken::new(Service::HubSpot, "demo_user"))
            .expect("sign");

        let other = StateSigner::new("different");
        assert_eq!(other.verify(&state), Err(StateError::Tampered));
        assert_eq!(
            resolve_service(&state, Some(&other), true),
            Err(StateError::Tampered)
        );
    }

    #[test]
    fn swapped_payload_is_rejected() {
        let signer = StateSigner::new("s3cret");
        let hubspot = signer
            .sign(&StateToken::new(Service::HubSpot, "u"))
            .expect("sign");
        let notion = signer
            .sign(&StateToken::new(Service::Notion, "u"))
            .expect("sign");

        let (notion_payload, _) = notion.split_once('.').expect("payload");
        let (_, hubspot_signature) = hubspot.split_once('.').expect("signature");
        let forged = format!("{notion_payload}.{hubspot_signature}");
        assert_eq!(signer.verify(&forged), Err(StateError::Tampered));
    }

    #[test]
    fn corrupted_payload_does_not_fall_back_to_legacy() {
        let signer = StateSigner::new("s3cret");
        let state = signer
            .sign(&StateToken::new(Service::Notion, "u"))
            .expect("sign");

        // The payload no longer decodes to a token but names another service.
        let forged = format!("hubspot-{state}");
        assert_eq!(signer.verify(&forged), Err(StateError::Tampered));
        assert_eq!(
            resolve_service(&forged, Some(&signer), true),
            Err(StateError::Tampered)
        );
    }

    #[test]
    fn dotted_legacy_state_is_not_a_signed_token() {
        let signer = StateSigner::new("s3cret");
        assert_eq!(
            resolve_service("airtable.demo_user", Some(&signer), true),
            Ok(Service::Airtable)
        );
    }

    #[test]
    fn unsigned_state_with_signer_uses_legacy_when_allowed() {
        let signer = StateSigner::new("s3cret");
        assert_eq!(
            resolve_service("hubspot-demo_user", Some(&signer), true),
            Ok(Service::HubSpot)
        );
        assert!(matches!(
            resolve_service("hubspot-demo_user", Some(&signer), false),
            Err(StateError::Malformed { .. })
        ));
    }

    #[test]
    fn legacy_refused_without_signer() {
        assert!(matches!(
            resolve_service("hubspot-demo_user", None, false),
            Err(StateError::UnknownService { .. })
        ));
    }

    #[test]
    fn with_state_replaces_existing_parameter() {
        let url = Url::parse(
            "https://api.notion.com/v1/oauth/authorize?client_id=abc&state=notion-demo_user&owner=user",
        )
        .expect("url");
        let rewritten = with_state(&url, "signed.value");

        let pairs: Vec<(String, String)> = rewritten
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("client_id".to_string(), "abc".to_string()),
                ("owner".to_string(), "user".to_string()),
                ("state".to_string(), "signed.value".to_string()),
            ]
        );
    }

    #[test]
    fn debug_hides_secret() {
        let signer = StateSigner::new("s3cret");
        assert!(!format!("{signer:?}").contains("s3cret"));
    }
}
