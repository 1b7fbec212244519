//! Catalogue of the third-party services switchboard can connect to.
//!
//! The set is fixed at compile time. Order matters: it is the order services
//! are listed in and the order in which a legacy OAuth `state` string is
//! matched against service names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A known third-party integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    /// HubSpot CRM (contacts, deals).
    HubSpot,
    /// Notion workspaces and pages.
    Notion,
    /// Airtable bases and records.
    Airtable,
}

impl Service {
    /// All known services, in registry order.
    pub const ALL: [Service; 3] = [Service::HubSpot, Service::Notion, Service::Airtable];

    /// Human-readable name shown on cards.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::HubSpot => "HubSpot",
            Self::Notion => "Notion",
            Self::Airtable => "Airtable",
        }
    }

    /// Lowercased name, used for storage keys and endpoint paths.
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::HubSpot => "hubspot",
            Self::Notion => "notion",
            Self::Airtable => "airtable",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::HubSpot => "Connect your HubSpot account to access contacts, deals, and more.",
            Self::Notion => "Connect Notion to access your workspaces and documents.",
            Self::Airtable => "Connect Airtable to access your bases and tables.",
        }
    }

    #[must_use]
    pub const fn icon(self) -> &'static str {
        match self {
            Self::HubSpot => "https://cdn2.hubspot.net/hubfs/53/image8-2.jpg",
            Self::Notion => "https://upload.wikimedia.org/wikipedia/commons/4/45/Notion_app_logo.png",
            Self::Airtable => {
                "https://seeklogo.com/images/A/airtable-logo-216B9AF035-seeklogo.com.png"
            }
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Error returned when a string names no known service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseServiceError {
    /// The rejected input.
    pub input: String,
}

impl fmt::Display for ParseServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown integration: '{}'", self.input)
    }
}

impl std::error::Error for ParseServiceError {}

impl FromStr for Service {
    type Err = ParseServiceError;

    /// Accepts the slug or the display name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|service| service.slug().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ParseServiceError {
                input: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_lowercased_display_names() {
        for service in Service::ALL {
            assert_eq!(service.slug(), service.display_name().to_lowercase());
        }
    }

    #[test]
    fn parse_accepts_any_case() {
        assert_eq!("hubspot".parse::<Service>(), Ok(Service::HubSpot));
        assert_eq!("HubSpot".parse::<Service>(), Ok(Service::HubSpot));
        assert_eq!(" NOTION ".parse::<Service>(), Ok(Service::Notion));
    }

    #[test]
    fn parse_rejects_unknown() {
        let err = "salesforce".parse::<Service>().unwrap_err();
        assert!(err.to_string().contains("salesforce"));
    }

    #[test]
    fn registry_order_is_stable() {
        assert_eq!(
            Service::ALL,
            [Service::HubSpot, Service::Notion, Service::Airtable]
        );
    }

    #[test]
    fn serializes_as_slug() {
        let json = serde_json::to_string(&Service::Airtable).expect("serialize");
        assert_eq!(json, "\"airtable\"");
    }
}
