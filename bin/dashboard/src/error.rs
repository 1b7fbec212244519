//! Domain error types for dashboard operations.

use std::fmt;
use switchboard_integration::StorageError;

/// Errors surfaced by dashboard actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardError {
    /// A service name did not match any known service.
    UnknownService { name: String },
    /// A page address could not be parsed.
    InvalidUrl { input: String, reason: String },
    /// The credential store failed.
    Storage { error: StorageError },
}

impl fmt::Display for DashboardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownService { name } => write!(f, "unknown service '{name}'"),
            Self::InvalidUrl { input, reason } => {
                write!(f, "invalid url '{input}': {reason}")
            }
            Self::Storage { error } => write!(f, "credential storage failed: {error}"),
        }
    }
}

impl std::error::Error for DashboardError {}

impl From<StorageError> for DashboardError {
    fn from(error: StorageError) -> Self {
        Self::Storage { error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_input() {
        let err = DashboardError::UnknownService {
            name: "salesforce".to_string(),
        };
        assert_eq!(err.to_string(), "unknown service 'salesforce'");
    }

    #[test]
    fn storage_errors_convert() {
        let err: DashboardError = StorageError::LockPoisoned.into();
        assert!(matches!(err, DashboardError::Storage { .. }));
    }
}
