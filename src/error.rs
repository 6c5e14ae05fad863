//! Error taxonomy for the cascade resolver
//!
//! Every failure the resolver, its collaborators or its configuration can
//! produce is a variant of [`CascadeError`]. Each variant carries an
//! [`ErrorClass`] that tells the integrating layer how to react:
//! re-prompt, retry, re-authenticate, or abort and report.

use thiserror::Error;

use crate::catalog::{EntityId, Level};
use crate::schema::FormField;

/// How the caller is expected to react to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Re-request the current option set and re-prompt the user
    Recoverable,
    /// Transient collaborator failure; retry with backoff
    Retry,
    /// Session credentials rejected; re-login before retrying
    Reauthenticate,
    /// Broken upstream contract; abort the cascade and report to an operator
    Fatal,
}

/// Main error type for the cascade resolver
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CascadeError {
    #[error("'{id}' is not a selectable {level}")]
    InvalidSelection { level: Level, id: EntityId },

    #[error("Cannot select {level} while the cascade frontier is {}", frontier_label(*frontier))]
    OutOfOrderSelection {
        level: Level,
        frontier: Option<Level>,
    },

    #[error("Role '{role}' has no entry in the role table")]
    UnmappedRole { role: String },

    #[error("No canonical token for {level} label '{label}'")]
    UnknownCanonicalValue { level: Level, label: String },

    #[error("{level} '{id}' does not exist in the catalog")]
    NotFound { level: Level, id: EntityId },

    #[error("Children of {level} '{id}' have not been loaded")]
    NotLoaded { level: Level, id: EntityId },

    #[error("Cascade is incomplete: {missing} has not been selected")]
    Incomplete { missing: Level },

    #[error("Required field '{field}' is missing")]
    MissingRequiredField { field: FormField },

    #[error("Catalog source error: {0}")]
    Source(#[from] SourceError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

fn frontier_label(frontier: Option<Level>) -> String {
    frontier.map_or_else(|| "closed".to_string(), |level| level.to_string())
}

impl CascadeError {
    /// Classify the error according to the propagation policy
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidSelection { .. }
            | Self::UnknownCanonicalValue { .. }
            | Self::NotFound { .. }
            | Self::Incomplete { .. }
            | Self::MissingRequiredField { .. } => ErrorClass::Recoverable,
            Self::NotLoaded { .. } => ErrorClass::Retry,
            Self::OutOfOrderSelection { .. } | Self::UnmappedRole { .. } | Self::Config(_) => {
                ErrorClass::Fatal
            }
            Self::Source(err) => err.class(),
            Self::Persist(err) => err.class(),
        }
    }

    /// True when the error must abort the cascade
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}

/// Failures reported by the catalog collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not authorized (HTTP {status})")]
    NotAuthorized { status: u16 },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl SourceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Network(_) => ErrorClass::Retry,
            Self::NotAuthorized { .. } => ErrorClass::Reauthenticate,
            Self::Malformed(_) => ErrorClass::Fatal,
        }
    }
}

/// Failures reported by the record persistence collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    #[error("Validation failed for '{field}': {message}")]
    Validation { field: String, message: String },

    #[error(transparent)]
    Source(#[from] SourceError),
}

impl PersistError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation { .. } => ErrorClass::Recoverable,
            Self::Source(err) => err.class(),
        }
    }
}

/// Configuration loading and validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Cannot read '{path}': {message}")]
    Io { path: String, message: String },

    #[error("Invalid YAML: {0}")]
    Parse(String),

    #[error("Role table is missing roles: {}", roles.join(", "))]
    MissingRoles { roles: Vec<String> },

    #[error("Role '{role}' cannot enter the cascade at {level}")]
    InvalidEntryLevel { role: String, level: Level },

    #[error("Canonical label '{label}' is declared twice for {level}")]
    DuplicateCanonicalLabel { level: Level, label: String },

    #[error("Canonical token '{token}' is declared by two entries for {level}")]
    DuplicateCanonicalToken { level: Level, token: String },
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(error: serde_yaml::Error) -> Self {
        ConfigError::Parse(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_propagation_classes() {
        let invalid = CascadeError::InvalidSelection {
            level: Level::Service,
            id: EntityId::from("svc-9"),
        };
        assert_eq!(invalid.class(), ErrorClass::Recoverable);

        let out_of_order = CascadeError::OutOfOrderSelection {
            level: Level::Offer,
            frontier: Some(Level::Service),
        };
        assert!(out_of_order.is_fatal());

        let unmapped = CascadeError::UnmappedRole {
            role: "auditor".to_string(),
        };
        assert!(unmapped.is_fatal());

        let network: CascadeError = SourceError::Network("connection reset".into()).into();
        assert_eq!(network.class(), ErrorClass::Retry);

        let forbidden: CascadeError = SourceError::NotAuthorized { status: 403 }.into();
        assert_eq!(forbidden.class(), ErrorClass::Reauthenticate);
    }

    #[test]
    fn test_out_of_order_message_names_frontier() {
        let err = CascadeError::OutOfOrderSelection {
            level: Level::Segment,
            frontier: Some(Level::Service),
        };
        assert_eq!(
            err.to_string(),
            "Cannot select segment while the cascade frontier is service"
        );

        let closed = CascadeError::OutOfOrderSelection {
            level: Level::Channel,
            frontier: None,
        };
        assert!(closed.to_string().ends_with("closed"));
    }
}
