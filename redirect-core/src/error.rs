//! Error types for redirect operations

use redirect_common::RuleId;
use thiserror::Error;

/// Main error type for redirect operations
#[derive(Debug, Error)]
pub enum RedirectError {
    /// The key-value store failed a get or set
    #[error("Store error: {0}")]
    Store(String),

    /// The rule engine refused an update (malformed pattern, id conflict)
    #[error("Rule engine rejected rules {rule_ids:?}: {reason}")]
    EngineRejection { rule_ids: Vec<RuleId>, reason: String },

    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Redirect {id} not found")]
    NotFound { id: RuleId },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The service task is gone or dropped the reply
    #[error("Redirect service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl RedirectError {
    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn rejection(rule_ids: Vec<RuleId>, reason: impl Into<String>) -> Self {
        Self::EngineRejection {
            rule_ids,
            reason: reason.into(),
        }
    }

    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store(reason.into())
    }

    /// Whether the failure came from an external collaborator rather than
    /// from the caller's input
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            RedirectError::Store(_)
                | RedirectError::EngineRejection { .. }
                | RedirectError::Io(_)
                | RedirectError::ServiceUnavailable(_)
        )
    }
}
