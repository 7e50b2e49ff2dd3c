//! Error types for DIALDESK core operations

use thiserror::Error;

/// Business-rule failures raised before any network call is made.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaseError {
    #[error("no changes to send")]
    NoChanges,

    #[error("missing correlation id (id_dialvox_)")]
    MissingCorrelationId,
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unknown server filter: {name}")]
    UnknownFilter { name: String },
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
