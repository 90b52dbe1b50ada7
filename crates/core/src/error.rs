//! Core error model.

use thiserror::Error;

/// Result type used across the core crate.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while building saga identifiers and correlation keys.
///
/// Storage failures never show up here; they belong to the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A correlation property cannot be turned into an unambiguous key.
    #[error("invalid correlation property: {0}")]
    InvalidCorrelationProperty(String),
}

impl CoreError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn invalid_correlation(msg: impl Into<String>) -> Self {
        Self::InvalidCorrelationProperty(msg.into())
    }
}
