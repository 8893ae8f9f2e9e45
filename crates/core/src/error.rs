use std::fmt::Display;

use thiserror::Error;

/// Result type used across the rule engine crates.
pub type AppResult<T> = Result<T, AppError>;

/// Error categories surfaced to callers.
///
/// Expected evaluation outcomes (denied access, lookup misses, rejected
/// transitions, formula errors) are typed values and never use this enum.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input, invalid definition or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// App, record or rule does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write clashes with stored state, such as a unique value, a frozen
    /// field code or a concurrent status change.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Permission rules deny the actor.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Adapter failure or unexpected state.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stored definition data that cannot be parsed at all. Surfaced to
    /// designers as "configuration invalid".
    #[must_use]
    pub fn configuration_invalid(detail: impl Display) -> Self {
        Self::Validation(format!("configuration invalid: {detail}"))
    }
}
