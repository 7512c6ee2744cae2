//! Risk error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown risk check: {0}")]
    UnknownCheck(String),

    /// Internal consistency bug; callers treat this as fatal.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

pub type RiskResult<T> = Result<T, RiskError>;
