// src/error.rs
// Error taxonomy for the pendulum core: malformed chains and bad call parameters.
// Both are precondition failures caught before any numeric work runs.

use thiserror::Error;

/// Errors raised while building, editing, or stepping a chain.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PendulumError {
    /// Chain is empty or a link has a non-positive (or non-finite) length or mass.
    #[error("invalid chain: {0}")]
    InvalidChain(String),

    /// Bad argument to an operation (link count, drag coefficient, index).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl PendulumError {
    /// Creates an invalid chain error.
    #[must_use]
    pub fn invalid_chain(reason: impl Into<String>) -> Self {
        Self::InvalidChain(reason.into())
    }

    /// Creates an invalid parameter error.
    #[must_use]
    pub fn invalid_parameter(reason: impl Into<String>) -> Self {
        Self::InvalidParameter(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, PendulumError>;
