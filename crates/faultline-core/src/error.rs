//! Error types for faultline
//!
//! The observation surface itself never fails. Errors only arise from:
//! - Configuration loading and validation
//! - Work driven to completion inside a scope that ended first

use crate::scope::CancelReason;

/// Main faultline error type
#[derive(Debug, thiserror::Error)]
pub enum FaultlineError {
    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Scoped work did not complete
    #[error("scope error: {0}")]
    Scope(#[from] ScopeError),
}

impl FaultlineError {
    /// Check if the error stems from a cancelled or expired scope
    #[inline]
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Scope(_))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was being read
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Config text is not valid TOML for this schema
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Origin of the text
        path: String,
        /// Parser message
        message: String,
    },

    /// A value is out of range
    #[error("invalid value for {field}: {message}")]
    Validation {
        /// Dotted field name
        field: String,
        /// What is wrong with it
        message: String,
    },
}

/// Scope execution errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// A cancel handle fired before the work completed
    #[error("scope cancelled")]
    Cancelled,

    /// A timeout or deadline elapsed before the work completed
    #[error("scope deadline exceeded")]
    DeadlineExceeded,
}

impl From<CancelReason> for ScopeError {
    fn from(reason: CancelReason) -> Self {
        match reason {
            CancelReason::Cancelled => ScopeError::Cancelled,
            CancelReason::DeadlineExceeded => ScopeError::DeadlineExceeded,
        }
    }
}
