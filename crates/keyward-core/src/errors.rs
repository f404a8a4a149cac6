//! Errors raised before any effect runs.
//!
//! Malformed identifiers and key material, unusable configuration, and
//! collaborators outside the wallet core that cannot answer. Failures of the
//! co-signer, storage and clock have their own types next to their effect
//! traits; `keyward-recovery` folds all of them into `RecoveryError`.

use serde::{Deserialize, Serialize};

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum KeywardError {
    /// Malformed account id, keyset id or public key
    #[error("Invalid: {message}")]
    Invalid {
        /// What was wrong with the input
        message: String,
    },

    /// Configuration could not be read, parsed or validated
    #[error("Config error: {message}")]
    Config {
        /// The offending file, key or value
        message: String,
    },

    /// A collaborator outside the wallet core could not answer
    #[error("Unavailable: {message}")]
    Unavailable {
        /// Which collaborator and why
        message: String,
    },
}

impl KeywardError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an unavailable collaborator error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Standard Result type for core operations
pub type Result<T> = std::result::Result<T, KeywardError>;
