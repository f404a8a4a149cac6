//! Domain error types for recovery and key rotation.
//!
//! These errors wrap the effect-level errors from `keyward-core` and classify
//! them by what the caller should do next: re-prompt a factor, retry, resync,
//! or report.

use keyward_core::effects::{AppKeyError, CosignerError, HardwareError, StorageError, TimeError};
use keyward_core::AccountId;
use std::time::Duration;
use thiserror::Error;

/// Message shown to the user when a recovery ends in a conflict.
pub const CONFLICT_USER_MESSAGE: &str = "recovery could not be completed, please retry";

/// Result type for recovery operations
pub type Result<T> = std::result::Result<T, RecoveryError>;

/// Errors that can occur during recovery and rotation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoveryError {
    /// Proof of possession rejected; the factor must be re-prompted
    #[error("Authorization rejected: {message}")]
    Authorization { message: String },

    /// Co-signer unreachable; safe to retry
    #[error("Network error: {message}")]
    Network { message: String },

    /// Server state diverged from ours; resync before retrying
    #[error("recovery could not be completed, please retry ({message})")]
    Conflict { message: String },

    /// A core guarantee was about to be broken
    #[error("Invariant violation: {message}")]
    InvariantViolation { message: String },

    /// Command not valid in the current state
    #[error("Invalid state for operation: {message}")]
    InvalidState { message: String },

    /// Completion attempted before the delay window ended
    #[error("Delay period has not elapsed ({}s remaining)", .remaining.as_secs())]
    DelayNotElapsed { remaining: Duration },

    /// A non-terminal attempt already exists for the account
    #[error("A recovery attempt is already in progress for {account}")]
    AttemptInProgress { account: AccountId },

    /// No attempt exists for the account
    #[error("No active recovery attempt for {account}")]
    NoActiveAttempt { account: AccountId },

    /// Local persistence failed
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Hardware exchange failed or was dismissed
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),

    /// App keystore could not sign
    #[error("App signing failed: {0}")]
    Signing(#[from] AppKeyError),

    /// Clock could not be read
    #[error("Clock error: {0}")]
    Clock(#[from] TimeError),
}

impl RecoveryError {
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Whether the same command may simply be issued again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Text safe to show to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Conflict { .. } => CONFLICT_USER_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<CosignerError> for RecoveryError {
    fn from(err: CosignerError) -> Self {
        match err {
            CosignerError::Network { message } => Self::Network { message },
            CosignerError::Unauthorized { message } => Self::Authorization { message },
            CosignerError::Conflict { code, message } => Self::Conflict {
                message: format!("{code}: {message}"),
            },
            CosignerError::NotFound { message } => Self::InvalidState {
                message: format!("not found on co-signer: {message}"),
            },
            CosignerError::Rejected { status, message } => Self::InvalidState {
                message: format!("co-signer rejected request ({status}): {message}"),
            },
            CosignerError::Serialization { message } => Self::InvalidState {
                message: format!("malformed co-signer response: {message}"),
            },
        }
    }
}

impl From<StorageError> for RecoveryError {
    fn from(err: StorageError) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<serde_json::Error> for RecoveryError {
    fn from(err: serde_json::Error) -> Self {
        Self::storage(format!("corrupt record: {err}"))
    }
}
