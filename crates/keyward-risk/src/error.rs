//! Risk evaluation errors.

use keyward_core::KeywardError;
use keyward_recovery::RecoveryError;

#[derive(Debug, thiserror::Error)]
pub enum RiskError {
    /// A signal collaborator could not answer
    #[error("risk signal unavailable: {0}")]
    Signal(#[from] KeywardError),

    /// The local keybox could not be read
    #[error("keybox store unavailable: {0}")]
    Keybox(#[from] RecoveryError),
}

pub type Result<T> = std::result::Result<T, RiskError>;
