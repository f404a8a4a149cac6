//! Risk levels and their causes.

use keyward_core::KeysetId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an account is at risk of losing funds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum AtRiskCause {
    /// The keyset this install spends with is not the one the server has active
    ActiveSpendingKeysetMismatch {
        /// Keyset active in the local keybox
        local: KeysetId,
        /// Keyset the server reported as active
        server: KeysetId,
    },
    /// No hardware device is paired
    MissingHardware,
    /// No usable cloud backup exists
    MissingCloudBackup,
    /// No verified email or phone number to notify during recovery
    MissingContactMethod,
}

impl AtRiskCause {
    /// Rank used to choose between causes. Lower is more severe.
    pub fn severity(&self) -> u8 {
        match self {
            Self::ActiveSpendingKeysetMismatch { .. } => 0,
            Self::MissingHardware => 1,
            Self::MissingCloudBackup => 2,
            Self::MissingContactMethod => 3,
        }
    }
}

impl fmt::Display for AtRiskCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActiveSpendingKeysetMismatch { local, server } => {
                write!(f, "active spending keyset mismatch (local {local}, server {server})")
            }
            Self::MissingHardware => f.write_str("missing hardware"),
            Self::MissingCloudBackup => f.write_str("missing cloud backup"),
            Self::MissingContactMethod => f.write_str("missing critical contact method"),
        }
    }
}

/// Derived protection level of an account. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "level", content = "detail", rename_all = "snake_case")]
pub enum FundsLostRiskLevel {
    Protected,
    AtRisk(AtRiskCause),
}

impl FundsLostRiskLevel {
    pub fn is_protected(&self) -> bool {
        matches!(self, Self::Protected)
    }

    pub fn cause(&self) -> Option<&AtRiskCause> {
        match self {
            Self::Protected => None,
            Self::AtRisk(cause) => Some(cause),
        }
    }
}

impl fmt::Display for FundsLostRiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protected => f.write_str("protected"),
            Self::AtRisk(cause) => write!(f, "at risk: {cause}"),
        }
    }
}
