//! Hardware device exchange.
//!
//! The device is driven by a user tap; each call is one blocking
//! request/response exchange. Unlike the other effects this is passed per
//! operation rather than composed into the effect system, because a recovery
//! may involve a different device than the one on file.

use crate::identifiers::AccountId;
use crate::keys::{HwAuthPublicKey, HwFactorProofOfPossession, Signature};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Session flags for one device exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareSession {
    /// Whether the device must be unlocked (fingerprint) first
    pub needs_authentication: bool,
    /// Whether the device should lock itself after the exchange
    pub should_lock: bool,
}

impl Default for HardwareSession {
    fn default() -> Self {
        Self {
            needs_authentication: true,
            should_lock: true,
        }
    }
}

/// Hardware answer to a challenge signing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareSignedChallenge {
    /// Detached signature over the challenge bytes
    pub signature: Signature,
    /// Auth key the device currently holds
    pub hw_auth_key: HwAuthPublicKey,
}

/// Hardware exchange errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum HardwareError {
    /// User dismissed the prompt or moved the device away
    #[error("Hardware exchange canceled")]
    Canceled,
    /// Device is locked and the session did not authenticate
    #[error("Hardware device is locked")]
    Locked,
    /// Transport failure during the exchange
    #[error("Hardware transport failed: {message}")]
    Transport {
        /// Failure detail
        message: String,
    },
}

/// Signing requests to a physical device.
#[async_trait]
pub trait HardwareSigner: Send + Sync {
    /// Sign raw challenge bytes with the device auth key.
    async fn sign_challenge(
        &self,
        challenge: &[u8],
        session: HardwareSession,
    ) -> Result<HardwareSignedChallenge, HardwareError>;

    /// Sign the account id, proving current possession of the device.
    async fn prove_possession(
        &self,
        account_id: &AccountId,
        session: HardwareSession,
    ) -> Result<HwFactorProofOfPossession, HardwareError>;
}
