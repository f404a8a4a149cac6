//! App key signing effect.
//!
//! Private keys live in the platform keystore; this core only ever names the
//! public half and asks the platform to sign with the matching private key.

use crate::keys::{AppGlobalAuthPublicKey, AppRecoveryAuthPublicKey, Signature};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// App key signing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum AppKeyError {
    /// The keystore has no private key for the requested public key
    #[error("No private key stored for {public_key}")]
    KeyNotFound {
        /// Hex of the public key
        public_key: String,
    },
    /// The platform signer failed
    #[error("App signing failed: {message}")]
    SigningFailed {
        /// Failure detail
        message: String,
    },
}

/// Signing with app auth keys.
#[async_trait]
pub trait AppKeyEffects: Send + Sync {
    /// Sign `message` with the private half of an app global auth key.
    async fn sign_with_global_auth_key(
        &self,
        key: &AppGlobalAuthPublicKey,
        message: &[u8],
    ) -> Result<Signature, AppKeyError>;

    /// Sign `message` with the private half of an app recovery auth key.
    async fn sign_with_recovery_auth_key(
        &self,
        key: &AppRecoveryAuthPublicKey,
        message: &[u8],
    ) -> Result<Signature, AppKeyError>;
}

#[async_trait]
impl<T: AppKeyEffects + ?Sized> AppKeyEffects for std::sync::Arc<T> {
    async fn sign_with_global_auth_key(
        &self,
        key: &AppGlobalAuthPublicKey,
        message: &[u8],
    ) -> Result<Signature, AppKeyError> {
        (**self).sign_with_global_auth_key(key, message).await
    }

    async fn sign_with_recovery_auth_key(
        &self,
        key: &AppRecoveryAuthPublicKey,
        message: &[u8],
    ) -> Result<Signature, AppKeyError> {
        (**self).sign_with_recovery_auth_key(key, message).await
    }
}
