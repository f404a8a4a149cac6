//! Remote co-signer effects.
//!
//! # Effect Classification
//!
//! - **Category**: Application Effect
//! - **Implementation**: `keyward-cosigner` (HTTP), `keyward-testkit` (in-memory server)
//! - **Usage**: keyset creation/activation, delay-notify recovery, auth key rotation
//!
//! The traits are split by concern so a component only bounds what it calls;
//! [`CosignerEffects`] composes them for callers that need everything.

use crate::factor::PhysicalFactor;
use crate::identifiers::{AccountId, ActionId, KeysetId};
use crate::keybox::{AppAuthPublicKeys, BitcoinNetwork};
use crate::keys::{
    AppGlobalAuthPublicKey, AppRecoveryAuthPublicKey, AppSpendingPublicKey, HwAuthPublicKey,
    HwSpendingPublicKey, ProofOfPossession, ServerSpendingPublicKey, Signature,
};
use crate::time::PhysicalTime;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Errors returned by the co-signer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum CosignerError {
    /// Transport failure or server-side 5xx; safe to retry
    #[error("Co-signer unreachable: {message}")]
    Network {
        /// Failure detail
        message: String,
    },
    /// Proof of possession missing, stale or invalid
    #[error("Co-signer rejected authorization: {message}")]
    Unauthorized {
        /// Failure detail
        message: String,
    },
    /// Resource does not exist on the server
    #[error("Not found on co-signer: {message}")]
    NotFound {
        /// Failure detail
        message: String,
    },
    /// Server state conflicts with the request
    #[error("Co-signer conflict ({code}): {message}")]
    Conflict {
        /// Machine-readable server code
        code: String,
        /// Failure detail
        message: String,
    },
    /// Any other client error
    #[error("Co-signer rejected request with status {status}: {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Failure detail
        message: String,
    },
    /// Response body could not be decoded
    #[error("Co-signer response malformed: {message}")]
    Serialization {
        /// Failure detail
        message: String,
    },
}

impl CosignerError {
    /// Whether the failed call can be re-attempted unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CosignerError::Network { .. })
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Keys that become active if a recovery completes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DestinationAuthKeys {
    /// Replacement (or retained) app global auth key
    pub app_global_auth: AppGlobalAuthPublicKey,
    /// Replacement (or retained) app recovery auth key
    pub app_recovery_auth: Option<AppRecoveryAuthPublicKey>,
    /// Replacement (or retained) hardware auth key
    pub hw_auth: HwAuthPublicKey,
}

impl DestinationAuthKeys {
    /// App half of the destination keys.
    pub fn app_auth_keys(&self) -> AppAuthPublicKeys {
        AppAuthPublicKeys {
            app_global_auth: self.app_global_auth.clone(),
            app_recovery_auth: self.app_recovery_auth.clone(),
        }
    }
}

/// Create-keyset request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateKeysetRequest {
    /// Network of the new keyset
    pub network: BitcoinNetwork,
    /// New app spending key
    pub app_spending: AppSpendingPublicKey,
    /// New hardware spending key
    pub hw_spending: HwSpendingPublicKey,
}

/// Server answer to a create-keyset request. The keyset is not active yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedKeyset {
    /// Server keyset identifier
    pub keyset_id: KeysetId,
    /// Server spending key for the keyset
    pub server_key: ServerSpendingPublicKey,
}

/// Server's authoritative view of the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatus {
    /// Account identifier
    pub account_id: AccountId,
    /// Currently active spending keyset
    pub active_keyset_id: KeysetId,
    /// Currently registered app auth keys
    pub auth_keys: AppAuthPublicKeys,
    /// Currently registered hardware auth key
    pub hw_auth_key: HwAuthPublicKey,
}

/// Initiate delay-notify request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateRecoveryRequest {
    /// Factor being replaced
    pub lost_factor: PhysicalFactor,
    /// Keys to activate on completion
    pub destination: DestinationAuthKeys,
    /// Hex of the challenge bytes signed by the opposing factor
    pub challenge: String,
    /// Signature over the challenge by the opposing factor
    pub challenge_signature: Signature,
    /// Requested delay; the server only honours it for test accounts
    pub requested_delay_secs: Option<u64>,
}

/// Server's view of an active delay-notify recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecovery {
    /// Account being recovered
    pub account_id: AccountId,
    /// Factor being replaced
    pub lost_factor: PhysicalFactor,
    /// Delay start, stamped by the server
    pub delay_start: PhysicalTime,
    /// Earliest completion time
    pub delay_end: PhysicalTime,
    /// Keys that become active on completion
    pub destination: DestinationAuthKeys,
    /// Privileged action tracking this recovery's delay
    pub action_id: ActionId,
}

/// Complete delay-notify request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteRecoveryRequest {
    /// Hex of the completion challenge bytes
    pub challenge: String,
    /// App signature over the challenge (destination global auth key)
    pub app_signature: Signature,
    /// Hardware signature over the challenge (destination hardware)
    pub hw_signature: Signature,
}

/// Auth key rotation request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotateAuthKeysRequest {
    /// Keys to register
    pub new_keys: AppAuthPublicKeys,
    /// Hex of the challenge committing to the new keys
    pub challenge: String,
    /// Signature over the challenge with the new global auth key
    pub new_app_signature: Signature,
    /// Hardware proof of possession
    pub hw_proof: ProofOfPossession,
}

/// Events delivered to the opposing factor's contact methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RecoveryNotification {
    /// A recovery was started
    RecoveryInitiated {
        /// Factor being replaced
        lost_factor: PhysicalFactor,
        /// When it becomes completable
        delay_end: PhysicalTime,
    },
    /// A recovery became completable
    RecoveryReadyToComplete {
        /// Factor being replaced
        lost_factor: PhysicalFactor,
    },
}

/// Keyset management on the co-signer.
#[async_trait]
pub trait KeysetEffects: Send + Sync {
    /// Create (not activate) a spending keyset.
    async fn create_spending_keyset(
        &self,
        account_id: &AccountId,
        request: CreateKeysetRequest,
        proof: &ProofOfPossession,
    ) -> Result<CreatedKeyset, CosignerError>;

    /// Activate a previously created keyset. Idempotent on the server.
    async fn activate_spending_keyset(
        &self,
        account_id: &AccountId,
        keyset_id: &KeysetId,
        proof: &ProofOfPossession,
    ) -> Result<(), CosignerError>;

    /// Authoritative account status.
    async fn account_status(&self, account_id: &AccountId) -> Result<AccountStatus, CosignerError>;
}

/// Delay-notify recovery on the co-signer.
#[async_trait]
pub trait DelayNotifyEffects: Send + Sync {
    /// Start a recovery; the server stamps the delay window.
    async fn initiate_delay_notify(
        &self,
        account_id: &AccountId,
        request: InitiateRecoveryRequest,
    ) -> Result<ServerRecovery, CosignerError>;

    /// Active recovery on the account, if any.
    async fn active_recovery(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<ServerRecovery>, CosignerError>;

    /// Cancel the active recovery.
    async fn cancel_delay_notify(
        &self,
        account_id: &AccountId,
        proof: &ProofOfPossession,
    ) -> Result<(), CosignerError>;

    /// Complete the active recovery once its delay has elapsed.
    async fn complete_delay_notify(
        &self,
        account_id: &AccountId,
        request: CompleteRecoveryRequest,
    ) -> Result<(), CosignerError>;

    /// Override the delay of a pending privileged action (non-production only).
    async fn override_delay(
        &self,
        account_id: &AccountId,
        action_id: &ActionId,
        delay: Duration,
    ) -> Result<ServerRecovery, CosignerError>;

    /// Trigger a notification to the opposing factor's contact methods.
    async fn notify_opposing_factor(
        &self,
        account_id: &AccountId,
        notification: RecoveryNotification,
    ) -> Result<(), CosignerError>;
}

/// Auth key rotation on the co-signer.
#[async_trait]
pub trait AuthKeyEffects: Send + Sync {
    /// Replace the account's app auth keys. Idempotent for identical keys.
    async fn rotate_auth_keys(
        &self,
        account_id: &AccountId,
        request: RotateAuthKeysRequest,
    ) -> Result<(), CosignerError>;
}

/// Everything the recovery core calls on the co-signer.
pub trait CosignerEffects: KeysetEffects + DelayNotifyEffects + AuthKeyEffects {}

impl<T> CosignerEffects for T where T: KeysetEffects + DelayNotifyEffects + AuthKeyEffects {}

#[async_trait]
impl<T: KeysetEffects + ?Sized> KeysetEffects for std::sync::Arc<T> {
    async fn create_spending_keyset(
        &self,
        account_id: &AccountId,
        request: CreateKeysetRequest,
        proof: &ProofOfPossession,
    ) -> Result<CreatedKeyset, CosignerError> {
        (**self)
            .create_spending_keyset(account_id, request, proof)
            .await
    }

    async fn activate_spending_keyset(
        &self,
        account_id: &AccountId,
        keyset_id: &KeysetId,
        proof: &ProofOfPossession,
    ) -> Result<(), CosignerError> {
        (**self)
            .activate_spending_keyset(account_id, keyset_id, proof)
            .await
    }

    async fn account_status(&self, account_id: &AccountId) -> Result<AccountStatus, CosignerError> {
        (**self).account_status(account_id).await
    }
}

#[async_trait]
impl<T: DelayNotifyEffects + ?Sized> DelayNotifyEffects for std::sync::Arc<T> {
    async fn initiate_delay_notify(
        &self,
        account_id: &AccountId,
        request: InitiateRecoveryRequest,
    ) -> Result<ServerRecovery, CosignerError> {
        (**self).initiate_delay_notify(account_id, request).await
    }

    async fn active_recovery(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<ServerRecovery>, CosignerError> {
        (**self).active_recovery(account_id).await
    }

    async fn cancel_delay_notify(
        &self,
        account_id: &AccountId,
        proof: &ProofOfPossession,
    ) -> Result<(), CosignerError> {
        (**self).cancel_delay_notify(account_id, proof).await
    }

    async fn complete_delay_notify(
        &self,
        account_id: &AccountId,
        request: CompleteRecoveryRequest,
    ) -> Result<(), CosignerError> {
        (**self).complete_delay_notify(account_id, request).await
    }

    async fn override_delay(
        &self,
        account_id: &AccountId,
        action_id: &ActionId,
        delay: Duration,
    ) -> Result<ServerRecovery, CosignerError> {
        (**self).override_delay(account_id, action_id, delay).await
    }

    async fn notify_opposing_factor(
        &self,
        account_id: &AccountId,
        notification: RecoveryNotification,
    ) -> Result<(), CosignerError> {
        (**self)
            .notify_opposing_factor(account_id, notification)
            .await
    }
}

#[async_trait]
impl<T: AuthKeyEffects + ?Sized> AuthKeyEffects for std::sync::Arc<T> {
    async fn rotate_auth_keys(
        &self,
        account_id: &AccountId,
        request: RotateAuthKeysRequest,
    ) -> Result<(), CosignerError> {
        (**self).rotate_auth_keys(account_id, request).await
    }
}
