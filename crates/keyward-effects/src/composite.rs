//! Composite effect system.
//!
//! `KeywardEffects` bundles one handler per effect trait and delegates every
//! call, so recovery components can take a single `Arc<E>` bounded by the
//! composed traits they need. Handlers are injected at construction; nothing
//! here reaches for global state.

use crate::{FilesystemStorageHandler, RealTimeHandler, SingleWriterStorage};
use async_trait::async_trait;
use keyward_core::effects::{
    AccountStatus, AppKeyEffects, AppKeyError, AuthKeyEffects, CompleteRecoveryRequest,
    CosignerEffects, CosignerError, CreateKeysetRequest, CreatedKeyset, DelayNotifyEffects,
    InitiateRecoveryRequest, KeysetEffects, PhysicalTimeEffects, RecoveryNotification,
    RotateAuthKeysRequest, ServerRecovery, StorageEffects, StorageError, TimeError,
};
use keyward_core::{
    AccountId, ActionId, AppGlobalAuthPublicKey, AppRecoveryAuthPublicKey, KeysetId,
    KeywardConfig, PhysicalTime, ProofOfPossession, Signature,
};
use std::sync::Arc;
use std::time::Duration;

/// Production effect system.
#[derive(Clone)]
pub struct KeywardEffects {
    time: Arc<dyn PhysicalTimeEffects>,
    storage: Arc<dyn StorageEffects>,
    cosigner: Arc<dyn CosignerEffects>,
    app_keys: Arc<dyn AppKeyEffects>,
}

impl KeywardEffects {
    pub fn new(
        time: Arc<dyn PhysicalTimeEffects>,
        storage: Arc<dyn StorageEffects>,
        cosigner: Arc<dyn CosignerEffects>,
        app_keys: Arc<dyn AppKeyEffects>,
    ) -> Self {
        Self {
            time,
            storage,
            cosigner,
            app_keys,
        }
    }

    /// System clock plus single-writer filesystem storage at the configured path.
    ///
    /// Must be called inside a tokio runtime; the storage actor is spawned here.
    pub fn production(
        config: &KeywardConfig,
        cosigner: Arc<dyn CosignerEffects>,
        app_keys: Arc<dyn AppKeyEffects>,
    ) -> Self {
        let storage = SingleWriterStorage::spawn(
            FilesystemStorageHandler::new(config.storage.base_path.clone()),
            config.storage.channel_capacity,
        );
        Self::new(
            Arc::new(RealTimeHandler::new()),
            Arc::new(storage),
            cosigner,
            app_keys,
        )
    }

    pub fn time(&self) -> Arc<dyn PhysicalTimeEffects> {
        self.time.clone()
    }

    pub fn storage(&self) -> Arc<dyn StorageEffects> {
        self.storage.clone()
    }
}

impl std::fmt::Debug for KeywardEffects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywardEffects").finish_non_exhaustive()
    }
}

#[async_trait]
impl PhysicalTimeEffects for KeywardEffects {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        self.time.physical_time().await
    }

    async fn sleep_ms(&self, ms: u64) -> Result<(), TimeError> {
        self.time.sleep_ms(ms).await
    }
}

#[async_trait]
impl StorageEffects for KeywardEffects {
    async fn store(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.storage.store(key, value).await
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.storage.retrieve(key).await
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        self.storage.remove(key).await
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        self.storage.list_keys(prefix).await
    }
}

#[async_trait]
impl KeysetEffects for KeywardEffects {
    async fn create_spending_keyset(
        &self,
        account_id: &AccountId,
        request: CreateKeysetRequest,
        proof: &ProofOfPossession,
    ) -> Result<CreatedKeyset, CosignerError> {
        self.cosigner
            .create_spending_keyset(account_id, request, proof)
            .await
    }

    async fn activate_spending_keyset(
        &self,
        account_id: &AccountId,
        keyset_id: &KeysetId,
        proof: &ProofOfPossession,
    ) -> Result<(), CosignerError> {
        self.cosigner
            .activate_spending_keyset(account_id, keyset_id, proof)
            .await
    }

    async fn account_status(&self, account_id: &AccountId) -> Result<AccountStatus, CosignerError> {
        self.cosigner.account_status(account_id).await
    }
}

#[async_trait]
impl DelayNotifyEffects for KeywardEffects {
    async fn initiate_delay_notify(
        &self,
        account_id: &AccountId,
        request: InitiateRecoveryRequest,
    ) -> Result<ServerRecovery, CosignerError> {
        self.cosigner.initiate_delay_notify(account_id, request).await
    }

    async fn active_recovery(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<ServerRecovery>, CosignerError> {
        self.cosigner.active_recovery(account_id).await
    }

    async fn cancel_delay_notify(
        &self,
        account_id: &AccountId,
        proof: &ProofOfPossession,
    ) -> Result<(), CosignerError> {
        self.cosigner.cancel_delay_notify(account_id, proof).await
    }

    async fn complete_delay_notify(
        &self,
        account_id: &AccountId,
        request: CompleteRecoveryRequest,
    ) -> Result<(), CosignerError> {
        self.cosigner.complete_delay_notify(account_id, request).await
    }

    async fn override_delay(
        &self,
        account_id: &AccountId,
        action_id: &ActionId,
        delay: Duration,
    ) -> Result<ServerRecovery, CosignerError> {
        self.cosigner
            .override_delay(account_id, action_id, delay)
            .await
    }

    async fn notify_opposing_factor(
        &self,
        account_id: &AccountId,
        notification: RecoveryNotification,
    ) -> Result<(), CosignerError> {
        self.cosigner
            .notify_opposing_factor(account_id, notification)
            .await
    }
}

#[async_trait]
impl AuthKeyEffects for KeywardEffects {
    async fn rotate_auth_keys(
        &self,
        account_id: &AccountId,
        request: RotateAuthKeysRequest,
    ) -> Result<(), CosignerError> {
        self.cosigner.rotate_auth_keys(account_id, request).await
    }
}

#[async_trait]
impl AppKeyEffects for KeywardEffects {
    async fn sign_with_global_auth_key(
        &self,
        key: &AppGlobalAuthPublicKey,
        message: &[u8],
    ) -> Result<Signature, AppKeyError> {
        self.app_keys.sign_with_global_auth_key(key, message).await
    }

    async fn sign_with_recovery_auth_key(
        &self,
        key: &AppRecoveryAuthPublicKey,
        message: &[u8],
    ) -> Result<Signature, AppKeyError> {
        self.app_keys.sign_with_recovery_auth_key(key, message).await
    }
}

/// App key handler for processes without keystore access.
///
/// Every signing request fails with [`AppKeyError::KeyNotFound`]; read-only
/// tools use it to build an effect system that can observe but never sign.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableAppKeys;

#[async_trait]
impl AppKeyEffects for UnavailableAppKeys {
    async fn sign_with_global_auth_key(
        &self,
        key: &AppGlobalAuthPublicKey,
        _message: &[u8],
    ) -> Result<Signature, AppKeyError> {
        Err(AppKeyError::KeyNotFound {
            public_key: key.as_hex().to_string(),
        })
    }

    async fn sign_with_recovery_auth_key(
        &self,
        key: &AppRecoveryAuthPublicKey,
        _message: &[u8],
    ) -> Result<Signature, AppKeyError> {
        Err(AppKeyError::KeyNotFound {
            public_key: key.as_hex().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "02a1633cafcc01ebfb6d78e39f687a1f0995c62fc95f51ead10a02ee0be551b5dc";

    #[tokio::test]
    async fn unavailable_app_keys_never_sign() {
        let key = AppGlobalAuthPublicKey::from_hex(KEY).unwrap();
        let err = UnavailableAppKeys
            .sign_with_global_auth_key(&key, b"msg")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AppKeyError::KeyNotFound {
                public_key: KEY.to_string()
            }
        );
    }
}
