//! Composed deterministic effect system for one app install.

use crate::cosigner::FakeCosigner;
use crate::signers::FakeAppKeys;
use crate::storage::MemoryStorageHandler;
use crate::time::MockTimeHandler;
use async_trait::async_trait;
use keyward_core::effects::{
    AccountStatus, AppKeyEffects, AppKeyError, AuthKeyEffects, CompleteRecoveryRequest,
    CosignerError, CreateKeysetRequest, CreatedKeyset, DelayNotifyEffects,
    InitiateRecoveryRequest, KeysetEffects, PhysicalTimeEffects, RecoveryNotification,
    RotateAuthKeysRequest, ServerRecovery, StorageEffects, StorageError, TimeError,
};
use keyward_core::{
    AccountId, ActionId, AppGlobalAuthPublicKey, AppRecoveryAuthPublicKey, KeysetId, PhysicalTime,
    ProofOfPossession, Signature,
};
use std::time::Duration;

/// One install: its own storage and keystore, a shared clock and server.
#[derive(Debug, Clone)]
pub struct TestEffects {
    pub time: MockTimeHandler,
    pub storage: MemoryStorageHandler,
    pub cosigner: FakeCosigner,
    pub app_keys: FakeAppKeys,
}

impl TestEffects {
    pub fn new(time: MockTimeHandler, cosigner: FakeCosigner, app_keys: FakeAppKeys) -> Self {
        Self {
            time,
            storage: MemoryStorageHandler::new(),
            cosigner,
            app_keys,
        }
    }

    /// A second install sharing this one's clock and server.
    pub fn other_install(&self, app_keys: FakeAppKeys) -> Self {
        Self::new(self.time.clone(), self.cosigner.clone(), app_keys)
    }
}

#[async_trait]
impl PhysicalTimeEffects for TestEffects {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        self.time.physical_time().await
    }

    async fn sleep_ms(&self, ms: u64) -> Result<(), TimeError> {
        self.time.sleep_ms(ms).await
    }
}

#[async_trait]
impl StorageEffects for TestEffects {
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
impl KeysetEffects for TestEffects {
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
impl DelayNotifyEffects for TestEffects {
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
impl AuthKeyEffects for TestEffects {
    async fn rotate_auth_keys(
        &self,
        account_id: &AccountId,
        request: RotateAuthKeysRequest,
    ) -> Result<(), CosignerError> {
        self.cosigner.rotate_auth_keys(account_id, request).await
    }
}

#[async_trait]
impl AppKeyEffects for TestEffects {
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
