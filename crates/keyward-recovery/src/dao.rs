//! Durable stores over `StorageEffects`.
//!
//! Records are JSON. Storage layout:
//!
//! | key | record |
//! |-----|--------|
//! | `recovery/active/{account}` | the single active [`RecoveryAttempt`] |
//! | `recovery/archive/{account}/{ms}` | [`ArchivedAttempt`] |
//! | `keybox/active/{account}` | active [`Keybox`] |
//! | `keybox/onboarding/{account}` | keybox being onboarded |
//! | `keybox/archive/{account}/{keybox_id}` | superseded keyboxes |
//! | `auth-rotation/pending/{account}` | [`PendingAuthKeyRotation`] |

use crate::attempt::{ArchivedAttempt, AttemptOutcome, RecoveryAttempt};
use crate::error::{RecoveryError, Result};
use keyward_core::effects::StorageEffects;
use keyward_core::{AccountId, AppAuthPublicKeys, HwAuthPublicKey, Keybox, PhysicalTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn active_attempt_key(account: &AccountId) -> String {
    format!("recovery/active/{account}")
}

fn attempt_archive_prefix(account: &AccountId) -> String {
    format!("recovery/archive/{account}/")
}

fn active_keybox_key(account: &AccountId) -> String {
    format!("keybox/active/{account}")
}

fn onboarding_keybox_key(account: &AccountId) -> String {
    format!("keybox/onboarding/{account}")
}

fn keybox_archive_prefix(account: &AccountId) -> String {
    format!("keybox/archive/{account}/")
}

fn pending_rotation_key(account: &AccountId) -> String {
    format!("auth-rotation/pending/{account}")
}

async fn read_json<S, T>(storage: &S, key: &str) -> Result<Option<T>>
where
    S: StorageEffects + ?Sized,
    T: DeserializeOwned,
{
    match storage.retrieve(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

async fn write_json<S, T>(storage: &S, key: &str, value: &T) -> Result<()>
where
    S: StorageEffects + ?Sized,
    T: Serialize,
{
    let bytes = serde_json::to_vec(value)?;
    storage.store(key, bytes).await?;
    Ok(())
}

async fn read_all<S, T>(storage: &S, prefix: &str) -> Result<Vec<T>>
where
    S: StorageEffects + ?Sized,
    T: DeserializeOwned,
{
    let mut records = Vec::new();
    for key in storage.list_keys(Some(prefix)).await? {
        if let Some(record) = read_json(storage, &key).await? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Store for recovery attempts.
pub struct RecoveryDao<S: ?Sized> {
    storage: Arc<S>,
}

impl<S: StorageEffects + ?Sized> RecoveryDao<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    pub async fn get(&self, account: &AccountId) -> Result<Option<RecoveryAttempt>> {
        read_json(&*self.storage, &active_attempt_key(account)).await
    }

    /// Insert an attempt into the empty active slot.
    pub async fn insert_new(&self, attempt: &RecoveryAttempt) -> Result<()> {
        if self.get(&attempt.account_id).await?.is_some() {
            return Err(RecoveryError::AttemptInProgress {
                account: attempt.account_id.clone(),
            });
        }
        write_json(&*self.storage, &active_attempt_key(&attempt.account_id), attempt).await
    }

    /// Overwrite the active attempt.
    pub async fn update(&self, attempt: &RecoveryAttempt) -> Result<()> {
        if self.get(&attempt.account_id).await?.is_none() {
            return Err(RecoveryError::NoActiveAttempt {
                account: attempt.account_id.clone(),
            });
        }
        write_json(&*self.storage, &active_attempt_key(&attempt.account_id), attempt).await
    }

    /// Drop the active attempt without archiving it.
    pub async fn remove(&self, account: &AccountId) -> Result<bool> {
        Ok(self.storage.remove(&active_attempt_key(account)).await?)
    }

    /// Move the attempt to the archive with its outcome.
    pub async fn archive(
        &self,
        attempt: RecoveryAttempt,
        outcome: AttemptOutcome,
        archived_at: PhysicalTime,
    ) -> Result<ArchivedAttempt> {
        let account = attempt.account_id.clone();
        let prefix = attempt_archive_prefix(&account);
        let base = format!("{prefix}{:020}", archived_at.ts_ms);
        let mut key = base.clone();
        let mut suffix = 1;
        while self.storage.retrieve(&key).await?.is_some() {
            key = format!("{base}-{suffix:03}");
            suffix += 1;
        }

        let archived = ArchivedAttempt {
            attempt,
            outcome,
            archived_at,
        };
        write_json(&*self.storage, &key, &archived).await?;
        self.remove(&account).await?;
        tracing::info!(account = %account, outcome = ?outcome, "recovery attempt archived");
        Ok(archived)
    }

    /// Archived attempts, oldest first.
    pub async fn archived(&self, account: &AccountId) -> Result<Vec<ArchivedAttempt>> {
        read_all(&*self.storage, &attempt_archive_prefix(account)).await
    }
}

/// Store for keyboxes.
pub struct KeyboxDao<S: ?Sized> {
    storage: Arc<S>,
}

impl<S: StorageEffects + ?Sized> KeyboxDao<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    pub async fn active(&self, account: &AccountId) -> Result<Option<Keybox>> {
        read_json(&*self.storage, &active_keybox_key(account)).await
    }

    pub async fn onboarding(&self, account: &AccountId) -> Result<Option<Keybox>> {
        read_json(&*self.storage, &onboarding_keybox_key(account)).await
    }

    pub async fn save_onboarding(&self, keybox: &Keybox) -> Result<()> {
        write_json(
            &*self.storage,
            &onboarding_keybox_key(&keybox.account_id),
            keybox,
        )
        .await
    }

    /// Make `keybox` the only active keybox, archiving the previous one and
    /// clearing any onboarding keybox.
    pub async fn activate(&self, keybox: &Keybox) -> Result<()> {
        let account = &keybox.account_id;
        if let Some(previous) = self.active(account).await? {
            if previous.id != keybox.id {
                self.archive(&previous).await?;
            }
        }
        write_json(&*self.storage, &active_keybox_key(account), keybox).await?;
        self.storage.remove(&onboarding_keybox_key(account)).await?;
        tracing::info!(
            account = %account,
            keybox = %keybox.id,
            keyset = %keybox.active_keyset_id(),
            "keybox activated"
        );
        Ok(())
    }

    /// Replace the auth keys of the active keybox with a new revision.
    ///
    /// A no-op when the keybox already holds these keys.
    pub async fn rotate_keybox_auth_keys(
        &self,
        account: &AccountId,
        app_auth_keys: AppAuthPublicKeys,
        hw_auth_key: HwAuthPublicKey,
        now: PhysicalTime,
    ) -> Result<Keybox> {
        let current = self.active(account).await?.ok_or_else(|| {
            RecoveryError::invalid_state(format!("no active keybox for account {account}"))
        })?;
        if current.app_auth_keys == app_auth_keys && current.hw_auth_key == hw_auth_key {
            return Ok(current);
        }
        let rotated = current.with_auth_keys(app_auth_keys, hw_auth_key, now);
        self.activate(&rotated).await?;
        Ok(rotated)
    }

    pub async fn archived(&self, account: &AccountId) -> Result<Vec<Keybox>> {
        let mut keyboxes: Vec<Keybox> =
            read_all(&*self.storage, &keybox_archive_prefix(account)).await?;
        keyboxes.sort_by_key(|keybox| keybox.created_at);
        Ok(keyboxes)
    }

    async fn archive(&self, keybox: &Keybox) -> Result<()> {
        let key = format!(
            "{}{}",
            keybox_archive_prefix(&keybox.account_id),
            keybox.id.0
        );
        write_json(&*self.storage, &key, keybox).await
    }
}

/// Lifecycle of an auth key rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationState {
    /// Persisted, not yet sent
    Proposed,
    /// Sent; the server may or may not have applied it
    Submitted,
}

/// In-flight auth key rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthKeyRotation {
    pub account_id: AccountId,
    pub new_keys: AppAuthPublicKeys,
    pub state: RotationState,
    pub created_at: PhysicalTime,
}

/// Store for the pending auth key rotation.
pub struct AuthKeyRotationAttemptDao<S: ?Sized> {
    storage: Arc<S>,
}

impl<S: StorageEffects + ?Sized> AuthKeyRotationAttemptDao<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    pub async fn get(&self, account: &AccountId) -> Result<Option<PendingAuthKeyRotation>> {
        read_json(&*self.storage, &pending_rotation_key(account)).await
    }

    pub async fn put(&self, pending: &PendingAuthKeyRotation) -> Result<()> {
        write_json(
            &*self.storage,
            &pending_rotation_key(&pending.account_id),
            pending,
        )
        .await
    }

    pub async fn clear(&self, account: &AccountId) -> Result<bool> {
        Ok(self.storage.remove(&pending_rotation_key(account)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::AttemptPhase;
    use assert_matches::assert_matches;
    use keyward_core::effects::DestinationAuthKeys;
    use keyward_core::{PhysicalFactor, Signature};
    use keyward_testkit::{test_key, MemoryStorageHandler, WalletFixture};
    use std::time::Duration;

    fn attempt(account: &AccountId) -> RecoveryAttempt {
        RecoveryAttempt {
            account_id: account.clone(),
            lost_factor: PhysicalFactor::Hardware,
            destination: DestinationAuthKeys {
                app_global_auth: test_key("dest-app"),
                app_recovery_auth: None,
                hw_auth: test_key("dest-hw"),
            },
            challenge_ref: "ref".to_string(),
            challenge_signature: Signature("00".to_string()),
            requested_delay_secs: Some(60),
            phase: AttemptPhase::Initiated,
            ready_notified: false,
            created_at: PhysicalTime::from_secs(1),
        }
    }

    #[tokio::test]
    async fn one_active_attempt_per_account() {
        let dao = RecoveryDao::new(Arc::new(MemoryStorageHandler::new()));
        let account = AccountId::new("acct-1").unwrap();

        dao.insert_new(&attempt(&account)).await.unwrap();
        assert_matches!(
            dao.insert_new(&attempt(&account)).await,
            Err(RecoveryError::AttemptInProgress { .. })
        );

        let stored = dao.get(&account).await.unwrap().unwrap();
        dao.archive(stored.clone(), AttemptOutcome::Canceled, PhysicalTime::from_secs(5))
            .await
            .unwrap();
        dao.archive(stored, AttemptOutcome::Canceled, PhysicalTime::from_secs(5))
            .await
            .unwrap();
        assert!(dao.get(&account).await.unwrap().is_none());
        assert_eq!(dao.archived(&account).await.unwrap().len(), 2);

        dao.insert_new(&attempt(&account)).await.unwrap();
    }

    #[tokio::test]
    async fn update_requires_active_attempt() {
        let dao = RecoveryDao::new(Arc::new(MemoryStorageHandler::new()));
        let account = AccountId::new("acct-1").unwrap();
        assert_matches!(
            dao.update(&attempt(&account)).await,
            Err(RecoveryError::NoActiveAttempt { .. })
        );
    }

    #[tokio::test]
    async fn activation_archives_previous_keybox() {
        let wallet = WalletFixture::new(Duration::from_secs(60));
        let dao = KeyboxDao::new(Arc::new(wallet.effects.storage.clone()));
        let account = &wallet.account_id;

        dao.save_onboarding(&wallet.keybox).await.unwrap();
        dao.activate(&wallet.keybox).await.unwrap();
        assert!(dao.onboarding(account).await.unwrap().is_none());
        assert!(dao.archived(account).await.unwrap().is_empty());

        let new_keys = wallet.rotated_app_keys("rotated");
        let rotated = dao
            .rotate_keybox_auth_keys(
                account,
                new_keys.clone(),
                wallet.keybox.hw_auth_key.clone(),
                PhysicalTime::from_secs(10),
            )
            .await
            .unwrap();
        assert_ne!(rotated.id, wallet.keybox.id);
        assert_eq!(rotated.app_auth_keys, new_keys);
        assert_eq!(dao.active(account).await.unwrap(), Some(rotated.clone()));
        assert_eq!(dao.archived(account).await.unwrap(), vec![wallet.keybox.clone()]);

        // Same keys again: nothing new is written
        let again = dao
            .rotate_keybox_auth_keys(
                account,
                new_keys,
                wallet.keybox.hw_auth_key.clone(),
                PhysicalTime::from_secs(20),
            )
            .await
            .unwrap();
        assert_eq!(again.id, rotated.id);
        assert_eq!(dao.archived(account).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pending_rotation_round_trip() {
        let dao = AuthKeyRotationAttemptDao::new(Arc::new(MemoryStorageHandler::new()));
        let account = AccountId::new("acct-1").unwrap();
        let pending = PendingAuthKeyRotation {
            account_id: account.clone(),
            new_keys: AppAuthPublicKeys {
                app_global_auth: test_key("new"),
                app_recovery_auth: None,
            },
            state: RotationState::Proposed,
            created_at: PhysicalTime::from_secs(1),
        };
        dao.put(&pending).await.unwrap();
        assert_eq!(dao.get(&account).await.unwrap(), Some(pending));
        assert!(dao.clear(&account).await.unwrap());
        assert!(dao.get(&account).await.unwrap().is_none());
    }
}
