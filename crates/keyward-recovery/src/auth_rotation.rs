//! App auth key rotation outside of recovery.
//!
//! The pending rotation is persisted before anything is signed, and marked
//! `Submitted` before the co-signer is called. After a crash a `Submitted`
//! rotation is settled against the server's account status: it either was
//! applied and is finished locally, or it never was and is dropped.

use crate::challenge::ChallengeBuilder;
use crate::dao::{
    AuthKeyRotationAttemptDao, KeyboxDao, PendingAuthKeyRotation, RecoveryDao, RotationState,
};
use crate::effects::RecoveryEffects;
use crate::error::{RecoveryError, Result};
use crate::retry::with_retry;
use crate::sequencer::SyncSequencer;
use keyward_core::effects::{
    CosignerError, HardwareSession, HardwareSigner, RotateAuthKeysRequest,
};
use keyward_core::{
    AccountId, AppAuthPublicKeys, AppFactorProofOfPossession, Keybox, PhysicalTime,
    ProofOfPossession, RetryConfig,
};
use std::sync::Arc;

/// How a pending rotation was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationSettlement {
    /// Nothing was pending
    NoPending,
    /// The new keys are active locally and on the server
    Rotated(Keybox),
    /// The rotation was dropped; the old keys remain active
    Discarded,
    /// Not yet sent; retry `rotate` or `cancel` it
    StillProposed,
}

/// Rotates the app auth keys of an account's active keybox.
pub struct AuthKeyRotationService<E: RecoveryEffects> {
    effects: Arc<E>,
    retry: RetryConfig,
    sequencer: Arc<SyncSequencer>,
    pending: AuthKeyRotationAttemptDao<E>,
    keyboxes: KeyboxDao<E>,
    recoveries: RecoveryDao<E>,
}

impl<E: RecoveryEffects> AuthKeyRotationService<E> {
    pub fn new(effects: Arc<E>, retry: RetryConfig, sequencer: Arc<SyncSequencer>) -> Self {
        Self {
            pending: AuthKeyRotationAttemptDao::new(effects.clone()),
            keyboxes: KeyboxDao::new(effects.clone()),
            recoveries: RecoveryDao::new(effects.clone()),
            effects,
            retry,
            sequencer,
        }
    }

    pub async fn pending(&self, account: &AccountId) -> Result<Option<PendingAuthKeyRotation>> {
        self.pending.get(account).await
    }

    /// Replace the app auth keys with `new_keys`, which must already be in
    /// the app keystore. `hardware` proves possession of the current device.
    pub async fn rotate(
        &self,
        account: &AccountId,
        new_keys: AppAuthPublicKeys,
        hardware: &dyn HardwareSigner,
    ) -> Result<Keybox> {
        self.sequencer
            .run(account, || self.rotate_locked(account, new_keys, hardware))
            .await
    }

    /// Settle a rotation left behind by a previous run.
    pub async fn resume(&self, account: &AccountId) -> Result<RotationSettlement> {
        self.sequencer
            .run(account, || self.resume_locked(account))
            .await
    }

    /// Drop a rotation that was never sent. A sent one is settled instead.
    pub async fn cancel(&self, account: &AccountId) -> Result<RotationSettlement> {
        self.sequencer
            .run(account, || async move {
                match self.pending.get(account).await? {
                    None => Ok(RotationSettlement::NoPending),
                    Some(pending) if pending.state == RotationState::Proposed => {
                        self.pending.clear(account).await?;
                        tracing::info!(account = %account, "auth key rotation canceled");
                        Ok(RotationSettlement::Discarded)
                    }
                    Some(_) => self.resume_locked(account).await,
                }
            })
            .await
    }

    async fn rotate_locked(
        &self,
        account: &AccountId,
        new_keys: AppAuthPublicKeys,
        hardware: &dyn HardwareSigner,
    ) -> Result<Keybox> {
        if self.recoveries.get(account).await?.is_some() {
            return Err(RecoveryError::invalid_state(
                "auth keys cannot be rotated while a recovery is in progress",
            ));
        }
        let keybox = self.keyboxes.active(account).await?.ok_or_else(|| {
            RecoveryError::invalid_state(format!("no active keybox for account {account}"))
        })?;

        let now = self.now().await?;
        let mut pending = match self.pending.get(account).await? {
            Some(existing) if existing.new_keys != new_keys => {
                return Err(RecoveryError::invalid_state(
                    "a rotation to different keys is already pending",
                ));
            }
            Some(existing) => existing,
            None if keybox.app_auth_keys == new_keys => return Ok(keybox),
            None => {
                let proposed = PendingAuthKeyRotation {
                    account_id: account.clone(),
                    new_keys: new_keys.clone(),
                    state: RotationState::Proposed,
                    created_at: now,
                };
                self.pending.put(&proposed).await?;
                tracing::info!(account = %account, "auth key rotation proposed");
                proposed
            }
        };

        let challenge =
            ChallengeBuilder::auth_key_rotation(account, &new_keys, &keybox.hw_auth_key);
        let new_app_signature = self
            .effects
            .sign_with_global_auth_key(&new_keys.app_global_auth, challenge.as_bytes())
            .await?;
        let app_proof = self
            .effects
            .sign_with_global_auth_key(
                &keybox.app_auth_keys.app_global_auth,
                account.as_str().as_bytes(),
            )
            .await?;
        let hw_proof = hardware
            .prove_possession(account, HardwareSession::default())
            .await?;

        pending.state = RotationState::Submitted;
        self.pending.put(&pending).await?;

        let request = RotateAuthKeysRequest {
            new_keys: new_keys.clone(),
            challenge: challenge.to_hex(),
            new_app_signature,
            hw_proof: ProofOfPossession::both(AppFactorProofOfPossession(app_proof), hw_proof),
        };
        let rotated = with_retry(&*self.effects, &self.retry, "rotate_auth_keys", || {
            self.effects.rotate_auth_keys(account, request.clone())
        })
        .await;

        match rotated {
            Ok(()) => self.finish(account, &keybox, new_keys).await,
            Err(CosignerError::Unauthorized { message }) => {
                pending.state = RotationState::Proposed;
                self.pending.put(&pending).await?;
                tracing::warn!(account = %account, "auth key rotation needs a fresh proof");
                Err(RecoveryError::authorization(message))
            }
            Err(err @ (CosignerError::Network { .. } | CosignerError::Conflict { .. })) => {
                tracing::warn!(
                    account = %account,
                    error = %err,
                    "auth key rotation outcome unknown; left submitted"
                );
                Err(err.into())
            }
            Err(err) => {
                self.pending.clear(account).await?;
                tracing::warn!(account = %account, error = %err, "auth key rotation rejected");
                Err(err.into())
            }
        }
    }

    async fn resume_locked(&self, account: &AccountId) -> Result<RotationSettlement> {
        let Some(pending) = self.pending.get(account).await? else {
            return Ok(RotationSettlement::NoPending);
        };
        if pending.state == RotationState::Proposed {
            return Ok(RotationSettlement::StillProposed);
        }

        let status = with_retry(&*self.effects, &self.retry, "account_status", || {
            self.effects.account_status(account)
        })
        .await?;
        if status.auth_keys == pending.new_keys {
            let keybox = self.keyboxes.active(account).await?.ok_or_else(|| {
                RecoveryError::invalid_state(format!("no active keybox for account {account}"))
            })?;
            let rotated = self.finish(account, &keybox, pending.new_keys).await?;
            Ok(RotationSettlement::Rotated(rotated))
        } else {
            self.pending.clear(account).await?;
            tracing::info!(account = %account, "submitted auth key rotation was never applied");
            Ok(RotationSettlement::Discarded)
        }
    }

    async fn finish(
        &self,
        account: &AccountId,
        keybox: &Keybox,
        new_keys: AppAuthPublicKeys,
    ) -> Result<Keybox> {
        let now = self.now().await?;
        let rotated = self
            .keyboxes
            .rotate_keybox_auth_keys(account, new_keys, keybox.hw_auth_key.clone(), now)
            .await?;
        self.pending.clear(account).await?;
        tracing::info!(account = %account, keybox = %rotated.id, "app auth keys rotated");
        Ok(rotated)
    }

    async fn now(&self) -> Result<PhysicalTime> {
        Ok(self.effects.physical_time().await?)
    }
}
