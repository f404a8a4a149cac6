//! Spending keyset creation and activation on the co-signer.
//!
//! Neither operation takes the sync sequencer itself. Callers run them
//! inside [`crate::SyncSequencer::run`] for the account.

use crate::error::{RecoveryError, Result};
use crate::retry::with_retry;
use keyward_core::effects::{
    AppKeyEffects, CosignerError, CreateKeysetRequest, KeysetEffects, PhysicalTimeEffects,
};
use keyward_core::{
    AccountId, AppFactorProofOfPossession, AppGlobalAuthPublicKey, AppSpendingPublicKey,
    BitcoinNetwork, HwFactorProofOfPossession, HwSpendingPublicKey, ProofOfPossession,
    RetryConfig, SpendingKeyset,
};
use std::sync::Arc;

/// Creates and activates replacement spending keysets.
pub struct KeyRotator<E> {
    effects: Arc<E>,
    retry: RetryConfig,
}

impl<E> KeyRotator<E>
where
    E: PhysicalTimeEffects + KeysetEffects + AppKeyEffects,
{
    pub fn new(effects: Arc<E>, retry: RetryConfig) -> Self {
        Self { effects, retry }
    }

    async fn proof(
        &self,
        account_id: &AccountId,
        app_auth_key: &AppGlobalAuthPublicKey,
        hw_proof: &HwFactorProofOfPossession,
    ) -> Result<ProofOfPossession> {
        let app_signature = self
            .effects
            .sign_with_global_auth_key(app_auth_key, account_id.as_str().as_bytes())
            .await?;
        Ok(ProofOfPossession::both(
            AppFactorProofOfPossession(app_signature),
            hw_proof.clone(),
        ))
    }

    /// Create a keyset on the server. The keyset is not active afterwards.
    pub async fn create_spending_keyset(
        &self,
        account_id: &AccountId,
        app_auth_key: &AppGlobalAuthPublicKey,
        hw_proof: &HwFactorProofOfPossession,
        app_spending: &AppSpendingPublicKey,
        hw_spending: &HwSpendingPublicKey,
        network: BitcoinNetwork,
    ) -> Result<SpendingKeyset> {
        let proof = self.proof(account_id, app_auth_key, hw_proof).await?;
        let request = CreateKeysetRequest {
            network,
            app_spending: app_spending.clone(),
            hw_spending: hw_spending.clone(),
        };

        let created = with_retry(&*self.effects, &self.retry, "create_spending_keyset", || {
            self.effects
                .create_spending_keyset(account_id, request.clone(), &proof)
        })
        .await?;

        tracing::info!(
            account = %account_id,
            keyset = %created.keyset_id,
            "spending keyset created"
        );
        Ok(SpendingKeyset::from_server(
            created.keyset_id,
            network,
            app_spending.clone(),
            hw_spending.clone(),
            created.server_key,
        ))
    }

    /// Make `keyset` the account's active keyset. Succeeds without a server
    /// write when it is already active.
    pub async fn activate_spending_keyset(
        &self,
        account_id: &AccountId,
        keyset: &SpendingKeyset,
        app_auth_key: &AppGlobalAuthPublicKey,
        hw_proof: &HwFactorProofOfPossession,
    ) -> Result<()> {
        if self.is_active(account_id, keyset).await? {
            tracing::debug!(
                account = %account_id,
                keyset = %keyset.keyset_id,
                "keyset already active"
            );
            return Ok(());
        }

        let proof = self.proof(account_id, app_auth_key, hw_proof).await?;
        let activated = with_retry(&*self.effects, &self.retry, "activate_spending_keyset", || {
            self.effects
                .activate_spending_keyset(account_id, &keyset.keyset_id, &proof)
        })
        .await;

        match activated {
            Ok(()) => {}
            Err(CosignerError::Conflict { code, message }) => {
                if !self.is_active(account_id, keyset).await? {
                    return Err(RecoveryError::conflict(format!(
                        "keyset {} could not be activated ({code}: {message})",
                        keyset.keyset_id
                    )));
                }
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(
            account = %account_id,
            keyset = %keyset.keyset_id,
            "spending keyset activated"
        );
        Ok(())
    }

    async fn is_active(&self, account_id: &AccountId, keyset: &SpendingKeyset) -> Result<bool> {
        let status = with_retry(&*self.effects, &self.retry, "account_status", || {
            self.effects.account_status(account_id)
        })
        .await?;
        Ok(status.active_keyset_id == keyset.keyset_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use keyward_core::effects::HardwareSigner;
    use keyward_core::effects::HardwareSession;
    use keyward_testkit::{spending_keys, CosignerOp, TestEffects, WalletFixture};
    use std::time::Duration;

    fn rotator(wallet: &WalletFixture) -> KeyRotator<TestEffects> {
        KeyRotator::new(Arc::new(wallet.effects.clone()), RetryConfig::default())
    }

    async fn hw_proof(wallet: &WalletFixture) -> HwFactorProofOfPossession {
        wallet
            .hardware
            .prove_possession(&wallet.account_id, HardwareSession::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_then_activate() {
        let wallet = WalletFixture::new(Duration::from_secs(60));
        let rotator = rotator(&wallet);
        let proof = hw_proof(&wallet).await;
        let (app, hw) = spending_keys("next");
        let app_key = &wallet.keybox.app_auth_keys.app_global_auth;

        let keyset = rotator
            .create_spending_keyset(
                &wallet.account_id,
                app_key,
                &proof,
                &app,
                &hw,
                BitcoinNetwork::Signet,
            )
            .await
            .unwrap();
        assert_eq!(keyset.app_key, app);
        assert_ne!(
            wallet.cosigner.active_keyset(&wallet.account_id),
            Some(keyset.keyset_id.clone())
        );

        rotator
            .activate_spending_keyset(&wallet.account_id, &keyset, app_key, &proof)
            .await
            .unwrap();
        assert_eq!(
            wallet.cosigner.active_keyset(&wallet.account_id),
            Some(keyset.keyset_id)
        );
    }

    #[tokio::test]
    async fn activating_the_active_keyset_is_a_no_op() {
        let wallet = WalletFixture::new(Duration::from_secs(60));
        let rotator = rotator(&wallet);
        let proof = hw_proof(&wallet).await;
        let app_key = &wallet.keybox.app_auth_keys.app_global_auth;

        for _ in 0..2 {
            rotator
                .activate_spending_keyset(
                    &wallet.account_id,
                    &wallet.keybox.spending_keyset,
                    app_key,
                    &proof,
                )
                .await
                .unwrap();
        }
        assert_eq!(wallet.cosigner.calls(CosignerOp::ActivateKeyset), 0);
    }

    #[tokio::test]
    async fn conflict_resolves_against_account_status() {
        let wallet = WalletFixture::new(Duration::from_secs(60));
        let rotator = rotator(&wallet);
        let proof = hw_proof(&wallet).await;
        let (app, hw) = spending_keys("next");
        let app_key = &wallet.keybox.app_auth_keys.app_global_auth;
        let keyset = rotator
            .create_spending_keyset(
                &wallet.account_id,
                app_key,
                &proof,
                &app,
                &hw,
                BitcoinNetwork::Signet,
            )
            .await
            .unwrap();

        wallet
            .cosigner
            .fail_next(CosignerOp::ActivateKeyset, CosignerError::conflict("KEYSET_BUSY", "busy"));
        let result = rotator
            .activate_spending_keyset(&wallet.account_id, &keyset, app_key, &proof)
            .await;
        assert_matches!(result, Err(RecoveryError::Conflict { .. }));
    }

    #[tokio::test]
    async fn stale_proof_is_an_authorization_error() {
        let wallet = WalletFixture::new(Duration::from_secs(60));
        let rotator = rotator(&wallet);
        let proof = hw_proof(&wallet).await;
        let (app, hw) = spending_keys("next");
        wallet.cosigner.set_proofs_stale(true);

        let result = rotator
            .create_spending_keyset(
                &wallet.account_id,
                &wallet.keybox.app_auth_keys.app_global_auth,
                &proof,
                &app,
                &hw,
                BitcoinNetwork::Signet,
            )
            .await;
        assert_matches!(result, Err(RecoveryError::Authorization { .. }));
        assert_eq!(wallet.cosigner.calls(CosignerOp::CreateKeyset), 1);
    }

    #[tokio::test]
    async fn network_failures_are_retried() {
        let wallet = WalletFixture::new(Duration::from_secs(60));
        let rotator = rotator(&wallet);
        let proof = hw_proof(&wallet).await;
        let (app, hw) = spending_keys("next");
        wallet
            .cosigner
            .fail_times(CosignerOp::CreateKeyset, 2, CosignerError::network("reset"));

        rotator
            .create_spending_keyset(
                &wallet.account_id,
                &wallet.keybox.app_auth_keys.app_global_auth,
                &proof,
                &app,
                &hw,
                BitcoinNetwork::Signet,
            )
            .await
            .unwrap();
        assert_eq!(wallet.cosigner.calls(CosignerOp::CreateKeyset), 3);
    }
}
