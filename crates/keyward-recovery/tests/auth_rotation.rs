//! App auth key rotation and its crash recovery.

use assert_matches::assert_matches;
use keyward_core::effects::{
    AuthKeyEffects, CosignerError, HardwareSession, HardwareSigner, RotateAuthKeysRequest,
};
use keyward_core::{
    AppFactorProofOfPossession, BuildVariant, KeywardConfig, PhysicalFactor, ProofOfPossession,
    RetryConfig,
};
use keyward_recovery::{
    AuthKeyRotationService, ChallengeBuilder, KeyboxDao, RecoveryError, RecoveryStateMachine,
    RotationSettlement, RotationState, SyncSequencer,
};
use keyward_testkit::{fake_sign, CosignerOp, TestEffects, WalletFixture};
use std::sync::Arc;
use std::time::Duration;

const WINDOW: Duration = Duration::from_secs(3 * 24 * 60 * 60);

async fn service(wallet: &WalletFixture) -> AuthKeyRotationService<TestEffects> {
    let effects = Arc::new(wallet.effects.clone());
    KeyboxDao::new(effects.clone())
        .activate(&wallet.keybox)
        .await
        .unwrap();
    AuthKeyRotationService::new(effects, RetryConfig::default(), Arc::new(SyncSequencer::new()))
}

#[tokio::test]
async fn rotates_server_and_local_keys() {
    let wallet = WalletFixture::new(WINDOW);
    let service = service(&wallet).await;
    let account = &wallet.account_id;
    let new_keys = wallet.rotated_app_keys("rotated");

    let keybox = service
        .rotate(account, new_keys.clone(), &wallet.hardware)
        .await
        .unwrap();
    assert_eq!(keybox.app_auth_keys, new_keys);
    assert_eq!(keybox.spending_keyset, wallet.keybox.spending_keyset);
    assert_eq!(wallet.cosigner.auth_keys(account).unwrap().0, new_keys);
    assert_eq!(service.pending(account).await.unwrap(), None);

    // Rotating to the keys already in place does nothing
    let again = service
        .rotate(account, new_keys, &wallet.hardware)
        .await
        .unwrap();
    assert_eq!(again.id, keybox.id);
    assert_eq!(wallet.cosigner.calls(CosignerOp::RotateAuthKeys), 1);
}

#[tokio::test]
async fn stale_proof_leaves_rotation_proposed() {
    let wallet = WalletFixture::new(WINDOW);
    let service = service(&wallet).await;
    let account = &wallet.account_id;
    let new_keys = wallet.rotated_app_keys("rotated");
    wallet.cosigner.set_proofs_stale(true);

    assert_matches!(
        service.rotate(account, new_keys.clone(), &wallet.hardware).await,
        Err(RecoveryError::Authorization { .. })
    );
    let pending = service.pending(account).await.unwrap().unwrap();
    assert_eq!(pending.state, RotationState::Proposed);
    assert_eq!(pending.new_keys, new_keys);
    assert_eq!(
        service.resume(account).await.unwrap(),
        RotationSettlement::StillProposed
    );

    // A different rotation must wait for this one
    let other = wallet.rotated_app_keys("other");
    assert_matches!(
        service.rotate(account, other, &wallet.hardware).await,
        Err(RecoveryError::InvalidState { .. })
    );

    assert_eq!(
        service.cancel(account).await.unwrap(),
        RotationSettlement::Discarded
    );
    assert_eq!(service.pending(account).await.unwrap(), None);
    assert_eq!(
        wallet.cosigner.auth_keys(account).unwrap().0,
        wallet.keybox.app_auth_keys
    );
}

#[tokio::test]
async fn unknown_outcome_is_discarded_when_the_server_never_applied_it() {
    let wallet = WalletFixture::new(WINDOW);
    let service = service(&wallet).await;
    let account = &wallet.account_id;
    let new_keys = wallet.rotated_app_keys("rotated");
    wallet
        .cosigner
        .fail_times(CosignerOp::RotateAuthKeys, 3, CosignerError::network("timeout"));

    assert_matches!(
        service.rotate(account, new_keys, &wallet.hardware).await,
        Err(RecoveryError::Network { .. })
    );
    assert_eq!(
        service.pending(account).await.unwrap().unwrap().state,
        RotationState::Submitted
    );

    assert_eq!(
        service.cancel(account).await.unwrap(),
        RotationSettlement::Discarded
    );
    assert_eq!(service.pending(account).await.unwrap(), None);
}

#[tokio::test]
async fn unknown_outcome_is_finished_when_the_server_applied_it() {
    let wallet = WalletFixture::new(WINDOW);
    let service = service(&wallet).await;
    let account = &wallet.account_id;
    let new_keys = wallet.rotated_app_keys("rotated");
    wallet
        .cosigner
        .fail_times(CosignerOp::RotateAuthKeys, 3, CosignerError::network("timeout"));
    service
        .rotate(account, new_keys.clone(), &wallet.hardware)
        .await
        .unwrap_err();

    // The request reached the server even though the response was lost
    let challenge =
        ChallengeBuilder::auth_key_rotation(account, &new_keys, wallet.hardware.auth_key());
    let hw_proof = wallet
        .hardware
        .prove_possession(account, HardwareSession::default())
        .await
        .unwrap();
    let app_proof = AppFactorProofOfPossession(fake_sign(
        wallet.keybox.app_auth_keys.app_global_auth.as_hex(),
        account.as_str().as_bytes(),
    ));
    wallet
        .cosigner
        .rotate_auth_keys(
            account,
            RotateAuthKeysRequest {
                new_keys: new_keys.clone(),
                challenge: challenge.to_hex(),
                new_app_signature: fake_sign(
                    new_keys.app_global_auth.as_hex(),
                    challenge.as_bytes(),
                ),
                hw_proof: ProofOfPossession::both(app_proof, hw_proof),
            },
        )
        .await
        .unwrap();

    let settled = service.resume(account).await.unwrap();
    assert_matches!(
        settled,
        RotationSettlement::Rotated(ref keybox) if keybox.app_auth_keys == new_keys
    );
    assert_eq!(service.pending(account).await.unwrap(), None);
}

#[tokio::test]
async fn rotation_waits_for_recovery_to_finish() {
    let wallet = WalletFixture::new(WINDOW);
    let service = service(&wallet).await;
    let account = &wallet.account_id;
    let config = KeywardConfig::new(BuildVariant::Customer, "https://cosigner.test", WINDOW);
    let machine = RecoveryStateMachine::new(
        Arc::new(wallet.effects.clone()),
        &config,
        Arc::new(SyncSequencer::new()),
    );
    let (destination, _) = wallet.lost_hardware_destination("new");
    machine
        .initiate(account, PhysicalFactor::Hardware, destination, None)
        .await
        .unwrap();

    let new_keys = wallet.rotated_app_keys("rotated");
    assert_matches!(
        service.rotate(account, new_keys, &wallet.hardware).await,
        Err(RecoveryError::InvalidState { .. })
    );
    assert_eq!(service.pending(account).await.unwrap(), None);
}

#[tokio::test]
async fn rotation_refuses_a_second_account_while_another_syncs() {
    let wallet = WalletFixture::new(WINDOW);
    let effects = Arc::new(wallet.effects.clone());
    KeyboxDao::new(effects.clone())
        .activate(&wallet.keybox)
        .await
        .unwrap();
    let sequencer = Arc::new(SyncSequencer::new());
    let service = AuthKeyRotationService::new(effects, RetryConfig::default(), sequencer.clone());

    let other_account = keyward_core::AccountId::new("urn:wallet-account:other").unwrap();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let holder = {
        let sequencer = sequencer.clone();
        tokio::spawn(async move {
            sequencer
                .run(&other_account, || async {
                    release_rx.await.ok();
                    Ok(())
                })
                .await
        })
    };
    tokio::task::yield_now().await;

    let new_keys = wallet.rotated_app_keys("rotated");
    assert_matches!(
        service.rotate(&wallet.account_id, new_keys, &wallet.hardware).await,
        Err(RecoveryError::InvariantViolation { .. })
    );
    release_tx.send(()).unwrap();
    holder.await.unwrap().unwrap();
}
