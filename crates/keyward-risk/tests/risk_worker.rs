//! Risk worker against the fake co-signer.

use assert_matches::assert_matches;
use keyward_core::effects::CosignerError;
use keyward_core::{BitcoinNetwork, Keybox, KeysetId, KeywardError, SpendingKeyset};
use keyward_effects::TaskRegistry;
use keyward_recovery::KeyboxDao;
use keyward_risk::{
    AtRiskCause, CloudBackupHealth, ContactKind, ContactMethod, FundsLostRiskLevel,
    FundsLostRiskWorker, RiskError, StaticRiskSignals,
};
use keyward_testkit::{test_key, CosignerOp, TestEffects, WalletFixture};
use std::sync::Arc;
use std::time::Duration;

const WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

struct Harness {
    wallet: WalletFixture,
    keyboxes: KeyboxDao<TestEffects>,
    signals: Arc<StaticRiskSignals>,
    worker: Arc<FundsLostRiskWorker<TestEffects>>,
}

impl Harness {
    async fn new() -> Self {
        let wallet = WalletFixture::new(WINDOW);
        let effects = Arc::new(wallet.effects.clone());
        let keyboxes = KeyboxDao::new(effects.clone());
        keyboxes.activate(&wallet.keybox).await.unwrap();
        let signals = Arc::new(StaticRiskSignals::fully_protected());
        let worker = Arc::new(FundsLostRiskWorker::new(
            effects,
            signals.clone(),
            wallet.account_id.clone(),
            Duration::from_secs(60),
        ));
        Self {
            wallet,
            keyboxes,
            signals,
            worker,
        }
    }

    /// Local keybox pointing at a keyset the server no longer has active.
    fn stale_keybox(&self) -> Keybox {
        let keyset = SpendingKeyset::from_server(
            KeysetId::new("stale-keyset"),
            BitcoinNetwork::Signet,
            test_key("stale/app-spending"),
            test_key("stale/hw-spending"),
            test_key("stale/server-spending"),
        );
        self.wallet
            .keybox
            .with_spending_keyset(keyset, self.wallet.time.now())
    }
}

#[tokio::test]
async fn fully_protected_account() {
    let harness = Harness::new().await;
    assert_eq!(harness.worker.current(), None);
    assert_eq!(
        harness.worker.evaluate_now().await.unwrap(),
        FundsLostRiskLevel::Protected
    );
    assert_eq!(harness.worker.current(), Some(FundsLostRiskLevel::Protected));
}

#[tokio::test]
async fn scenario_d_mismatch_outranks_missing_backup() {
    let harness = Harness::new().await;
    harness.keyboxes.activate(&harness.stale_keybox()).await.unwrap();
    harness.signals.set_cloud_backup(CloudBackupHealth::Missing);

    let level = harness.worker.evaluate_now().await.unwrap();
    assert_matches!(
        level,
        FundsLostRiskLevel::AtRisk(AtRiskCause::ActiveSpendingKeysetMismatch { ref local, ref server })
            if local.as_str() == "stale-keyset"
                && server == harness.wallet.keybox.active_keyset_id()
    );

    // Once the keysets agree the next cause surfaces
    harness.keyboxes.activate(&harness.wallet.keybox).await.unwrap();
    assert_eq!(
        harness.worker.evaluate_now().await.unwrap(),
        FundsLostRiskLevel::AtRisk(AtRiskCause::MissingCloudBackup)
    );
}

#[tokio::test]
async fn causes_follow_priority_as_they_are_fixed() {
    let harness = Harness::new().await;
    harness.signals.set_hardware_linked(false);
    harness.signals.set_cloud_backup(CloudBackupHealth::Problem {
        reason: "backup predates key rotation".into(),
    });
    harness
        .signals
        .set_contact_methods(vec![ContactMethod::unverified(ContactKind::Phone)]);

    let mut seen = Vec::new();
    seen.push(harness.worker.evaluate_now().await.unwrap());
    harness.signals.set_hardware_linked(true);
    seen.push(harness.worker.evaluate_now().await.unwrap());
    harness.signals.set_cloud_backup(CloudBackupHealth::Healthy);
    seen.push(harness.worker.evaluate_now().await.unwrap());
    harness
        .signals
        .set_contact_methods(vec![ContactMethod::verified(ContactKind::Phone)]);
    seen.push(harness.worker.evaluate_now().await.unwrap());

    assert_eq!(
        seen,
        vec![
            FundsLostRiskLevel::AtRisk(AtRiskCause::MissingHardware),
            FundsLostRiskLevel::AtRisk(AtRiskCause::MissingCloudBackup),
            FundsLostRiskLevel::AtRisk(AtRiskCause::MissingContactMethod),
            FundsLostRiskLevel::Protected,
        ]
    );
}

#[tokio::test]
async fn unknown_server_keyset_is_not_a_mismatch() {
    let harness = Harness::new().await;
    harness.keyboxes.activate(&harness.stale_keybox()).await.unwrap();
    harness
        .wallet
        .cosigner
        .fail_next(CosignerOp::AccountStatus, CosignerError::network("offline"));

    assert_eq!(
        harness.worker.evaluate_now().await.unwrap(),
        FundsLostRiskLevel::Protected
    );
}

#[tokio::test]
async fn last_known_server_keyset_survives_a_failed_fetch() {
    let harness = Harness::new().await;
    harness.keyboxes.activate(&harness.stale_keybox()).await.unwrap();
    let first = harness.worker.evaluate_now().await.unwrap();
    assert_matches!(
        first,
        FundsLostRiskLevel::AtRisk(AtRiskCause::ActiveSpendingKeysetMismatch { .. })
    );

    harness
        .wallet
        .cosigner
        .fail_next(CosignerOp::AccountStatus, CosignerError::network("offline"));
    assert_eq!(harness.worker.evaluate_now().await.unwrap(), first);
}

#[tokio::test]
async fn unavailable_signals_keep_the_last_level() {
    let harness = Harness::new().await;
    harness.worker.evaluate_now().await.unwrap();

    harness
        .signals
        .set_outage(Some("backup service unreachable".into()));
    assert_matches!(
        harness.worker.evaluate_now().await,
        Err(RiskError::Signal(KeywardError::Unavailable { ref message }))
            if message == "backup service unreachable"
    );
    assert_eq!(harness.worker.current(), Some(FundsLostRiskLevel::Protected));

    harness.signals.set_outage(None);
    harness.signals.set_hardware_linked(false);
    assert_eq!(
        harness.worker.evaluate_now().await.unwrap(),
        FundsLostRiskLevel::AtRisk(AtRiskCause::MissingHardware)
    );
}

#[tokio::test]
async fn publishes_only_on_change() {
    let harness = Harness::new().await;
    let mut rx = harness.worker.subscribe();

    harness.worker.evaluate_now().await.unwrap();
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), Some(FundsLostRiskLevel::Protected));

    harness.worker.evaluate_now().await.unwrap();
    assert!(!rx.has_changed().unwrap());

    harness.signals.set_hardware_linked(false);
    harness.worker.evaluate_now().await.unwrap();
    assert!(rx.has_changed().unwrap());
    assert_eq!(
        *rx.borrow_and_update(),
        Some(FundsLostRiskLevel::AtRisk(AtRiskCause::MissingHardware))
    );
}

#[tokio::test]
async fn running_worker_publishes_and_stops() {
    let harness = Harness::new().await;
    harness.signals.set_cloud_backup(CloudBackupHealth::Missing);
    let mut rx = harness.worker.subscribe();

    let registry = TaskRegistry::new();
    let worker = harness.worker.clone();
    registry.spawn_worker("funds-lost-risk", |cancel| worker.run(cancel));

    rx.changed().await.unwrap();
    assert_eq!(
        *rx.borrow_and_update(),
        Some(FundsLostRiskLevel::AtRisk(AtRiskCause::MissingCloudBackup))
    );

    harness.signals.set_cloud_backup(CloudBackupHealth::Healthy);
    harness.worker.refresh();
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow(), Some(FundsLostRiskLevel::Protected));

    registry.shutdown();
    assert_eq!(registry.active_tasks(), 0);
}
