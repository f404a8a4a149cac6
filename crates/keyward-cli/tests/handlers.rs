//! Command handlers against deterministic effects.

use keyward_cli::handlers::watch::{self, WatchUpdate};
use keyward_cli::handlers::{config, render, risk, status};
use keyward_core::{BuildVariant, KeywardConfig, PhysicalFactor, SyncConfig};
use keyward_effects::TaskRegistry;
use keyward_recovery::{
    AuthKeyRotationService, CancelingFactor, KeyboxDao, ReconcileOutcome, RecoveryState,
    RecoveryStateMachine, SyncSequencer,
};
use keyward_risk::{AtRiskCause, FundsLostRiskLevel, FundsLostRiskWorker, StaticRiskSignals};
use parking_lot::Mutex;
use keyward_testkit::{TestEffects, WalletFixture};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

const WINDOW: Duration = Duration::from_secs(2 * 24 * 60 * 60);

fn machine(wallet: &WalletFixture) -> RecoveryStateMachine<TestEffects> {
    let config = KeywardConfig::new(BuildVariant::Customer, "https://cosigner.test", WINDOW);
    RecoveryStateMachine::new(
        Arc::new(wallet.effects.clone()),
        &config,
        Arc::new(SyncSequencer::new()),
    )
}

#[tokio::test]
async fn status_reports_local_state() {
    let wallet = WalletFixture::new(WINDOW);
    let machine = machine(&wallet);
    machine.keyboxes().activate(&wallet.keybox).await.unwrap();
    let (destination, _) = wallet.lost_hardware_destination("new");
    machine
        .initiate(&wallet.account_id, PhysicalFactor::Hardware, destination, None)
        .await
        .unwrap();
    let rotations = status::rotation_reader(&machine, Default::default());

    let report = status::collect(&machine, &rotations, &wallet.account_id, false)
        .await
        .unwrap();
    assert_eq!(report.keybox.as_ref().unwrap().id, wallet.keybox.id);
    assert!(matches!(
        report.recovery,
        Some(RecoveryState::Delaying {
            lost_factor: PhysicalFactor::Hardware,
            ..
        })
    ));
    assert_eq!(report.reconciled, None);
    assert!(report.archived_attempts.is_empty());
    assert_eq!(report.pending_rotation, None);

    let text = render(&report, false).unwrap();
    assert!(text.contains("delaying, lost hardware"));
    let json: serde_json::Value = serde_json::from_str(&render(&report, true).unwrap()).unwrap();
    assert_eq!(json["recovery"]["state"], "delaying");
}

#[tokio::test]
async fn status_sync_shows_recoveries_started_elsewhere() {
    let wallet = WalletFixture::new(WINDOW);
    let owner = machine(&wallet);
    owner.keyboxes().activate(&wallet.keybox).await.unwrap();
    let (destination, _) = wallet.lost_hardware_destination("new");
    owner
        .initiate(&wallet.account_id, PhysicalFactor::Hardware, destination, None)
        .await
        .unwrap();

    // A second install with its own storage
    let (effects, _) = wallet.new_app_install("other");
    let config = KeywardConfig::new(BuildVariant::Customer, "https://cosigner.test", WINDOW);
    let other =
        RecoveryStateMachine::new(Arc::new(effects), &config, Arc::new(SyncSequencer::new()));
    let rotations = AuthKeyRotationService::new(
        other.effects().clone(),
        Default::default(),
        other.sequencer().clone(),
    );

    let report = status::collect(&other, &rotations, &wallet.account_id, true)
        .await
        .unwrap();
    assert_eq!(report.recovery, None);
    assert!(matches!(
        report.reconciled,
        Some(ReconcileOutcome::SomeoneElseIsRecovering {
            lost_factor: PhysicalFactor::Hardware,
            ..
        })
    ));
    assert!(render(&report, false).unwrap().contains("started elsewhere"));
}

#[tokio::test]
async fn risk_lists_every_cause() {
    let wallet = WalletFixture::new(WINDOW);
    let effects = Arc::new(wallet.effects.clone());
    KeyboxDao::new(effects.clone())
        .activate(&wallet.keybox)
        .await
        .unwrap();
    let signals = StaticRiskSignals::fully_protected();
    signals.set_hardware_linked(false);
    signals.set_contact_methods(Vec::new());

    let report = risk::evaluate(effects, Arc::new(signals), &wallet.account_id)
        .await
        .unwrap();
    assert_eq!(
        report.level,
        FundsLostRiskLevel::AtRisk(AtRiskCause::MissingHardware)
    );
    assert_eq!(
        report.causes,
        vec![AtRiskCause::MissingHardware, AtRiskCause::MissingContactMethod]
    );
    assert!(report.server_keyset_known);
    let text = render(&report, false).unwrap();
    assert!(text.contains("at risk: missing hardware"));
    assert!(text.contains("also: missing critical contact method"));
}

#[test]
fn config_check_reports_effective_window() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
build_variant = "customer"

[cosigner]
base_url = "https://cosigner.test"

[delay_notify]
default_window_secs = 604800
window_override_secs = 60
"#
    )
    .unwrap();

    let report = config::check(file.path()).unwrap();
    assert_eq!(report.effective_delay_window_secs, 604_800);
    assert!(report.override_ignored);
    assert!(report.effective.contains("default_window_secs = 604800"));
    assert!(render(&report, false)
        .unwrap()
        .contains("override ignored in this build"));
}

#[test]
fn config_check_rejects_invalid_files() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
build_variant = "team"

[cosigner]
base_url = ""

[delay_notify]
default_window_secs = 60
"#
    )
    .unwrap();
    assert!(config::check(file.path()).is_err());
}

#[tokio::test]
async fn watch_reports_changes_until_stopped() {
    let wallet = WalletFixture::new(WINDOW);
    let machine = Arc::new(machine(&wallet));
    machine.keyboxes().activate(&wallet.keybox).await.unwrap();
    let account = wallet.account_id.clone();
    let (destination, _) = wallet.lost_hardware_destination("new");
    machine
        .initiate(&account, PhysicalFactor::Hardware, destination, None)
        .await
        .unwrap();
    let risk = Arc::new(FundsLostRiskWorker::new(
        machine.effects().clone(),
        Arc::new(StaticRiskSignals::fully_protected()),
        account.clone(),
        Duration::from_secs(60),
    ));

    let registry = TaskRegistry::new();
    let seen = Mutex::new(Vec::new());
    let stop = async {
        let has = |wanted: fn(&WatchUpdate) -> bool| seen.lock().iter().any(wanted);
        while !has(|update| matches!(update, WatchUpdate::Risk(_))) {
            tokio::task::yield_now().await;
        }
        machine
            .cancel(&account, CancelingFactor::App)
            .await
            .unwrap();
        while !has(|update| matches!(update, WatchUpdate::Recovery(_))) {
            tokio::task::yield_now().await;
        }
    };
    watch::watch(
        &registry,
        machine.clone(),
        risk,
        &account,
        &SyncConfig::default(),
        stop,
        |update| seen.lock().push(update),
    )
    .await
    .unwrap();

    let seen = seen.into_inner();
    assert!(seen.contains(&WatchUpdate::Risk(FundsLostRiskLevel::Protected)));
    assert!(seen.contains(&WatchUpdate::Recovery(RecoveryState::Canceled)));
    assert!(registry.is_shutdown());
    assert_eq!(registry.active_tasks(), 0);
}
