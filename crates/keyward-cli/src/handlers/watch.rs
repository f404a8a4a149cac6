//! `keyward watch`

use anyhow::Result;
use keyward_core::{AccountId, SyncConfig};
use keyward_effects::TaskRegistry;
use keyward_recovery::{RecoveryEffects, RecoveryState, RecoveryStateMachine, RecoverySyncWorker};
use keyward_risk::{FundsLostRiskLevel, FundsLostRiskWorker, RiskEffects};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// One change observed while watching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum WatchUpdate {
    Recovery(RecoveryState),
    Risk(FundsLostRiskLevel),
}

impl fmt::Display for WatchUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recovery(state) => write!(f, "recovery  {state:?}"),
            Self::Risk(level) => write!(f, "risk      {level}"),
        }
    }
}

/// Run the recovery sync and risk workers for `account`, passing every
/// change to `report`, until `stop` resolves.
pub async fn watch<E, S, R>(
    registry: &TaskRegistry,
    machine: Arc<RecoveryStateMachine<E>>,
    risk: Arc<FundsLostRiskWorker<E>>,
    account: &AccountId,
    sync: &SyncConfig,
    stop: S,
    mut report: R,
) -> Result<()>
where
    E: RecoveryEffects + RiskEffects + 'static,
    S: Future<Output = ()>,
    R: FnMut(WatchUpdate),
{
    let mut events = machine.subscribe();
    let mut levels = risk.subscribe();

    let recovery = RecoverySyncWorker::new(
        machine.clone(),
        account.clone(),
        Duration::from_millis(sync.recovery_sync_interval_ms),
    );
    registry.spawn_worker("recovery-sync", |cancel| recovery.run(cancel));
    let evaluator = risk.clone();
    registry.spawn_worker("funds-lost-risk", |cancel| evaluator.run(cancel));

    tokio::pin!(stop);
    loop {
        tokio::select! {
            _ = &mut stop => break,
            event = events.recv() => match event {
                Ok(event) if &event.account == account => {
                    report(WatchUpdate::Recovery(event.state));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(account = %account, skipped, "recovery events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            changed = levels.changed() => {
                if changed.is_err() {
                    break;
                }
                let level = levels.borrow_and_update().clone();
                if let Some(level) = level {
                    report(WatchUpdate::Risk(level));
                }
            }
        }
    }

    registry.shutdown_gracefully(SHUTDOWN_GRACE).await;
    Ok(())
}
