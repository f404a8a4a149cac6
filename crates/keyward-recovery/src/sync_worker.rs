//! Periodic recovery reconciliation.

use crate::effects::RecoveryEffects;
use crate::error::RecoveryError;
use crate::machine::{ReconcileOutcome, RecoveryStateMachine};
use keyward_core::effects::{CancellationToken, PhysicalTimeEffects};
use keyward_core::AccountId;
use std::sync::Arc;
use std::time::Duration;

/// Reconciles one account's recovery with the co-signer on an interval.
pub struct RecoverySyncWorker<E: RecoveryEffects> {
    machine: Arc<RecoveryStateMachine<E>>,
    account: AccountId,
    interval: Duration,
}

impl<E: RecoveryEffects> RecoverySyncWorker<E> {
    pub fn new(
        machine: Arc<RecoveryStateMachine<E>>,
        account: AccountId,
        interval: Duration,
    ) -> Self {
        Self {
            machine,
            account,
            interval,
        }
    }

    /// One reconciliation. Errors are logged and reported as `None`.
    pub async fn tick(&self) -> Option<ReconcileOutcome> {
        match self.machine.reconcile(&self.account).await {
            Ok(outcome) => {
                tracing::debug!(account = %self.account, outcome = ?outcome, "recovery synced");
                Some(outcome)
            }
            Err(err @ RecoveryError::InvariantViolation { .. }) => {
                tracing::error!(account = %self.account, error = %err, "recovery sync aborted");
                None
            }
            Err(err) => {
                tracing::warn!(account = %self.account, error = %err, "recovery sync failed");
                None
            }
        }
    }

    /// Tick until `cancel` fires.
    pub async fn run(self, cancel: Arc<dyn CancellationToken>) {
        let interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(account = %self.account, interval_ms, "recovery sync started");
        while !cancel.is_cancelled() {
            self.tick().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                slept = self.machine.effects().sleep_ms(interval_ms) => {
                    if slept.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!(account = %self.account, "recovery sync stopped");
    }
}
