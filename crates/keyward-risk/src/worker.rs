//! Background risk evaluation.
//!
//! The worker re-evaluates on every interval and whenever [`refresh`] is
//! called, and publishes on a `watch` channel only when the level changes.
//! A failed account status fetch keeps the last server keyset seen, so a
//! flaky network neither hides nor invents a mismatch.
//!
//! [`refresh`]: FundsLostRiskWorker::refresh

use crate::engine::FundsLostRiskEngine;
use crate::error::Result;
use crate::level::FundsLostRiskLevel;
use crate::signals::{RiskSignalSource, RiskSignals};
use keyward_core::effects::{
    CancellationToken, KeysetEffects, PhysicalTimeEffects, StorageEffects,
};
use keyward_core::{AccountId, KeysetId};
use keyward_recovery::KeyboxDao;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// Effects the risk worker reads from.
pub trait RiskEffects: PhysicalTimeEffects + StorageEffects + KeysetEffects + Send + Sync {}

impl<T> RiskEffects for T where
    T: PhysicalTimeEffects + StorageEffects + KeysetEffects + Send + Sync
{
}

pub struct FundsLostRiskWorker<E: RiskEffects> {
    effects: Arc<E>,
    keyboxes: KeyboxDao<E>,
    source: Arc<dyn RiskSignalSource>,
    account: AccountId,
    interval: Duration,
    level_tx: watch::Sender<Option<FundsLostRiskLevel>>,
    refresh: Notify,
    server_keyset: Mutex<Option<KeysetId>>,
}

impl<E: RiskEffects> FundsLostRiskWorker<E> {
    pub fn new(
        effects: Arc<E>,
        source: Arc<dyn RiskSignalSource>,
        account: AccountId,
        interval: Duration,
    ) -> Self {
        let (level_tx, _level_rx) = watch::channel(None);
        Self {
            keyboxes: KeyboxDao::new(effects.clone()),
            effects,
            source,
            account,
            interval,
            level_tx,
            refresh: Notify::new(),
            server_keyset: Mutex::new(None),
        }
    }

    /// Receiver of the latest level. `None` until the first evaluation.
    pub fn subscribe(&self) -> watch::Receiver<Option<FundsLostRiskLevel>> {
        self.level_tx.subscribe()
    }

    pub fn current(&self) -> Option<FundsLostRiskLevel> {
        self.level_tx.borrow().clone()
    }

    /// Ask the running worker to evaluate now instead of at the next tick.
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    /// Collect signals for the account.
    pub async fn gather(&self) -> Result<RiskSignals> {
        let local_keyset = self
            .keyboxes
            .active(&self.account)
            .await?
            .map(|keybox| keybox.active_keyset_id().clone());

        let server_keyset = match self.effects.account_status(&self.account).await {
            Ok(status) => {
                *self.server_keyset.lock() = Some(status.active_keyset_id.clone());
                Some(status.active_keyset_id)
            }
            Err(err) => {
                tracing::warn!(
                    account = %self.account,
                    error = %err,
                    "account status unavailable; using last known server keyset"
                );
                self.server_keyset.lock().clone()
            }
        };

        Ok(RiskSignals {
            local_keyset,
            server_keyset,
            hardware_linked: self.source.hardware_linked(&self.account).await?,
            cloud_backup: self.source.cloud_backup(&self.account).await?,
            contact_methods: self.source.contact_methods(&self.account).await?,
        })
    }

    /// Evaluate once and publish the result if it changed.
    pub async fn evaluate_now(&self) -> Result<FundsLostRiskLevel> {
        let signals = self.gather().await?;
        let level = FundsLostRiskEngine::evaluate(&signals);
        let changed = self.level_tx.send_if_modified(|current| {
            if current.as_ref() == Some(&level) {
                false
            } else {
                *current = Some(level.clone());
                true
            }
        });
        if changed {
            tracing::info!(account = %self.account, level = %level, "funds-lost risk changed");
        } else {
            tracing::debug!(account = %self.account, level = %level, "funds-lost risk unchanged");
        }
        Ok(level)
    }

    /// Evaluate on every interval or refresh until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: Arc<dyn CancellationToken>) {
        let interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(account = %self.account, interval_ms, "risk worker started");
        while !cancel.is_cancelled() {
            if let Err(err) = self.evaluate_now().await {
                tracing::warn!(account = %self.account, error = %err, "risk evaluation failed");
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.refresh.notified() => {}
                slept = self.effects.sleep_ms(interval_ms) => {
                    if slept.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!(account = %self.account, "risk worker stopped");
    }
}
