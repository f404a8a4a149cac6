//! Single-flight sequencing of account syncs.
//!
//! Every state-mutating recovery or rotation command runs through
//! [`SyncSequencer::run`]. Commands for the same account queue on a fair lock
//! and run one at a time. A command for a different account while one is
//! running or queued is rejected immediately: one process only ever syncs one
//! account, and seeing two means the app is confused about which account is
//! active.

use crate::error::{RecoveryError, Result};
use keyward_core::AccountId;
use parking_lot::Mutex;
use std::future::Future;

#[derive(Debug)]
struct Claim {
    account: AccountId,
    /// Holder plus queued waiters
    refs: usize,
}

/// Mutual exclusion for sync tasks, keyed by the account holding it.
#[derive(Debug, Default)]
pub struct SyncSequencer {
    lock: async_lock::Mutex<()>,
    owner: Mutex<Option<Claim>>,
}

/// Releases a claim on drop, including when a queued caller is cancelled.
struct ClaimTicket<'a> {
    owner: &'a Mutex<Option<Claim>>,
}

impl Drop for ClaimTicket<'_> {
    fn drop(&mut self) {
        let mut owner = self.owner.lock();
        if let Some(claim) = owner.as_mut() {
            claim.refs = claim.refs.saturating_sub(1);
            if claim.refs == 0 {
                *owner = None;
            }
        }
    }
}

impl SyncSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account currently holding or queued on the sequencer.
    pub fn current_account(&self) -> Option<AccountId> {
        self.owner.lock().as_ref().map(|claim| claim.account.clone())
    }

    /// Run `task` exclusively for `account`.
    ///
    /// Dropping the returned future while it waits removes the caller from the
    /// queue without running `task`.
    pub async fn run<T, F, Fut>(&self, account: &AccountId, task: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _ticket = self.claim(account)?;
        let _guard = self.lock.lock().await;
        tracing::trace!(account = %account, "sync lock acquired");
        task().await
    }

    fn claim(&self, account: &AccountId) -> Result<ClaimTicket<'_>> {
        let mut owner = self.owner.lock();
        match owner.as_mut() {
            Some(claim) if &claim.account != account => {
                tracing::error!(
                    held_by = %claim.account,
                    requested = %account,
                    "sync requested for a second account while another is active"
                );
                return Err(RecoveryError::invariant(format!(
                    "sync already active for account {}, refusing {account}",
                    claim.account
                )));
            }
            Some(claim) => claim.refs += 1,
            None => {
                *owner = Some(Claim {
                    account: account.clone(),
                    refs: 1,
                })
            }
        }
        Ok(ClaimTicket { owner: &self.owner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    fn account(id: &str) -> AccountId {
        AccountId::new(id).unwrap()
    }

    #[tokio::test]
    async fn same_account_runs_in_order() {
        let sequencer = Arc::new(SyncSequencer::new());
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let first = {
            let (sequencer, log) = (sequencer.clone(), log.clone());
            tokio::spawn(async move {
                sequencer
                    .run(&account("a"), || async {
                        log.lock().push("first:start");
                        release_rx.await.ok();
                        log.lock().push("first:end");
                        Ok(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        let second = {
            let (sequencer, log) = (sequencer.clone(), log.clone());
            tokio::spawn(async move {
                sequencer
                    .run(&account("a"), || async {
                        log.lock().push("second");
                        Ok(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(*log.lock(), vec!["first:start"]);

        release_tx.send(()).unwrap();
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(*log.lock(), vec!["first:start", "first:end", "second"]);
        assert_eq!(sequencer.current_account(), None);
    }

    #[tokio::test]
    async fn other_account_fails_without_blocking() {
        let sequencer = Arc::new(SyncSequencer::new());
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let holder = {
            let sequencer = sequencer.clone();
            tokio::spawn(async move {
                sequencer
                    .run(&account("a"), || async {
                        release_rx.await.ok();
                        Ok(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(sequencer.current_account(), Some(account("a")));

        let ran = std::sync::atomic::AtomicBool::new(false);
        let result = sequencer
            .run(&account("b"), || async {
                ran.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert_matches!(result, Err(RecoveryError::InvariantViolation { .. }));
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));

        release_tx.send(()).unwrap();
        holder.await.unwrap().unwrap();
        sequencer
            .run(&account("b"), || async { Ok(()) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_waiter_never_runs() {
        let sequencer = Arc::new(SyncSequencer::new());
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let holder = {
            let sequencer = sequencer.clone();
            tokio::spawn(async move {
                sequencer
                    .run(&account("a"), || async {
                        release_rx.await.ok();
                        Ok(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let waiter = {
            let (sequencer, ran) = (sequencer.clone(), ran.clone());
            tokio::spawn(async move {
                sequencer
                    .run(&account("a"), || async move {
                        ran.store(true, std::sync::atomic::Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());

        release_tx.send(()).unwrap();
        holder.await.unwrap().unwrap();
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(sequencer.current_account(), None);
    }

    #[tokio::test]
    async fn failed_task_releases_owner() {
        let sequencer = SyncSequencer::new();
        let result: Result<()> = sequencer
            .run(&account("a"), || async { Err(RecoveryError::invalid_state("boom")) })
            .await;
        assert!(result.is_err());
        assert_eq!(sequencer.current_account(), None);
    }
}
