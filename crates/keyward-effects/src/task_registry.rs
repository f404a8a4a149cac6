//! Registry of background workers.
//!
//! The recovery sync worker and the funds-lost risk worker each run as one
//! named task. Every worker receives a cancellation token tied to the
//! registry's shutdown signal and is expected to return once it fires;
//! workers still running after the grace period are aborted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use keyward_core::effects::CancellationToken;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug)]
struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// Owns the background workers of one wallet core and their shutdown signal.
#[derive(Debug)]
pub struct TaskRegistry {
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<Worker>>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Start a worker. `start` receives the token the worker must watch.
    pub fn spawn_worker<F, Fut>(&self, name: &'static str, start: F)
    where
        F: FnOnce(Arc<dyn CancellationToken>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let worker = start(self.cancellation_token());
        let handle = tokio::spawn(async move {
            worker.await;
            tracing::debug!(worker = name, "worker exited");
        });
        tracing::debug!(worker = name, "worker spawned");
        self.workers.lock().push(Worker { name, handle });
    }

    /// Token that fires when shutdown is signalled.
    pub fn cancellation_token(&self) -> Arc<dyn CancellationToken> {
        Arc::new(ShutdownToken {
            shutdown_rx: self.shutdown_tx.subscribe(),
        })
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Names of the workers that have not finished yet.
    pub fn running(&self) -> Vec<&'static str> {
        let mut workers = self.workers.lock();
        workers.retain(|worker| !worker.handle.is_finished());
        workers.iter().map(|worker| worker.name).collect()
    }

    /// Number of workers that have not finished yet.
    pub fn active_tasks(&self) -> usize {
        self.running().len()
    }

    /// Signal shutdown and wait up to `grace` for every worker to return,
    /// then abort the ones that did not.
    pub async fn shutdown_gracefully(&self, grace: Duration) {
        let _ = self.shutdown_tx.send(true);
        let workers: Vec<Worker> = self.workers.lock().drain(..).collect();
        let deadline = tokio::time::Instant::now() + grace;
        for mut worker in workers {
            if tokio::time::timeout_at(deadline, &mut worker.handle)
                .await
                .is_err()
            {
                tracing::warn!(worker = worker.name, "worker ignored shutdown; aborting");
                worker.handle.abort();
            }
        }
    }

    /// Signal shutdown and abort every worker immediately.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        for worker in self.workers.lock().drain(..) {
            worker.handle.abort();
        }
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Debug)]
struct ShutdownToken {
    shutdown_rx: watch::Receiver<bool>,
}

#[async_trait::async_trait]
impl CancellationToken for ShutdownToken {
    async fn cancelled(&self) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            if *shutdown_rx.borrow() {
                return;
            }
            if shutdown_rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.shutdown_rx.borrow()
    }
}
