//! Cooperative cancellation for background workers.

use async_trait::async_trait;

/// Cancellation signal observed by long-running workers.
#[async_trait]
pub trait CancellationToken: Send + Sync {
    /// Resolves once cancellation has been requested.
    async fn cancelled(&self);

    /// Whether cancellation has been requested.
    fn is_cancelled(&self) -> bool;
}
