//! Controllable clock.

use async_trait::async_trait;
use keyward_core::effects::{PhysicalTimeEffects, TimeError};
use keyward_core::PhysicalTime;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default start: 2024-01-01T00:00:00Z.
pub const DEFAULT_START_MS: u64 = 1_704_067_200_000;

/// Virtual clock shared by clones.
///
/// `sleep_ms` advances the clock instead of waiting, then yields so other
/// tasks on the runtime make progress.
#[derive(Debug, Clone)]
pub struct MockTimeHandler {
    now_ms: Arc<AtomicU64>,
}

impl MockTimeHandler {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn now(&self) -> PhysicalTime {
        PhysicalTime::from_millis(self.now_ms.load(Ordering::SeqCst))
    }

    pub fn advance(&self, by: Duration) {
        let ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, at: PhysicalTime) {
        self.now_ms.store(at.ts_ms, Ordering::SeqCst);
    }
}

impl Default for MockTimeHandler {
    fn default() -> Self {
        Self::new(DEFAULT_START_MS)
    }
}

#[async_trait]
impl PhysicalTimeEffects for MockTimeHandler {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        Ok(self.now())
    }

    async fn sleep_ms(&self, ms: u64) -> Result<(), TimeError> {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_advances_virtual_time() {
        let time = MockTimeHandler::new(1_000);
        let shared = time.clone();
        time.sleep_ms(500).await.unwrap();
        shared.advance(Duration::from_secs(1));
        assert_eq!(time.physical_time().await.unwrap().ts_ms, 2_500);
    }
}
