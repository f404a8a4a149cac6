//! Layer 3: Time Effect Handler - Production Only
//!
//! Stateless implementation of `PhysicalTimeEffects` backed by the system clock.
//! Controllable clocks for tests live in `keyward-testkit`.

use async_trait::async_trait;
use keyward_core::effects::{PhysicalTimeEffects, TimeError};
use keyward_core::PhysicalTime;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Real time handler for production use
#[derive(Debug, Clone, Default)]
pub struct RealTimeHandler;

impl RealTimeHandler {
    /// Create a new real time handler
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PhysicalTimeEffects for RealTimeHandler {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| TimeError::ClockUnavailable {
                reason: format!("system clock before UNIX epoch: {e}"),
            })?;
        let ts_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        Ok(PhysicalTime::from_millis(ts_ms))
    }

    async fn sleep_ms(&self, ms: u64) -> Result<(), TimeError> {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clock_is_monotone_enough() {
        let handler = RealTimeHandler::new();
        let a = handler.physical_time().await.unwrap();
        handler.sleep_ms(2).await.unwrap();
        let b = handler.physical_time().await.unwrap();
        assert!(b >= a);
        assert!(a.ts_ms > 1_600_000_000_000);
    }
}
