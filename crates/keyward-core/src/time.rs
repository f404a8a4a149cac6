//! Wall-clock time values.
//!
//! Deadlines are compared against wall-clock time on every observation, so the
//! representation is a plain millisecond timestamp that survives restarts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Physical (wall-clock) time in milliseconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PhysicalTime {
    /// Milliseconds since the UNIX epoch
    pub ts_ms: u64,
}

impl PhysicalTime {
    /// Construct from milliseconds since the epoch.
    pub const fn from_millis(ts_ms: u64) -> Self {
        Self { ts_ms }
    }

    /// Construct from seconds since the epoch.
    pub const fn from_secs(secs: u64) -> Self {
        Self {
            ts_ms: secs.saturating_mul(1000),
        }
    }

    /// Time shifted forward by `duration`, saturating.
    pub fn saturating_add(self, duration: Duration) -> Self {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self {
            ts_ms: self.ts_ms.saturating_add(ms),
        }
    }

    /// Time remaining until `deadline`, zero if it has passed.
    pub fn until(self, deadline: PhysicalTime) -> Duration {
        Duration::from_millis(deadline.ts_ms.saturating_sub(self.ts_ms))
    }

    /// Whether `self` is at or past `deadline`.
    pub fn has_reached(self, deadline: PhysicalTime) -> bool {
        self.ts_ms >= deadline.ts_ms
    }
}

impl fmt::Display for PhysicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.ts_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn until_saturates() {
        let start = PhysicalTime::from_secs(10);
        let end = start.saturating_add(Duration::from_secs(5));
        assert_eq!(start.until(end), Duration::from_secs(5));
        assert_eq!(end.until(start), Duration::ZERO);
        assert!(end.has_reached(end));
        assert!(!start.has_reached(end));
    }
}
