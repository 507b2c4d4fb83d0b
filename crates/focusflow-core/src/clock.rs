//! Time sources for the timer coordinator.
//!
//! The coordinator needs two readings: a monotonic one to measure tick
//! deltas, and wall-clock epoch milliseconds to stamp session records.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;

pub trait Clock: Send + Sync + 'static {
    /// Monotonic milliseconds since an arbitrary fixed origin.
    fn elapsed_ms(&self) -> u64;

    /// Wall-clock milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> i64;
}

/// Host clock.
///
/// The monotonic reading uses `tokio::time::Instant`, so it follows tokio's
/// paused test clock as well as real time.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed_ms(&self) -> u64 {
        Instant::now()
            .saturating_duration_since(self.origin)
            .as_millis() as u64
    }

    fn epoch_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Hand-driven clock. Both readings move only through [`ManualClock::advance`].
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    elapsed: Arc<AtomicU64>,
    epoch: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(epoch_ms: i64) -> Self {
        Self {
            elapsed: Arc::new(AtomicU64::new(0)),
            epoch: Arc::new(AtomicI64::new(epoch_ms)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.elapsed.fetch_add(ms, Ordering::SeqCst);
        self.epoch.fetch_add(ms as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn elapsed_ms(&self) -> u64 {
        self.elapsed.load(Ordering::SeqCst)
    }

    fn epoch_ms(&self) -> i64 {
        self.epoch.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_both_readings() {
        let clock = ManualClock::new(1_000_000);
        clock.advance(250);
        assert_eq!(clock.elapsed_ms(), 250);
        assert_eq!(clock.epoch_ms(), 1_000_250);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(0);
        let other = clock.clone();
        other.advance(10);
        assert_eq!(clock.elapsed_ms(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn system_clock_follows_paused_tokio_time() {
        let clock = SystemClock::new();
        tokio::time::advance(std::time::Duration::from_millis(1500)).await;
        assert_eq!(clock.elapsed_ms(), 1500);
    }
}
