//! Replication statistics.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Counters updated by every remote invocation.
///
/// Updates are lock-free and never fail; the counters observe the
/// coordinator without influencing it.
#[derive(Debug)]
pub struct RpcStats {
    enabled: AtomicBool,
    replication_count: AtomicU64,
    replication_failures: AtomicU64,
    total_replication_nanos: AtomicU64,
}

/// A point-in-time copy of [`RpcStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcStatsSnapshot {
    /// Whether statistics were being collected.
    pub enabled: bool,
    /// Successful invocations.
    pub replication_count: u64,
    /// Failed invocations.
    pub replication_failures: u64,
    /// Mean latency of successful invocations, in microseconds.
    pub average_replication_micros: u64,
    /// Successes over all attempts, `None` before the first attempt.
    pub success_ratio: Option<f64>,
}

impl RpcStats {
    /// Creates zeroed counters.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            replication_count: AtomicU64::new(0),
            replication_failures: AtomicU64::new(0),
            total_replication_nanos: AtomicU64::new(0),
        }
    }

    /// Returns true if invocations are being counted.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Turns collection on or off.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Records a successful invocation that took `elapsed`.
    pub fn record_success(&self, elapsed: Duration) {
        if !self.is_enabled() {
            return;
        }
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.replication_count.fetch_add(1, Ordering::Relaxed);
        self.total_replication_nanos
            .fetch_add(nanos, Ordering::Relaxed);
    }

    /// Records a failed invocation.
    pub fn record_failure(&self) {
        if self.is_enabled() {
            self.replication_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        self.replication_count.store(0, Ordering::Relaxed);
        self.replication_failures.store(0, Ordering::Relaxed);
        self.total_replication_nanos.store(0, Ordering::Relaxed);
    }

    /// Returns the number of successful invocations.
    pub fn replication_count(&self) -> u64 {
        self.replication_count.load(Ordering::Relaxed)
    }

    /// Returns the number of failed invocations.
    pub fn replication_failures(&self) -> u64 {
        self.replication_failures.load(Ordering::Relaxed)
    }

    /// Returns the mean latency of successful invocations.
    pub fn average_replication_time(&self) -> Duration {
        let count = self.replication_count();
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.total_replication_nanos.load(Ordering::Relaxed) / count)
    }

    /// Returns successes over all attempts, `None` before the first attempt.
    pub fn success_ratio(&self) -> Option<f64> {
        let successes = self.replication_count();
        let total = successes + self.replication_failures();
        if total == 0 {
            None
        } else {
            Some(successes as f64 / total as f64)
        }
    }

    /// Copies the counters.
    pub fn snapshot(&self) -> RpcStatsSnapshot {
        RpcStatsSnapshot {
            enabled: self.is_enabled(),
            replication_count: self.replication_count(),
            replication_failures: self.replication_failures(),
            average_replication_micros: self.average_replication_time().as_micros() as u64,
            success_ratio: self.success_ratio(),
        }
    }
}

impl Default for RpcStats {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_and_average() {
        let stats = RpcStats::new(true);
        assert_eq!(stats.success_ratio(), None);
        assert_eq!(stats.average_replication_time(), Duration::ZERO);

        stats.record_success(Duration::from_millis(10));
        stats.record_success(Duration::from_millis(30));
        stats.record_failure();
        stats.record_failure();

        assert_eq!(stats.replication_count(), 2);
        assert_eq!(stats.replication_failures(), 2);
        assert_eq!(stats.average_replication_time(), Duration::from_millis(20));
        assert_eq!(stats.success_ratio(), Some(0.5));
    }

    #[test]
    fn disabled_stats_ignore_updates() {
        let stats = RpcStats::new(false);
        stats.record_success(Duration::from_millis(1));
        stats.record_failure();
        assert_eq!(stats.replication_count(), 0);
        assert_eq!(stats.replication_failures(), 0);

        stats.set_enabled(true);
        stats.record_failure();
        assert_eq!(stats.success_ratio(), Some(0.0));
    }

    #[test]
    fn reset_and_snapshot() {
        let stats = RpcStats::default();
        stats.record_success(Duration::from_micros(40));
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.replication_count, 1);
        assert_eq!(snapshot.average_replication_micros, 40);

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"replication_count\":1"));

        stats.reset();
        assert_eq!(stats.snapshot().replication_count, 0);
        assert_eq!(stats.snapshot().success_ratio, None);
    }
}
