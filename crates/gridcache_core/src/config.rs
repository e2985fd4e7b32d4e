//! Cache configuration.

use std::time::Duration;

/// Configuration of a clustered cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether a joining member fetches the in-memory state.
    pub fetch_in_memory_state: bool,
    /// Whether a joining member fetches the persistent state.
    pub fetch_persistent_state: bool,
    /// Timeout for synchronous replication calls.
    pub sync_replication_timeout: Duration,
    /// State retrieval tuning.
    pub state_retrieval: StateRetrievalConfig,
    /// Replication queue used by asynchronous broadcasts.
    pub replication_queue: ReplicationQueueConfig,
    /// Whether RPC statistics are collected.
    pub statistics_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fetch_in_memory_state: true,
            fetch_persistent_state: false,
            sync_replication_timeout: Duration::from_secs(15),
            state_retrieval: StateRetrievalConfig::default(),
            replication_queue: ReplicationQueueConfig::default(),
            statistics_enabled: true,
        }
    }
}

impl CacheConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether in-memory state is fetched on startup.
    #[must_use]
    pub fn fetch_in_memory_state(mut self, value: bool) -> Self {
        self.fetch_in_memory_state = value;
        self
    }

    /// Sets whether persistent state is fetched on startup.
    #[must_use]
    pub fn fetch_persistent_state(mut self, value: bool) -> Self {
        self.fetch_persistent_state = value;
        self
    }

    /// Sets the synchronous replication timeout.
    #[must_use]
    pub fn sync_replication_timeout(mut self, timeout: Duration) -> Self {
        self.sync_replication_timeout = timeout;
        self
    }

    /// Sets the state retrieval configuration.
    #[must_use]
    pub fn state_retrieval(mut self, config: StateRetrievalConfig) -> Self {
        self.state_retrieval = config;
        self
    }

    /// Sets the replication queue configuration.
    #[must_use]
    pub fn replication_queue(mut self, config: ReplicationQueueConfig) -> Self {
        self.replication_queue = config;
        self
    }

    /// Sets whether RPC statistics are collected.
    #[must_use]
    pub fn statistics_enabled(mut self, value: bool) -> Self {
        self.statistics_enabled = value;
        self
    }

    /// Returns true if a starting member must retrieve state from a peer.
    pub fn fetch_state_on_startup(&self) -> bool {
        self.fetch_in_memory_state || self.fetch_persistent_state
    }
}

/// Tuning for state retrieval on startup.
#[derive(Debug, Clone)]
pub struct StateRetrievalConfig {
    /// Bound on one retrieval attempt and on the provider's processing lock.
    pub timeout: Duration,
    /// Backoff slept after the first failed pass over all providers.
    pub initial_retry_wait: Duration,
    /// Factor applied to the backoff after every sleep.
    pub retry_wait_increase_factor: u32,
    /// Number of passes over the provider candidates.
    pub num_retries: u32,
    /// How long a provider waits for the recipient's flush request.
    pub flush_timeout: Duration,
    /// Consecutive log drain passes without size progress tolerated before
    /// the provider stops draining and moves to the flush hand-shake.
    pub max_non_progressing_log_writes: u32,
    /// Bound on waits for the distributed sync inside the transport.
    pub distributed_sync_timeout: Duration,
}

impl Default for StateRetrievalConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            initial_retry_wait: Duration::from_millis(500),
            retry_wait_increase_factor: 2,
            num_retries: 5,
            flush_timeout: Duration::from_secs(3),
            max_non_progressing_log_writes: 100,
            distributed_sync_timeout: Duration::from_secs(60),
        }
    }
}

impl StateRetrievalConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retrieval timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the initial backoff.
    #[must_use]
    pub fn initial_retry_wait(mut self, wait: Duration) -> Self {
        self.initial_retry_wait = wait;
        self
    }

    /// Sets the backoff growth factor.
    #[must_use]
    pub fn retry_wait_increase_factor(mut self, factor: u32) -> Self {
        self.retry_wait_increase_factor = factor;
        self
    }

    /// Sets the number of passes.
    #[must_use]
    pub fn num_retries(mut self, retries: u32) -> Self {
        self.num_retries = retries;
        self
    }

    /// Sets the flush timeout.
    #[must_use]
    pub fn flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Sets the tolerated number of non-progressing log drain passes.
    #[must_use]
    pub fn max_non_progressing_log_writes(mut self, max: u32) -> Self {
        self.max_non_progressing_log_writes = max;
        self
    }

    /// Sets the distributed sync timeout.
    #[must_use]
    pub fn distributed_sync_timeout(mut self, timeout: Duration) -> Self {
        self.distributed_sync_timeout = timeout;
        self
    }
}

/// Configuration of the asynchronous replication queue.
#[derive(Debug, Clone)]
pub struct ReplicationQueueConfig {
    /// Whether asynchronous broadcasts are queued instead of sent.
    pub enabled: bool,
    /// Interval between background flushes.
    pub interval: Duration,
    /// Queue length that triggers an early flush.
    pub max_elements: usize,
}

impl Default for ReplicationQueueConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(5),
            max_elements: 1000,
        }
    }
}

impl ReplicationQueueConfig {
    /// Creates an enabled queue configuration.
    #[must_use]
    pub fn enabled(interval: Duration, max_elements: usize) -> Self {
        Self {
            enabled: true,
            interval,
            max_elements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CacheConfig::default();
        assert!(config.fetch_in_memory_state);
        assert!(!config.fetch_persistent_state);
        assert!(config.fetch_state_on_startup());
        assert!(!config.replication_queue.enabled);
        assert_eq!(config.state_retrieval.num_retries, 5);
        assert_eq!(config.state_retrieval.retry_wait_increase_factor, 2);
        assert_eq!(config.state_retrieval.max_non_progressing_log_writes, 100);
    }

    #[test]
    fn builder() {
        let config = CacheConfig::new()
            .fetch_in_memory_state(false)
            .fetch_persistent_state(false)
            .sync_replication_timeout(Duration::from_secs(1))
            .state_retrieval(
                StateRetrievalConfig::new()
                    .num_retries(2)
                    .initial_retry_wait(Duration::from_millis(10)),
            );

        assert!(!config.fetch_state_on_startup());
        assert_eq!(config.sync_replication_timeout, Duration::from_secs(1));
        assert_eq!(config.state_retrieval.num_retries, 2);
        assert_eq!(
            config.state_retrieval.initial_retry_wait,
            Duration::from_millis(10)
        );
    }
}
