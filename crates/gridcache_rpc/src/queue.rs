//! Write-behind queue for asynchronous broadcasts.

use gridcache_core::{CacheCommand, ReplicationQueueConfig};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Default)]
struct QueueState {
    commands: Vec<CacheCommand>,
    shutdown: bool,
}

/// Collects asynchronous broadcasts so they can be sent as one batch.
///
/// A flush is due every `interval`, or as soon as `max_elements` commands
/// are waiting.
#[derive(Debug)]
pub struct ReplicationQueue {
    state: Mutex<QueueState>,
    wake: Condvar,
    enabled: AtomicBool,
    interval: Duration,
    max_elements: usize,
}

impl ReplicationQueue {
    /// Creates a queue from its configuration.
    pub fn new(config: &ReplicationQueueConfig) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            wake: Condvar::new(),
            enabled: AtomicBool::new(config.enabled),
            interval: config.interval,
            max_elements: config.max_elements.max(1),
        }
    }

    /// Returns true if broadcasts should be queued.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Turns queuing on or off. Commands already queued stay queued.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Appends a command, waking the flusher once the queue is full.
    ///
    /// Returns the queue length after the append.
    pub fn add(&self, command: CacheCommand) -> usize {
        let mut state = self.state.lock();
        state.commands.push(command);
        let len = state.commands.len();
        trace!(len, "queued command for replication");
        if len >= self.max_elements {
            self.wake.notify_all();
        }
        len
    }

    /// Removes and returns every queued command, oldest first.
    pub fn drain(&self) -> Vec<CacheCommand> {
        std::mem::take(&mut self.state.lock().commands)
    }

    /// Returns the number of queued commands.
    pub fn len(&self) -> usize {
        self.state.lock().commands.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks until a flush is due.
    ///
    /// Returns false once the queue has been shut down.
    pub fn wait_for_flush(&self) -> bool {
        let deadline = Instant::now().checked_add(self.interval);
        let mut state = self.state.lock();
        while !state.shutdown && state.commands.len() < self.max_elements {
            match deadline {
                Some(deadline) => {
                    if self.wake.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => self.wake.wait(&mut state),
            }
        }
        !state.shutdown
    }

    /// Wakes and stops the flusher.
    pub fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.wake.notify_all();
    }

    /// Returns true after [`shutdown`](Self::shutdown).
    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcache_core::WriteCommand;
    use std::sync::Arc;
    use std::thread;

    fn write(key: &str) -> CacheCommand {
        CacheCommand::Write(WriteCommand::put(key, "v"))
    }

    #[test]
    fn add_and_drain_in_order() {
        let queue = ReplicationQueue::new(&ReplicationQueueConfig::enabled(
            Duration::from_secs(60),
            10,
        ));
        assert!(queue.is_enabled());
        assert_eq!(queue.add(write("a")), 1);
        assert_eq!(queue.add(write("b")), 2);

        assert_eq!(queue.drain(), vec![write("a"), write("b")]);
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_wakes_flusher() {
        let queue = Arc::new(ReplicationQueue::new(&ReplicationQueueConfig::enabled(
            Duration::from_secs(60),
            2,
        )));
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let start = Instant::now();
                let due = queue.wait_for_flush();
                (due, start.elapsed())
            })
        };

        queue.add(write("a"));
        queue.add(write("b"));
        let (due, elapsed) = waiter.join().unwrap();
        assert!(due);
        assert!(elapsed < Duration::from_secs(30));
    }

    #[test]
    fn interval_elapses() {
        let queue = ReplicationQueue::new(&ReplicationQueueConfig::enabled(
            Duration::from_millis(10),
            100,
        ));
        assert!(queue.wait_for_flush());
    }

    #[test]
    fn shutdown_stops_waiting() {
        let queue = ReplicationQueue::new(&ReplicationQueueConfig::enabled(
            Duration::from_secs(60),
            100,
        ));
        queue.shutdown();
        assert!(!queue.wait_for_flush());
        assert!(queue.is_shutdown());
    }

    #[test]
    fn unbounded_interval_waits_for_shutdown() {
        let queue = Arc::new(ReplicationQueue::new(&ReplicationQueueConfig::enabled(
            Duration::MAX,
            100,
        )));
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait_for_flush())
        };

        thread::sleep(Duration::from_millis(20));
        queue.shutdown();
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn toggle() {
        let queue = ReplicationQueue::new(&ReplicationQueueConfig::default());
        assert!(!queue.is_enabled());
        queue.set_enabled(true);
        assert!(queue.is_enabled());
    }
}
