//! Pairwise distributed sync used by the flush hand-shake.

use crate::error::SyncTimeout;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::trace;

/// The barrier a transport exposes to state transfer.
///
/// Two independent pieces of state live here:
///
/// - A processing lock. Regular invocations hold it shared; a state
///   provider holds it exclusively while it cuts the transaction log over.
/// - A sync flag, raised by a peer's flush request and lowered by its
///   matching release. Regular invocations wait for it to be lowered.
pub trait DistributedSync: Send + Sync {
    /// Acquires the processing lock, exclusively or shared.
    fn acquire_processing_lock(&self, exclusive: bool, timeout: Duration) -> Result<(), SyncTimeout>;

    /// Releases a processing lock taken with `acquire_processing_lock`.
    fn release_processing_lock(&self);

    /// Blocks until the sync flag is raised.
    fn block_until_acquired(&self, timeout: Duration) -> Result<(), SyncTimeout>;

    /// Blocks until the sync flag is lowered.
    fn block_until_released(&self, timeout: Duration) -> Result<(), SyncTimeout>;

    /// Raises the sync flag.
    fn acquire_sync(&self);

    /// Lowers the sync flag.
    fn release_sync(&self);

    /// Returns true while the sync flag is raised.
    fn is_sync_acquired(&self) -> bool;
}

#[derive(Debug, Default)]
struct SyncState {
    readers: usize,
    writer: bool,
    sync_acquired: bool,
}

/// A [`DistributedSync`] built on a mutex and a condition variable.
#[derive(Debug, Default)]
pub struct FlushSync {
    state: Mutex<SyncState>,
    changed: Condvar,
}

impl FlushSync {
    /// Creates a sync with the lock free and the flag lowered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits while `blocked` holds, returning false if the deadline passed
    /// first. A timeout too large to form a deadline waits without one.
    fn wait_while(
        &self,
        state: &mut MutexGuard<'_, SyncState>,
        timeout: Duration,
        blocked: impl Fn(&SyncState) -> bool,
    ) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        while blocked(&**state) {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(state, deadline).timed_out() {
                        return !blocked(&**state);
                    }
                }
                None => self.changed.wait(state),
            }
        }
        true
    }
}

impl DistributedSync for FlushSync {
    fn acquire_processing_lock(&self, exclusive: bool, timeout: Duration) -> Result<(), SyncTimeout> {
        let mut state = self.state.lock();
        if exclusive {
            if !self.wait_while(&mut state, timeout, |s| s.writer || s.readers > 0) {
                return Err(SyncTimeout::new("exclusive processing lock", timeout));
            }
            state.writer = true;
        } else {
            if !self.wait_while(&mut state, timeout, |s| s.writer) {
                return Err(SyncTimeout::new("shared processing lock", timeout));
            }
            state.readers += 1;
        }
        trace!(exclusive, "processing lock acquired");
        Ok(())
    }

    fn release_processing_lock(&self) {
        let mut state = self.state.lock();
        if state.writer {
            state.writer = false;
        } else {
            state.readers = state.readers.saturating_sub(1);
        }
        self.changed.notify_all();
    }

    fn block_until_acquired(&self, timeout: Duration) -> Result<(), SyncTimeout> {
        let mut state = self.state.lock();
        if self.wait_while(&mut state, timeout, |s| !s.sync_acquired) {
            Ok(())
        } else {
            Err(SyncTimeout::new("block until sync acquired", timeout))
        }
    }

    fn block_until_released(&self, timeout: Duration) -> Result<(), SyncTimeout> {
        let mut state = self.state.lock();
        if self.wait_while(&mut state, timeout, |s| s.sync_acquired) {
            Ok(())
        } else {
            Err(SyncTimeout::new("block until sync released", timeout))
        }
    }

    fn acquire_sync(&self) {
        self.state.lock().sync_acquired = true;
        self.changed.notify_all();
    }

    fn release_sync(&self) {
        self.state.lock().sync_acquired = false;
        self.changed.notify_all();
    }

    fn is_sync_acquired(&self) -> bool {
        self.state.lock().sync_acquired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const SHORT: Duration = Duration::from_millis(50);

    #[test]
    fn shared_locks_coexist() {
        let sync = FlushSync::new();
        sync.acquire_processing_lock(false, SHORT).unwrap();
        sync.acquire_processing_lock(false, SHORT).unwrap();
        assert!(sync.acquire_processing_lock(true, SHORT).is_err());

        sync.release_processing_lock();
        sync.release_processing_lock();
        sync.acquire_processing_lock(true, SHORT).unwrap();
    }

    #[test]
    fn exclusive_lock_blocks_shared() {
        let sync = FlushSync::new();
        sync.acquire_processing_lock(true, SHORT).unwrap();
        let err = sync.acquire_processing_lock(false, SHORT).unwrap_err();
        assert_eq!(err.operation, "shared processing lock");

        sync.release_processing_lock();
        sync.acquire_processing_lock(false, SHORT).unwrap();
    }

    #[test]
    fn block_until_acquired_times_out() {
        let sync = FlushSync::new();
        assert!(sync.block_until_acquired(SHORT).is_err());
        assert!(sync.block_until_released(SHORT).is_ok());
    }

    #[test]
    fn acquire_sync_wakes_waiter() {
        let sync = Arc::new(FlushSync::new());
        let waiter = {
            let sync = Arc::clone(&sync);
            thread::spawn(move || sync.block_until_acquired(Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        sync.acquire_sync();
        assert!(waiter.join().unwrap().is_ok());
        assert!(sync.is_sync_acquired());
        assert!(sync.block_until_released(SHORT).is_err());

        sync.release_sync();
        assert!(!sync.is_sync_acquired());
        assert!(sync.block_until_released(SHORT).is_ok());
    }

    #[test]
    fn unbounded_timeout_waits_without_deadline() {
        let sync = Arc::new(FlushSync::new());
        let waiter = {
            let sync = Arc::clone(&sync);
            thread::spawn(move || sync.block_until_acquired(Duration::MAX))
        };

        thread::sleep(Duration::from_millis(20));
        sync.acquire_sync();
        assert!(waiter.join().unwrap().is_ok());

        sync.acquire_processing_lock(true, Duration::MAX).unwrap();
        sync.release_processing_lock();
        sync.release_sync();
        assert!(sync.block_until_released(Duration::MAX).is_ok());
    }
}
