//! A container that can run code right after its entries are snapshotted.

use gridcache_core::{DataContainer, InternalEntry, MemoryContainer};
use parking_lot::Mutex;
use std::time::Duration;

type SnapshotHook = Box<dyn FnOnce() + Send>;

/// A [`MemoryContainer`] with a one-shot hook fired after the next
/// [`entries`](DataContainer::entries) call.
///
/// A state provider snapshots its entries right after activating its
/// transaction log, so the hook runs at a point where writes are logged
/// but no longer part of the snapshot.
#[derive(Default)]
pub struct HookedContainer {
    inner: MemoryContainer,
    on_snapshot: Mutex<Option<SnapshotHook>>,
}

impl HookedContainer {
    /// Creates an empty container with no hook.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `hook` once, after the next snapshot is taken.
    pub fn on_next_snapshot(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_snapshot.lock() = Some(Box::new(hook));
    }
}

impl DataContainer for HookedContainer {
    fn entries(&self) -> Vec<InternalEntry> {
        let entries = self.inner.entries();
        let hook = self.on_snapshot.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        entries
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.get(key)
    }

    fn put_local(&self, key: Vec<u8>, value: Vec<u8>, lifespan: Option<Duration>) {
        self.inner.put_local(key, value, lifespan);
    }

    fn remove(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.remove(key)
    }

    fn clear(&self) {
        self.inner.clear();
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
