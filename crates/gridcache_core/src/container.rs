//! In-memory data container.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// An entry held by a [`DataContainer`], with its expiry metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalEntry {
    /// Entry key.
    pub key: Vec<u8>,
    /// Entry value.
    pub value: Vec<u8>,
    /// Lifespan in milliseconds, `None` for immortal entries.
    pub lifespan_ms: Option<u64>,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_ms: u64,
}

impl InternalEntry {
    /// Creates an entry created now.
    pub fn new(key: Vec<u8>, value: Vec<u8>, lifespan: Option<Duration>) -> Self {
        Self {
            key,
            value,
            lifespan_ms: lifespan.map(|l| l.as_millis() as u64),
            created_ms: now_millis(),
        }
    }

    /// Returns true if the entry has expired at `now` (milliseconds).
    pub fn is_expired(&self, now: u64) -> bool {
        match self.lifespan_ms {
            Some(lifespan) => self.created_ms.saturating_add(lifespan) <= now,
            None => false,
        }
    }

    /// Returns the lifespan left at `now`, `None` for immortal entries.
    ///
    /// An expired entry reports `Some(Duration::ZERO)`.
    pub fn remaining_lifespan(&self, now: u64) -> Option<Duration> {
        self.lifespan_ms.map(|lifespan| {
            let expires = self.created_ms.saturating_add(lifespan);
            Duration::from_millis(expires.saturating_sub(now))
        })
    }
}

/// The in-memory half of a cache's state.
pub trait DataContainer: Send + Sync {
    /// Returns every entry that has not expired, ordered by key.
    fn entries(&self) -> Vec<InternalEntry>;

    /// Returns the value for `key` if present and not expired.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Stores an entry locally, without replication.
    fn put_local(&self, key: Vec<u8>, value: Vec<u8>, lifespan: Option<Duration>);

    /// Removes an entry, returning its previous value.
    fn remove(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Removes every entry.
    fn clear(&self);

    /// Returns the number of entries, including expired ones not yet purged.
    fn len(&self) -> usize;

    /// Returns true if the container holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A [`DataContainer`] backed by an ordered map.
#[derive(Debug, Default)]
pub struct MemoryContainer {
    entries: RwLock<BTreeMap<Vec<u8>, InternalEntry>>,
}

impl MemoryContainer {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataContainer for MemoryContainer {
    fn entries(&self) -> Vec<InternalEntry> {
        let now = now_millis();
        self.entries
            .read()
            .values()
            .filter(|e| !e.is_expired(now))
            .cloned()
            .collect()
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let now = now_millis();
        self.entries
            .read()
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone())
    }

    fn put_local(&self, key: Vec<u8>, value: Vec<u8>, lifespan: Option<Duration>) {
        let entry = InternalEntry::new(key.clone(), value, lifespan);
        self.entries.write().insert(key, entry);
    }

    fn remove(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.write().remove(key).map(|e| e.value)
    }

    fn clear(&self) {
        self.entries.write().clear();
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_remove() {
        let container = MemoryContainer::new();
        container.put_local(b"a".to_vec(), b"1".to_vec(), None);
        container.put_local(b"b".to_vec(), b"2".to_vec(), None);

        assert_eq!(container.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(container.len(), 2);

        assert_eq!(container.remove(b"a"), Some(b"1".to_vec()));
        assert_eq!(container.get(b"a"), None);

        container.clear();
        assert!(container.is_empty());
    }

    #[test]
    fn expired_entries_are_hidden() {
        let container = MemoryContainer::new();
        container.put_local(b"gone".to_vec(), b"v".to_vec(), Some(Duration::ZERO));
        container.put_local(b"kept".to_vec(), b"v".to_vec(), None);

        assert_eq!(container.get(b"gone"), None);
        let entries = container.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, b"kept".to_vec());
    }

    #[test]
    fn remaining_lifespan() {
        let entry = InternalEntry {
            key: b"k".to_vec(),
            value: b"v".to_vec(),
            lifespan_ms: Some(1_000),
            created_ms: 10_000,
        };
        assert_eq!(
            entry.remaining_lifespan(10_400),
            Some(Duration::from_millis(600))
        );
        assert!(!entry.is_expired(10_999));
        assert!(entry.is_expired(11_000));
        assert_eq!(entry.remaining_lifespan(12_000), Some(Duration::ZERO));

        let immortal = InternalEntry {
            lifespan_ms: None,
            ..entry
        };
        assert_eq!(immortal.remaining_lifespan(u64::MAX), None);
        assert!(!immortal.is_expired(u64::MAX));
    }
}
