//! Persistent store seam.

use crate::error::{CacheError, CacheResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// The persistent half of a cache's state.
///
/// State transfer treats the store as opaque: it dumps the whole store into
/// the stream with [`CacheStore::to_stream`] and restores it with
/// [`CacheStore::from_stream`]. Neither call may close the channel, since
/// later sections follow in the same stream.
pub trait CacheStore: Send + Sync {
    /// Loads the value stored under `key`.
    fn load(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>>;

    /// Stores a value.
    fn store(&self, key: Vec<u8>, value: Vec<u8>) -> CacheResult<()>;

    /// Removes a key, returning true if it was present.
    fn remove(&self, key: &[u8]) -> CacheResult<bool>;

    /// Removes every entry.
    fn clear(&self) -> CacheResult<()>;

    /// Returns the number of stored entries.
    fn len(&self) -> CacheResult<usize>;

    /// Writes the whole store as one self-delimiting section.
    fn to_stream(&self, out: &mut dyn Write) -> CacheResult<()>;

    /// Replaces the store's contents with a section written by `to_stream`.
    fn from_stream(&self, input: &mut dyn Read) -> CacheResult<()>;
}

/// A [`CacheStore`] kept in memory, dumped as a single CBOR map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn load(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn store(&self, key: Vec<u8>, value: Vec<u8>) -> CacheResult<()> {
        self.data.write().insert(key, value);
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> CacheResult<bool> {
        Ok(self.data.write().remove(key).is_some())
    }

    fn clear(&self) -> CacheResult<()> {
        self.data.write().clear();
        Ok(())
    }

    fn len(&self) -> CacheResult<usize> {
        Ok(self.data.read().len())
    }

    fn to_stream(&self, out: &mut dyn Write) -> CacheResult<()> {
        let data = self.data.read();
        ciborium::ser::into_writer(&*data, out)
            .map_err(|e| CacheError::codec(format!("failed to dump store: {e}")))
    }

    fn from_stream(&self, input: &mut dyn Read) -> CacheResult<()> {
        let restored: BTreeMap<Vec<u8>, Vec<u8>> = ciborium::de::from_reader(input)
            .map_err(|e| CacheError::codec(format!("failed to restore store: {e}")))?;
        *self.data.write() = restored;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crud() {
        let store = MemoryStore::new();
        store.store(b"k".to_vec(), b"v".to_vec()).unwrap();
        assert_eq!(store.load(b"k").unwrap(), Some(b"v".to_vec()));
        assert!(store.remove(b"k").unwrap());
        assert!(!store.remove(b"k").unwrap());
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn stream_replaces_contents_and_leaves_trailing_bytes() {
        let source = MemoryStore::new();
        source.store(b"a".to_vec(), b"1".to_vec()).unwrap();
        source.store(b"b".to_vec(), b"2".to_vec()).unwrap();

        let mut buf = Vec::new();
        source.to_stream(&mut buf).unwrap();
        buf.extend_from_slice(b"tail");

        let target = MemoryStore::new();
        target.store(b"stale".to_vec(), b"x".to_vec()).unwrap();

        let mut input = &buf[..];
        target.from_stream(&mut input).unwrap();

        assert_eq!(input, b"tail");
        assert_eq!(target.len().unwrap(), 2);
        assert_eq!(target.load(b"stale").unwrap(), None);
        assert_eq!(target.load(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn garbage_stream_is_a_codec_error() {
        let store = MemoryStore::new();
        let mut input = &[0xffu8, 0x00][..];
        assert!(matches!(
            store.from_stream(&mut input),
            Err(CacheError::Codec { .. })
        ));
    }
}
