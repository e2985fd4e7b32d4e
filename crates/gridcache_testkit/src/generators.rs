//! Property-based test generators using proptest.

use gridcache_core::{PrepareCommand, TransactionId, WriteCommand};
use proptest::prelude::*;

/// Strategy for cache keys.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..32)
}

/// Strategy for cache values.
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for a set of distinct entries.
pub fn entries_strategy(max: usize) -> impl Strategy<Value = Vec<(Vec<u8>, Vec<u8>)>> {
    prop::collection::btree_map(key_strategy(), value_strategy(), 0..max)
        .prop_map(|entries| entries.into_iter().collect())
}

/// Strategy for single puts and removes. Clears are left out since they
/// make most other generated writes irrelevant.
pub fn write_strategy() -> impl Strategy<Value = WriteCommand> {
    prop_oneof![
        3 => (key_strategy(), value_strategy()).prop_map(|(key, value)| WriteCommand::put(key, value)),
        1 => key_strategy().prop_map(WriteCommand::remove),
    ]
}

/// Strategy for two-phase prepares with fresh transaction ids.
pub fn prepare_strategy() -> impl Strategy<Value = PrepareCommand> {
    prop::collection::vec(write_strategy(), 1..4)
        .prop_map(|modifications| PrepareCommand::new(TransactionId::new(), modifications))
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_entries_have_distinct_keys(entries in entries_strategy(16)) {
            let mut keys: Vec<_> = entries.iter().map(|(k, _)| k.clone()).collect();
            keys.dedup();
            prop_assert_eq!(keys.len(), entries.len());
        }

        #[test]
        fn generated_writes_carry_keys(write in write_strategy()) {
            prop_assert!(write.key().is_some());
        }
    }
}
