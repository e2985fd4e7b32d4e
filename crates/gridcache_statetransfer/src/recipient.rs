//! Recipient side: applying state generated by a provider.

use crate::control::FlushSession;
use crate::frame::{assert_delimiter, StateItem, StateReader};
use crate::manager::StateTransferManager;
use gridcache_core::{
    now_millis, Address, CacheCommand, InternalEntry, InvocationContext, InvocationFlags,
    StateTransferError, StateTransferResult, TransactionId, Transport,
};
use std::collections::HashSet;
use std::io::Read;
use tracing::{debug, info, trace};

impl<T: Transport> StateTransferManager<T> {
    /// Applies state read from `input`, generated by `provider`.
    ///
    /// The flush hand-shake with the provider happens half way through the
    /// stream; the provider is unblocked again before this returns, whether
    /// or not the rest of the stream applied.
    pub fn apply_state(&self, provider: &Address, input: &mut dyn Read) -> StateTransferResult<()> {
        let config = self.config();
        let mut reader = StateReader::new(input);

        match reader.read()? {
            StateItem::CanProvideState(true) => {}
            StateItem::CanProvideState(false) => {
                return Err(StateTransferError::ProviderCannotProvide {
                    provider: provider.clone(),
                });
            }
            other => {
                return Err(StateTransferError::protocol(
                    "can-provide-state flag",
                    other.kind(),
                ))
            }
        }

        if config.fetch_in_memory_state {
            self.apply_in_memory_state(&mut reader)?;
        } else {
            reader.expect_delimiter()?;
        }

        if config.fetch_persistent_state {
            if let Some(store) = &self.components().store {
                store.from_stream(reader.raw())?;
                debug!(cache = %self.cache_name(), "persistent state applied");
            }
        }
        reader.expect_delimiter()?;

        let ctx = InvocationContext::remote(provider.clone())
            .with_flags(InvocationFlags::state_transfer_replay());
        let mut finalized = HashSet::new();

        let replayed = self.replay_log(&mut reader, &ctx, &mut finalized)?;
        debug!(cache = %self.cache_name(), entries = replayed, "pre-flush log replayed");

        let flush = FlushSession::begin(self, provider)?;
        let replayed = self.replay_log(&mut reader, &ctx, &mut finalized)?;
        debug!(cache = %self.cache_name(), entries = replayed, "post-flush log replayed");
        self.apply_pending_prepares(&mut reader, &ctx, &finalized)?;
        flush.unblock()?;

        info!(cache = %self.cache_name(), %provider, "state applied");
        Ok(())
    }

    fn apply_in_memory_state<R: Read>(&self, reader: &mut StateReader<R>) -> StateTransferResult<()> {
        let container = &self.components().container;
        container.clear();
        let result = read_entries(reader, |entry| {
            match entry.remaining_lifespan(now_millis()) {
                Some(lifespan) if lifespan.is_zero() => {
                    trace!("skipping expired entry");
                    false
                }
                lifespan => {
                    container.put_local(entry.key, entry.value, lifespan);
                    true
                }
            }
        });
        match result {
            Ok(count) => {
                debug!(cache = %self.cache_name(), entries = count, "in-memory state applied");
                Ok(())
            }
            Err(e) => {
                container.clear();
                Err(e)
            }
        }
    }

    /// Replays one log section, recording every transaction it finalizes.
    fn replay_log<R: Read>(
        &self,
        reader: &mut StateReader<R>,
        ctx: &InvocationContext,
        finalized: &mut HashSet<TransactionId>,
    ) -> StateTransferResult<usize> {
        let executor = &self.components().executor;
        let mut count = 0;
        loop {
            match reader.read()? {
                StateItem::Log(entry) => {
                    if let Some(transaction) = entry.transaction {
                        finalized.insert(transaction);
                    }
                    for modification in entry.modifications {
                        executor.execute(ctx, &CacheCommand::Write(modification))?;
                    }
                    count += 1;
                }
                other => {
                    assert_delimiter(&other)?;
                    return Ok(count);
                }
            }
        }
    }

    fn apply_pending_prepares<R: Read>(
        &self,
        reader: &mut StateReader<R>,
        ctx: &InvocationContext,
        finalized: &HashSet<TransactionId>,
    ) -> StateTransferResult<()> {
        let executor = &self.components().executor;
        let mut applied = 0usize;
        let mut skipped = 0usize;
        loop {
            match reader.read()? {
                StateItem::Prepare(prepare) => {
                    if finalized.contains(&prepare.transaction) {
                        trace!(transaction = %prepare.transaction, "skipping prepare already committed");
                        skipped += 1;
                        continue;
                    }
                    executor.execute(ctx, &CacheCommand::Prepare(prepare))?;
                    applied += 1;
                }
                other => {
                    assert_delimiter(&other)?;
                    debug!(cache = %self.cache_name(), applied, skipped, "pending prepares applied");
                    return Ok(());
                }
            }
        }
    }
}

/// Reads in-memory entries up to the section delimiter, handing each to
/// `apply`. Returns how many were applied.
fn read_entries<R: Read>(
    reader: &mut StateReader<R>,
    mut apply: impl FnMut(InternalEntry) -> bool,
) -> StateTransferResult<usize> {
    let mut count = 0;
    loop {
        match reader.read()? {
            StateItem::Entry(entry) => {
                if apply(entry) {
                    count += 1;
                }
            }
            other => {
                assert_delimiter(&other)?;
                return Ok(count);
            }
        }
    }
}
