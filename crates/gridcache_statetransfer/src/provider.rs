//! Provider side: generating state for a recipient.

use crate::frame::{StateItem, StateWriter};
use crate::manager::StateTransferManager;
use gridcache_core::{
    DistributedSync, StateTransferResult, SyncTimeout, TransactionLog, Transport,
};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Log entries drained per pass.
const LOG_CHUNK: usize = 10;

/// Keeps the transaction log active for the duration of one generation.
struct ActiveLog<'a> {
    log: &'a TransactionLog,
}

impl<'a> ActiveLog<'a> {
    fn activate(log: &'a TransactionLog) -> Option<Self> {
        log.activate().then(|| Self { log })
    }
}

impl Drop for ActiveLog<'_> {
    fn drop(&mut self) {
        self.log.deactivate();
    }
}

/// Holds the exclusive processing lock until dropped.
struct ProcessingLock<'a> {
    sync: &'a dyn DistributedSync,
}

impl<'a> ProcessingLock<'a> {
    fn acquire(sync: &'a dyn DistributedSync, timeout: Duration) -> Result<Self, SyncTimeout> {
        sync.acquire_processing_lock(true, timeout)?;
        Ok(Self { sync })
    }
}

impl Drop for ProcessingLock<'_> {
    fn drop(&mut self) {
        self.sync.release_processing_lock();
    }
}

impl<T: Transport> StateTransferManager<T> {
    /// Writes this cache's state to `out`.
    ///
    /// When the cache cannot provide state, a single false flag is written
    /// so the recipient fails fast.
    pub fn generate_state(&self, out: &mut dyn Write) -> StateTransferResult<()> {
        let config = self.config();
        let transient = config.fetch_in_memory_state;
        let persistent = config.fetch_persistent_state;
        let log = &*self.components().transaction_log;
        let mut writer = StateWriter::new(out);

        let active = if transient || persistent {
            ActiveLog::activate(log)
        } else {
            None
        };
        let Some(_active) = active else {
            warn!(cache = %self.cache_name(), "cannot provide state");
            writer.write(&StateItem::CanProvideState(false))?;
            return writer.flush();
        };

        writer.write(&StateItem::CanProvideState(true))?;

        if transient {
            self.generate_in_memory_state(&mut writer)?;
        }
        writer.delimit()?;

        if persistent {
            if let Some(store) = &self.components().store {
                store.to_stream(writer.raw())?;
                debug!(cache = %self.cache_name(), "persistent state written");
            }
        }
        writer.delimit()?;

        self.generate_transaction_log(&mut writer, log)?;
        info!(cache = %self.cache_name(), "state generated");
        Ok(())
    }

    fn generate_in_memory_state<W: Write>(
        &self,
        writer: &mut StateWriter<W>,
    ) -> StateTransferResult<()> {
        let entries = self.components().container.entries();
        let count = entries.len();
        for entry in entries {
            writer.write(&StateItem::Entry(entry))?;
        }
        debug!(cache = %self.cache_name(), entries = count, "in-memory state written");
        Ok(())
    }

    /// Writes the last three sections: the log drained before the flush,
    /// the log drained after it, and the unresolved prepares.
    fn generate_transaction_log<W: Write>(
        &self,
        writer: &mut StateWriter<W>,
        log: &TransactionLog,
    ) -> StateTransferResult<()> {
        let retrieval = &self.config().state_retrieval;

        let mut previous = log.size();
        let mut non_progressing = 0u32;
        let mut written = 0usize;
        loop {
            written += write_log_chunk(writer, log)?;
            let size = log.size();
            if size == 0 {
                break;
            }
            if size >= previous {
                non_progressing += 1;
                if non_progressing > retrieval.max_non_progressing_log_writes {
                    warn!(
                        cache = %self.cache_name(),
                        size,
                        "transaction log is not shrinking, starting flush early"
                    );
                    break;
                }
            } else {
                non_progressing = 0;
            }
            previous = size;
        }
        debug!(cache = %self.cache_name(), entries = written, "pre-flush log written");

        let sync = self.rpc().transport().distributed_sync();
        let _lock = ProcessingLock::acquire(sync, retrieval.timeout)?;

        writer.delimit()?;
        writer.flush()?;

        debug!(cache = %self.cache_name(), "waiting for recipient to request flush");
        sync.block_until_acquired(retrieval.flush_timeout)?;

        let mut written = 0usize;
        loop {
            let drained = write_log_chunk(writer, log)?;
            if drained == 0 {
                break;
            }
            written += drained;
        }
        writer.delimit()?;
        debug!(cache = %self.cache_name(), entries = written, "post-flush log written");

        let prepares = log.pending_prepares();
        let count = prepares.len();
        for prepare in prepares {
            writer.write(&StateItem::Prepare(prepare))?;
        }
        writer.delimit()?;
        writer.flush()?;
        debug!(cache = %self.cache_name(), prepares = count, "pending prepares written");
        Ok(())
    }
}

fn write_log_chunk<W: Write>(
    writer: &mut StateWriter<W>,
    log: &TransactionLog,
) -> StateTransferResult<usize> {
    let entries = log.drain(LOG_CHUNK);
    let count = entries.len();
    for entry in entries {
        trace!(transaction = ?entry.transaction, "writing log entry");
        writer.write(&StateItem::Log(entry))?;
    }
    Ok(count)
}
