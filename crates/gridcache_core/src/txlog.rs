//! Transaction log drained by a state provider.

use crate::command::{PrepareCommand, TransactionId, WriteCommand};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{trace, warn};

/// The outcome of one resolved write: a committed transaction or a
/// non-transactional write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The transaction, `None` for non-transactional writes.
    pub transaction: Option<TransactionId>,
    /// Modifications in the order they were applied.
    pub modifications: Vec<WriteCommand>,
}

impl LogEntry {
    /// Creates a new entry.
    pub fn new(transaction: Option<TransactionId>, modifications: Vec<WriteCommand>) -> Self {
        Self {
            transaction,
            modifications,
        }
    }
}

/// An ordered, toggleable buffer of write outcomes plus the set of
/// prepared-but-undecided transactions.
///
/// # Invariants
///
/// - Entries accumulate only while the log is active
/// - Pending prepares are tracked whether or not the log is active
/// - Deactivating discards undrained entries
/// - Draining removes entries in the order they were logged
#[derive(Debug, Default)]
pub struct TransactionLog {
    entries: Mutex<VecDeque<LogEntry>>,
    pending_prepares: Mutex<HashMap<TransactionId, PrepareCommand>>,
    active: AtomicBool,
}

impl TransactionLog {
    /// Creates an inactive, empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts accumulating entries.
    ///
    /// Returns false if the log was already active, which means another
    /// transfer owns it.
    pub fn activate(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Stops accumulating entries and discards anything left undrained.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
        let mut entries = self.entries.lock();
        if !entries.is_empty() {
            warn!(
                entries = entries.len(),
                "discarding unprocessed transaction log entries"
            );
        }
        entries.clear();
    }

    /// Returns true while entries are being accumulated.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Records a prepared transaction awaiting its outcome.
    pub fn log_prepare(&self, prepare: PrepareCommand) {
        self.pending_prepares
            .lock()
            .insert(prepare.transaction, prepare);
    }

    /// Records the commit of a previously prepared transaction.
    pub fn log_commit(&self, transaction: &TransactionId) {
        let prepare = self.pending_prepares.lock().remove(transaction);
        if let Some(prepare) = prepare {
            if self.is_active() {
                self.push(LogEntry::new(Some(*transaction), prepare.modifications));
            }
        }
    }

    /// Records a transaction that prepared and committed in one round.
    pub fn log_one_phase_commit(&self, transaction: &TransactionId, modifications: Vec<WriteCommand>) {
        self.pending_prepares.lock().remove(transaction);
        if self.is_active() {
            self.push(LogEntry::new(Some(*transaction), modifications));
        }
    }

    /// Records a non-transactional write.
    pub fn log_no_tx_write(&self, write: WriteCommand) {
        if self.is_active() {
            self.push(LogEntry::new(None, vec![write]));
        }
    }

    /// Forgets a rolled-back transaction.
    pub fn rollback(&self, transaction: &TransactionId) {
        self.pending_prepares.lock().remove(transaction);
    }

    /// Returns the number of undrained entries.
    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    /// Removes and returns up to `max` of the oldest entries.
    pub fn drain(&self, max: usize) -> Vec<LogEntry> {
        let mut entries = self.entries.lock();
        let count = max.min(entries.len());
        entries.drain(..count).collect()
    }

    /// Returns every prepared transaction that has not been resolved yet.
    pub fn pending_prepares(&self) -> Vec<PrepareCommand> {
        self.pending_prepares.lock().values().cloned().collect()
    }

    /// Returns the pending prepare of `transaction`, if any.
    pub fn pending_prepare(&self, transaction: &TransactionId) -> Option<PrepareCommand> {
        self.pending_prepares.lock().get(transaction).cloned()
    }

    /// Returns true if exactly this prepare is still awaiting its outcome.
    pub fn has_pending_prepare(&self, prepare: &PrepareCommand) -> bool {
        self.pending_prepares
            .lock()
            .get(&prepare.transaction)
            .is_some_and(|pending| pending == prepare)
    }

    fn push(&self, entry: LogEntry) {
        trace!(transaction = ?entry.transaction, "logging entry");
        self.entries.lock().push_back(entry);
    }
}
