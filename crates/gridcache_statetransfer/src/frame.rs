//! Framing of the state transfer stream.
//!
//! A stream starts with a [`StateItem::CanProvideState`] flag. When the flag
//! is true, five sections follow, each terminated by a
//! [`StateItem::Delimiter`]:
//!
//! 1. In-memory entries
//! 2. The persistent store, written raw by the store itself
//! 3. Transaction log entries drained before the flush
//! 4. Transaction log entries drained after the flush
//! 5. Prepared transactions still awaiting their outcome
//!
//! Items are CBOR values. A disabled section is empty but keeps its
//! delimiter.

use gridcache_core::{InternalEntry, LogEntry, PrepareCommand, StateTransferError, StateTransferResult};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// One value in the state transfer stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateItem {
    /// Leading flag: whether the provider can provide state at all.
    CanProvideState(bool),
    /// An in-memory entry.
    Entry(InternalEntry),
    /// A transaction log entry.
    Log(LogEntry),
    /// A prepared, unresolved transaction.
    Prepare(PrepareCommand),
    /// Section terminator.
    Delimiter,
}

impl StateItem {
    /// Returns a short name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            StateItem::CanProvideState(_) => "can-provide-state flag",
            StateItem::Entry(_) => "in-memory entry",
            StateItem::Log(_) => "log entry",
            StateItem::Prepare(_) => "pending prepare",
            StateItem::Delimiter => "delimiter",
        }
    }
}

/// Writes [`StateItem`]s to the provider's end of the stream.
#[derive(Debug)]
pub struct StateWriter<W: Write> {
    inner: W,
}

impl<W: Write> StateWriter<W> {
    /// Wraps a writer.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Writes one item.
    pub fn write(&mut self, item: &StateItem) -> StateTransferResult<()> {
        ciborium::ser::into_writer(item, &mut self.inner)
            .map_err(|e| StateTransferError::stream(format!("failed to write {}: {e}", item.kind())))
    }

    /// Terminates the current section.
    pub fn delimit(&mut self) -> StateTransferResult<()> {
        self.write(&StateItem::Delimiter)
    }

    /// Flushes buffered items to the recipient.
    pub fn flush(&mut self) -> StateTransferResult<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Returns the underlying writer, for sections written raw.
    pub fn raw(&mut self) -> &mut W {
        &mut self.inner
    }
}

/// Reads [`StateItem`]s from the recipient's end of the stream.
#[derive(Debug)]
pub struct StateReader<R: Read> {
    inner: R,
}

impl<R: Read> StateReader<R> {
    /// Wraps a reader.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads one item.
    pub fn read(&mut self) -> StateTransferResult<StateItem> {
        ciborium::de::from_reader(&mut self.inner)
            .map_err(|e| StateTransferError::stream(format!("failed to read state item: {e}")))
    }

    /// Reads one item and fails unless it is the delimiter.
    pub fn expect_delimiter(&mut self) -> StateTransferResult<()> {
        let item = self.read()?;
        assert_delimiter(&item)
    }

    /// Returns the underlying reader, for sections read raw.
    pub fn raw(&mut self) -> &mut R {
        &mut self.inner
    }
}

/// Fails with a protocol fault unless `item` is the delimiter.
pub fn assert_delimiter(item: &StateItem) -> StateTransferResult<()> {
    match item {
        StateItem::Delimiter => Ok(()),
        other => Err(StateTransferError::protocol("delimiter", other.kind())),
    }
}
