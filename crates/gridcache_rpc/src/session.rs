//! Per-call state of one provider-discovery loop.

use gridcache_core::Address;
use parking_lot::RwLock;
use std::time::Duration;

/// State owned by a single `retrieve_state` call.
///
/// The backoff starts from the configured initial wait on every call and
/// only grows within it. The current candidate is mirrored into a shared
/// diagnostics slot for as long as a [`CandidateGuard`] lives.
#[derive(Debug)]
pub(crate) struct StateTransferSession<'a> {
    source: &'a RwLock<Option<Address>>,
    wait: Duration,
    passes_remaining: u32,
    passes_started: u32,
}

impl<'a> StateTransferSession<'a> {
    pub(crate) fn new(source: &'a RwLock<Option<Address>>, initial_wait: Duration, passes: u32) -> Self {
        Self {
            source,
            wait: initial_wait,
            passes_remaining: passes,
            passes_started: 0,
        }
    }

    /// Starts the next pass, returning false once every pass is used up.
    pub(crate) fn begin_pass(&mut self) -> bool {
        if self.passes_remaining == 0 {
            return false;
        }
        self.passes_remaining -= 1;
        self.passes_started += 1;
        true
    }

    /// Returns true if the pass in progress is the last one.
    pub(crate) fn is_last_pass(&self) -> bool {
        self.passes_remaining == 0
    }

    /// Number of passes started so far.
    pub(crate) fn passes_started(&self) -> u32 {
        self.passes_started
    }

    /// The backoff to sleep before the next pass.
    pub(crate) fn wait(&self) -> Duration {
        self.wait
    }

    /// Multiplies the backoff by `factor`.
    pub(crate) fn grow_wait(&mut self, factor: u32) {
        self.wait = self.wait.saturating_mul(factor);
    }

    /// Publishes `provider` as the current candidate until the guard drops.
    pub(crate) fn candidate(&self, provider: &Address) -> CandidateGuard<'a> {
        *self.source.write() = Some(provider.clone());
        CandidateGuard {
            source: self.source,
        }
    }
}

/// Clears the diagnostics slot on every exit path of an attempt.
#[derive(Debug)]
pub(crate) struct CandidateGuard<'a> {
    source: &'a RwLock<Option<Address>>,
}

impl Drop for CandidateGuard<'_> {
    fn drop(&mut self) {
        *self.source.write() = None;
    }
}
