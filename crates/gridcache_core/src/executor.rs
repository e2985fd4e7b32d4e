//! Command execution seam.

use crate::address::Address;
use crate::command::CacheCommand;
use crate::error::CacheResult;

/// Flags that alter how a command runs against local state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvocationFlags {
    /// Apply locally only, never replicate.
    pub cache_mode_local: bool,
    /// Skip lock acquisition.
    pub skip_locking: bool,
    /// Skip the check that the local member owns the key.
    pub skip_ownership_check: bool,
}

impl InvocationFlags {
    /// Flags used when replaying transferred state: remote origin, no
    /// replication, no locking, no ownership check.
    pub const fn state_transfer_replay() -> Self {
        Self {
            cache_mode_local: true,
            skip_locking: true,
            skip_ownership_check: true,
        }
    }
}

/// The context a command is executed in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationContext {
    /// The member the command came from, `None` when it originated here.
    pub origin: Option<Address>,
    /// Execution flags.
    pub flags: InvocationFlags,
}

impl InvocationContext {
    /// Creates a context for a locally originated command.
    pub fn local() -> Self {
        Self::default()
    }

    /// Creates a context for a command received from `origin`.
    pub fn remote(origin: Address) -> Self {
        Self {
            origin: Some(origin),
            flags: InvocationFlags::default(),
        }
    }

    /// Replaces the flags.
    #[must_use]
    pub fn with_flags(mut self, flags: InvocationFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Returns true if the command originated on this member.
    pub fn is_origin_local(&self) -> bool {
        self.origin.is_none()
    }
}

/// Executes a single command against local state.
///
/// Implementations apply writes to the container and store, and record
/// outcomes in the transaction log.
pub trait CommandExecutor: Send + Sync {
    /// Executes `command` in `ctx`.
    fn execute(&self, ctx: &InvocationContext, command: &CacheCommand) -> CacheResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_context() {
        let ctx = InvocationContext::remote(Address::new("provider"))
            .with_flags(InvocationFlags::state_transfer_replay());
        assert!(!ctx.is_origin_local());
        assert!(ctx.flags.cache_mode_local);
        assert!(ctx.flags.skip_locking);
        assert!(ctx.flags.skip_ownership_check);

        assert!(InvocationContext::local().is_origin_local());
    }
}
