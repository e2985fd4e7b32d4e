//! Interruptible backoff sleeping.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// A sleep was cut short by [`InterruptibleSleeper::interrupt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sleep interrupted")]
pub struct Interrupted;

/// Something that can wait between provider-discovery passes.
pub trait Sleeper: Send + Sync {
    /// Sleeps for `duration`, or fails if interrupted.
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted>;
}

/// A [`Sleeper`] that another thread can interrupt.
///
/// The interrupt flag stays raised after it cuts a sleep short, so every
/// later sleep fails immediately until [`clear_interrupt`] is called.
///
/// [`clear_interrupt`]: InterruptibleSleeper::clear_interrupt
#[derive(Debug, Default)]
pub struct InterruptibleSleeper {
    interrupted: Mutex<bool>,
    wake: Condvar,
}

impl InterruptibleSleeper {
    /// Creates a sleeper that has not been interrupted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the interrupt flag and wakes any sleeper.
    pub fn interrupt(&self) {
        *self.interrupted.lock() = true;
        self.wake.notify_all();
    }

    /// Returns true while the interrupt flag is raised.
    pub fn is_interrupted(&self) -> bool {
        *self.interrupted.lock()
    }

    /// Lowers the interrupt flag.
    pub fn clear_interrupt(&self) {
        *self.interrupted.lock() = false;
    }
}

impl Sleeper for InterruptibleSleeper {
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        let deadline = Instant::now().checked_add(duration);
        let mut interrupted = self.interrupted.lock();
        while !*interrupted {
            match deadline {
                Some(deadline) => {
                    if self.wake.wait_until(&mut interrupted, deadline).timed_out() {
                        break;
                    }
                }
                None => self.wake.wait(&mut interrupted),
            }
        }
        if *interrupted {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }
}
