//! Completion event signalled by an asynchronous encoder

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Manual-reset event paired with one output bitstream slot
#[derive(Debug, Default)]
pub struct CompletionEvent {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl CompletionEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.cond.notify_all();
    }

    /// Re-arm before the slot is handed to the encoder again
    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock()
    }

    /// Block until signalled; false if `timeout` elapsed first
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut signaled = self.signaled.lock();
        // A deadline past the clock's range never elapses
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            while !*signaled {
                self.cond.wait(&mut signaled);
            }
            return true;
        };
        while !*signaled {
            if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                return *signaled;
            }
        }
        true
    }
}
