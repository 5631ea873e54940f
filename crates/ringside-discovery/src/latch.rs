//! One-shot readiness signaling.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// A one-shot gate: signaled exactly once, never reset.
///
/// Created when the coordinator starts and signaled when the membership
/// protocol delivers its first processed-state event.
#[derive(Debug, Default)]
pub struct StateLatch {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl StateLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the gate. Later calls are no-ops.
    pub fn signal(&self) {
        let mut signaled = self.signaled.lock();
        if !*signaled {
            *signaled = true;
            self.cond.notify_all();
        }
    }

    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock()
    }

    /// Block until the gate opens or `timeout` elapses.
    ///
    /// A zero timeout returns the current state without blocking.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut signaled = self.signaled.lock();
        if *signaled || timeout.is_zero() {
            return *signaled;
        }
        // wait_while_for handles spurious wakeups; the result only tells us
        // whether the deadline fired, the flag is authoritative
        self.cond.wait_while_for(&mut signaled, |s| !*s, timeout);
        *signaled
    }
}
