//! Blocking waits keyed on metadata versions.

use crate::types::MetadataVersion;
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Tracks the highest locally observed metadata version and lets callers
/// block until a target version has been reached.
///
/// Observed versions never regress: `advance` with a lower version is a
/// no-op. Safe to use concurrently with publishers.
#[derive(Debug, Default)]
pub struct VersionWaiter {
    current: Mutex<MetadataVersion>,
    cond: Condvar,
}

impl VersionWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The highest version observed so far.
    pub fn current(&self) -> MetadataVersion {
        *self.current.lock()
    }

    /// Record that `version` has been applied locally. Monotonic.
    pub fn advance(&self, version: MetadataVersion) {
        let mut current = self.current.lock();
        if version > *current {
            *current = version;
            self.cond.notify_all();
        }
    }

    /// Block until the observed version reaches `version` or `timeout`
    /// elapses. Returns whether the version was reached.
    pub fn wait_for(&self, version: MetadataVersion, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut current = self.current.lock();
        while *current < version {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let timed_out = self
                .cond
                .wait_for(&mut current, deadline - now)
                .timed_out();
            if timed_out && *current < version {
                return false;
            }
        }
        true
    }
}
