//! Monotonic clock used to age idle buffers.

use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Source of monotonic time for the registry.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// Clock backed by [`Instant::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually driven clock for tests.
#[derive(Debug)]
pub struct MockClock {
    now: RwLock<Instant>,
}

impl MockClock {
    /// A clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            now: RwLock::new(Instant::now()),
        }
    }

    /// Move time forward.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.write();
        *now += duration;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.now.read()
    }
}
