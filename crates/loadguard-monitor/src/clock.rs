//! Monotonic time source used by the sampler.
//!
//! The sampler never calls [`Instant::now`] directly; it asks a [`Clock`].
//! Production code uses [`SystemClock`], tests substitute
//! [`ManualClock`](crate::ManualClock) to control elapsed time exactly.

use std::time::Instant;

/// A source of monotonic timestamps.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// The real monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}
