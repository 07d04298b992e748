//! Hand-driven collaborators for deterministic tests.
//!
//! Each type is a cheap [`Clone`] over shared state, so a test can hand one
//! copy to the code under test and keep another to drive it.

use crate::clock::Clock;
use crate::memory::{MemoryReader, MemoryUsage};
use crate::ticker::{TickFn, TickHandle, Ticker};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset_nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_nanos: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

#[derive(Default)]
struct TickerState {
    period: Option<Duration>,
    on_tick: Option<TickFn>,
    cancelled: bool,
    cancel_count: u32,
}

/// A ticker that fires only when [`tick`](ManualTicker::tick) is called.
///
/// It records the period it was started with and whether it was cancelled.
#[derive(Clone, Default)]
pub struct ManualTicker {
    state: Arc<Mutex<TickerState>>,
}

impl ManualTicker {
    /// Creates an idle ticker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the tick callback once.
    ///
    /// Returns `false` if the ticker was never started or has been
    /// cancelled.
    pub fn tick(&self) -> bool {
        // Run the callback without holding the lock.
        let taken = {
            let mut state = self.lock();
            if state.cancelled {
                None
            } else {
                state.on_tick.take()
            }
        };

        let Some(mut on_tick) = taken else {
            return false;
        };
        on_tick();

        let mut state = self.lock();
        if !state.cancelled {
            state.on_tick = Some(on_tick);
        }
        true
    }

    /// Returns the period the ticker was started with.
    #[must_use]
    pub fn period(&self) -> Option<Duration> {
        self.lock().period
    }

    /// Returns `true` once the handle has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Returns how many times `cancel` was invoked on the handle.
    #[must_use]
    pub fn cancel_count(&self) -> u32 {
        self.lock().cancel_count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TickerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ManualTicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ManualTicker")
            .field("period", &state.period)
            .field("cancelled", &state.cancelled)
            .finish()
    }
}

impl Ticker for ManualTicker {
    fn start(&self, period: Duration, on_tick: TickFn) -> Box<dyn TickHandle> {
        let mut state = self.lock();
        state.period = Some(period);
        state.on_tick = Some(on_tick);
        state.cancelled = false;
        Box::new(ManualTickHandle {
            state: Arc::clone(&self.state),
        })
    }
}

struct ManualTickHandle {
    state: Arc<Mutex<TickerState>>,
}

impl TickHandle for ManualTickHandle {
    fn cancel(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.cancelled = true;
        state.cancel_count += 1;
        state.on_tick = None;
    }
}

/// A memory reader whose figures are set by the test.
#[derive(Debug, Clone, Default)]
pub struct ManualMemoryReader {
    heap_used_bytes: Arc<AtomicU64>,
    rss_bytes: Arc<AtomicU64>,
    reads: Arc<AtomicU64>,
}

impl ManualMemoryReader {
    /// Creates a reader reporting the given figures.
    #[must_use]
    pub fn new(heap_used_bytes: u64, rss_bytes: u64) -> Self {
        let reader = Self::default();
        reader.set(heap_used_bytes, rss_bytes);
        reader
    }

    /// Replaces both figures.
    pub fn set(&self, heap_used_bytes: u64, rss_bytes: u64) {
        self.set_heap_used(heap_used_bytes);
        self.set_rss(rss_bytes);
    }

    /// Replaces the heap figure.
    pub fn set_heap_used(&self, bytes: u64) {
        self.heap_used_bytes.store(bytes, Ordering::SeqCst);
    }

    /// Replaces the rss figure.
    pub fn set_rss(&self, bytes: u64) {
        self.rss_bytes.store(bytes, Ordering::SeqCst);
    }

    /// Number of readings taken so far.
    #[must_use]
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl MemoryReader for ManualMemoryReader {
    fn read(&self) -> MemoryUsage {
        self.reads.fetch_add(1, Ordering::SeqCst);
        MemoryUsage::new(
            self.heap_used_bytes.load(Ordering::SeqCst),
            self.rss_bytes.load(Ordering::SeqCst),
        )
    }
}
