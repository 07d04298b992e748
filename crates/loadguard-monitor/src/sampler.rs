//! # Clock Sampler
//!
//! Measures event-loop delay: how late the runtime fires a periodic timer.
//!
//! ## Design
//!
//! On every tick the sampler computes
//!
//! ```text
//! delay = (now - last_tick) - period        (saturating at zero)
//! last_tick = now
//! ```
//!
//! and publishes `delay` through an atomic. Readers see the most recent
//! value without locking. The first delay covers the span from
//! construction to the first tick.
//!
//! A stopped sampler keeps its last value readable; it simply stops
//! updating.
//!
//! ## Example
//!
//! ```rust
//! use loadguard_monitor::{ClockSampler, ManualClock, ManualTicker};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let clock = ManualClock::new();
//! let ticker = ManualTicker::new();
//! let sampler = ClockSampler::start(
//!     Arc::new(clock.clone()),
//!     &ticker,
//!     Duration::from_millis(5),
//! );
//!
//! clock.advance(Duration::from_millis(45));
//! ticker.tick();
//! assert_eq!(sampler.delay(), Duration::from_millis(40));
//! ```

use crate::clock::Clock;
use crate::ticker::{TickHandle, Ticker};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Periodically samples event-loop delay.
pub struct ClockSampler {
    /// Latest delay in nanoseconds.
    delay_nanos: Arc<AtomicU64>,
    /// Number of ticks observed so far.
    ticks: Arc<AtomicU64>,
    /// Nominal tick period.
    period: Duration,
    /// Timer handle; `None` once stopped.
    handle: Mutex<Option<Box<dyn TickHandle>>>,
}

impl ClockSampler {
    /// Starts sampling immediately.
    ///
    /// # Arguments
    ///
    /// * `clock` - Time source used to timestamp ticks
    /// * `ticker` - Timer that drives the sampling callback
    /// * `period` - Nominal interval between ticks
    pub fn start(clock: Arc<dyn Clock>, ticker: &dyn Ticker, period: Duration) -> Self {
        let delay_nanos = Arc::new(AtomicU64::new(0));
        let ticks = Arc::new(AtomicU64::new(0));

        let delay_slot = Arc::clone(&delay_nanos);
        let tick_count = Arc::clone(&ticks);
        let mut last_tick = clock.now();

        let handle = ticker.start(
            period,
            Box::new(move || {
                let now = clock.now();
                let elapsed = now.saturating_duration_since(last_tick);
                let delay = elapsed.saturating_sub(period);
                last_tick = now;

                delay_slot.store(saturating_nanos(delay), Ordering::Release);
                tick_count.fetch_add(1, Ordering::Relaxed);
            }),
        );

        info!(period_ms = period.as_millis() as u64, "event-loop sampler started");

        Self {
            delay_nanos,
            ticks,
            period,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Returns the most recently observed event-loop delay.
    #[inline]
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_nanos(self.delay_nanos.load(Ordering::Acquire))
    }

    /// Returns the nominal tick period.
    #[inline]
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Returns how many ticks have been observed.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Returns `true` until [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Cancels the timer.
    ///
    /// Returns `true` if this call stopped the sampler, `false` if it was
    /// already stopped.
    pub fn stop(&self) -> bool {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match handle {
            Some(mut handle) => {
                handle.cancel();
                info!(
                    ticks = self.ticks(),
                    last_delay_ms = self.delay().as_millis() as u64,
                    "event-loop sampler stopped"
                );
                true
            }
            None => {
                debug!("sampler already stopped");
                false
            }
        }
    }
}

impl std::fmt::Debug for ClockSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockSampler")
            .field("delay", &self.delay())
            .field("ticks", &self.ticks())
            .field("period", &self.period)
            .field("running", &self.is_running())
            .finish()
    }
}

fn saturating_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
