//! Recurring timers.
//!
//! A [`Ticker`] invokes a callback every `period` until the returned
//! [`TickHandle`] is cancelled. The callback runs on the same runtime as the
//! request handlers it protects, so a late tick *is* the measurement: when
//! the runtime is busy, the tick fires late and the sampler records the
//! excess.
//!
//! ## Lifecycle
//!
//! ```text
//!   start(period, on_tick) ──► running ──cancel()──► cancelled
//!                                 │
//!                                 └── on_tick() every `period` (drift allowed)
//! ```
//!
//! [`TokioTicker`] spawns a detached task. A detached task never keeps the
//! runtime alive by itself, and dropping its handle aborts it.

use crate::error::{MonitorError, Result};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Callback invoked on every tick.
pub type TickFn = Box<dyn FnMut() + Send + 'static>;

/// Something that can drive a periodic callback.
pub trait Ticker: Send + Sync {
    /// Starts invoking `on_tick` every `period`.
    fn start(&self, period: Duration, on_tick: TickFn) -> Box<dyn TickHandle>;
}

/// Handle to a running ticker.
pub trait TickHandle: Send {
    /// Stops further ticks. Calling it again has no effect.
    fn cancel(&mut self);
}

/// Ticker backed by a tokio interval on the given runtime.
#[derive(Debug, Clone)]
pub struct TokioTicker {
    handle: Handle,
}

impl TokioTicker {
    /// Creates a ticker on the runtime the caller is running in.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::NoRuntime`] when called outside a tokio
    /// runtime.
    pub fn new() -> Result<Self> {
        Handle::try_current()
            .map(Self::from_handle)
            .map_err(|_| MonitorError::NoRuntime)
    }

    /// Creates a ticker on an explicit runtime.
    #[must_use]
    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Ticker for TokioTicker {
    fn start(&self, period: Duration, mut on_tick: TickFn) -> Box<dyn TickHandle> {
        // tokio intervals reject a zero period
        let period = period.max(Duration::from_millis(1));
        debug!(period_ms = period.as_millis() as u64, "starting sampler ticker");

        // First tick one full period after start, not immediately.
        let start = tokio::time::Instant::now() + period;
        let task = self.handle.spawn(async move {
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                on_tick();
            }
        });

        Box::new(TokioTickHandle { task: Some(task) })
    }
}

/// Handle to a spawned ticker task.
#[derive(Debug)]
struct TokioTickHandle {
    task: Option<JoinHandle<()>>,
}

impl TickHandle for TokioTickHandle {
    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TokioTickHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
