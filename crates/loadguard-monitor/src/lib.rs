//! # Load Monitor
//!
//! Leaf components for process self-protection: an event-loop delay
//! sampler and a process memory reader. Prevents a request-serving
//! process from accepting work it can no longer handle.
//!
//! ## Signals
//!
//! A process under pressure shows it in a few locally observable ways:
//! - **Scheduler lag** (a periodic timer fires late)
//! - **Heap growth** (allocator holds more and more memory)
//! - **Resident set growth** (the OS charges the process more pages)
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`ClockSampler`] | Measures event-loop delay on every tick |
//! | [`Ticker`] / [`TokioTicker`] | Drives the sampler on the runtime |
//! | [`Clock`] / [`SystemClock`] | Timestamps ticks |
//! | [`MemoryReader`] / [`ProcessMemoryReader`] | Reads heap and rss figures |
//! | [`ManualClock`], [`ManualTicker`], [`ManualMemoryReader`] | Deterministic stand-ins for tests |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use loadguard_monitor::{ClockSampler, SystemClock, TokioTicker};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> loadguard_monitor::Result<()> {
//! let ticker = TokioTicker::new()?;
//! let sampler = ClockSampler::start(Arc::new(SystemClock), &ticker, Duration::from_millis(5));
//!
//! // ... serve requests ...
//!
//! println!("event-loop delay: {:?}", sampler.delay());
//! sampler.stop();
//! # Ok(())
//! # }
//! ```
//!
//! ## Notes
//!
//! - Readings are cheap and synchronous; nothing here blocks or suspends
//! - Memory readings are never cached
//! - A stopped sampler keeps reporting its last delay

mod clock;
mod error;
mod manual;
mod memory;
mod sampler;
mod ticker;

pub use clock::{Clock, SystemClock};
pub use error::{MonitorError, Result};
pub use manual::{ManualClock, ManualMemoryReader, ManualTicker};
pub use memory::{MemoryReader, MemoryUsage, ProcessMemoryReader};
pub use sampler::ClockSampler;
pub use ticker::{TickFn, TickHandle, Ticker, TokioTicker};
