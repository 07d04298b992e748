//! # Loadguard Core
//!
//! Overload protection for request-serving processes. Watches event-loop
//! delay, heap and resident memory, and turns requests away with a `503`
//! while any of them is over its limit.
//!
//! ## Signals
//!
//! | Signal | Source | Threshold key |
//! |--------|--------|---------------|
//! | Event-loop delay | [`ClockSampler`](loadguard_monitor::ClockSampler) | `maxEventLoopDelay` (ms) |
//! | Heap used | [`MemoryReader`](loadguard_monitor::MemoryReader) | `maxHeapUsedBytes` |
//! | Resident set | [`MemoryReader`](loadguard_monitor::MemoryReader) | `maxRssBytes` |
//!
//! A zero threshold disables its signal. A signal is breached when its value
//! is strictly greater than the threshold.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      LOADGUARD CORE                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │   request ──► ┌──────────────┐   Pass ──► application       │
//! │               │  Protection  │── Reject ──► 503 response    │
//! │               │  (adapter)   │── Propagate ──► continuation │
//! │               └──────┬───────┘                              │
//! │                      │ Gate::decide                         │
//! │               ┌──────▼───────┐                              │
//! │               │  LoadGuard   │  thresholds + fresh sample   │
//! │               └──┬────────┬──┘                              │
//! │                  ▼        ▼                                 │
//! │          ClockSampler   MemoryReader                        │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use loadguard_core::{protect, GuardConfig, Response};
//!
//! # async fn run() -> loadguard_core::Result<()> {
//! let config = GuardConfig::new()
//!     .with_max_event_loop_delay(42)
//!     .with_max_rss_bytes(512 * 1024 * 1024)
//!     .with_client_retry_secs(10);
//!
//! let protection = protect("http", config)?;
//!
//! let mut response = Response::new();
//! if protection.intercept(&mut response) {
//!     // 503 already written
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Notes
//!
//! - Verdicts are recomputed on every access and never cached
//! - The gate never fails at request time; configuration errors surface
//!   from [`protect`]
//! - In production mode clients only ever see `Service Unavailable`

mod adapter;
mod config;
mod error;
mod gate;
mod guard;
mod verdict;

pub use adapter::{protect, protect_with, Framework, Next, OverloadResponse, Protection, Response};
pub use config::{GuardConfig, LogCallback, LogLevel, Logging};
pub use error::GuardError;
pub use gate::{
    Gate, GateDecision, GateEvent, OverloadError, Rejection, RETRY_AFTER, SERVICE_UNAVAILABLE,
    SERVICE_UNAVAILABLE_MESSAGE,
};
pub use guard::{Collaborators, LoadGuard};
pub use verdict::{LoadStats, Sample, Signal, Thresholds, Verdict, HEAVY_LOAD_MESSAGE};

// Re-export monitor types for convenience
pub use loadguard_monitor::{MemoryUsage, MonitorError};

/// Core result type for loadguard operations.
pub type Result<T> = std::result::Result<T, GuardError>;

#[cfg(test)]
mod tests;
