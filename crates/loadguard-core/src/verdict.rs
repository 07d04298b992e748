//! Overload evaluation.
//!
//! [`Thresholds::evaluate`] turns a [`Sample`] into a [`Verdict`]. It is a
//! pure function: no clocks, no I/O, no state. Each signal is breached when
//! its value is *strictly* greater than its threshold, and a zero threshold
//! disables the signal outright.

use loadguard_monitor::MemoryUsage;
use serde::Serialize;
use std::time::Duration;

/// Prefix of every overload summary.
pub const HEAVY_LOAD_MESSAGE: &str = "Server experiencing heavy load";

/// The configured limits, as resolved at construction.
///
/// A zero in any field disables that signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Thresholds {
    /// Maximum event-loop delay in milliseconds.
    pub max_event_loop_delay_ms: u64,
    /// Maximum heap used in bytes.
    pub max_heap_used_bytes: u64,
    /// Maximum resident set size in bytes.
    pub max_rss_bytes: u64,
}

impl Thresholds {
    /// Creates a threshold set.
    #[must_use]
    pub const fn new(
        max_event_loop_delay_ms: u64,
        max_heap_used_bytes: u64,
        max_rss_bytes: u64,
    ) -> Self {
        Self {
            max_event_loop_delay_ms,
            max_heap_used_bytes,
            max_rss_bytes,
        }
    }

    /// Returns `true` if at least one signal is enabled.
    #[must_use]
    pub const fn any_enabled(&self) -> bool {
        self.max_event_loop_delay_ms != 0 || self.memory_enabled()
    }

    /// Returns `true` if a heap or rss limit is set.
    #[must_use]
    pub const fn memory_enabled(&self) -> bool {
        self.max_heap_used_bytes != 0 || self.max_rss_bytes != 0
    }

    /// Compares a sample against these thresholds.
    #[must_use]
    pub fn evaluate(&self, sample: &Sample) -> Verdict {
        let event_loop = self.max_event_loop_delay_ms != 0
            && sample.event_loop_delay > Duration::from_millis(self.max_event_loop_delay_ms);

        Verdict::from_flags(
            event_loop,
            exceeds(sample.heap_used_bytes, self.max_heap_used_bytes),
            exceeds(sample.rss_bytes, self.max_rss_bytes),
        )
    }
}

#[inline]
fn exceeds(value: u64, threshold: u64) -> bool {
    threshold != 0 && value > threshold
}

/// A point-in-time measurement of every signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sample {
    /// Latest delay reported by the sampler.
    pub event_loop_delay: Duration,
    /// Heap used at evaluation time.
    pub heap_used_bytes: u64,
    /// Resident set size at evaluation time.
    pub rss_bytes: u64,
}

impl Sample {
    /// Combines a sampler delay with a fresh memory reading.
    #[must_use]
    pub const fn new(event_loop_delay: Duration, memory: MemoryUsage) -> Self {
        Self {
            event_loop_delay,
            heap_used_bytes: memory.heap_used_bytes,
            rss_bytes: memory.rss_bytes,
        }
    }
}

/// A signal that can be breached.
///
/// Variants are declared in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Event-loop delay above `max_event_loop_delay`.
    EventLoop,
    /// Heap used above `max_heap_used_bytes`.
    HeapUsed,
    /// Resident set above `max_rss_bytes`.
    Rss,
}

impl Signal {
    /// All signals in reporting order.
    pub const ALL: [Signal; 3] = [Signal::EventLoop, Signal::HeapUsed, Signal::Rss];

    /// Short name used in overload summaries.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::EventLoop => "event loop",
            Self::HeapUsed => "heap",
            Self::Rss => "rss",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The outcome of one evaluation.
///
/// Never stored: the guard recomputes it on every access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Verdict {
    event_loop_overload: bool,
    heap_used_overload: bool,
    rss_overload: bool,
}

impl Verdict {
    /// Builds a verdict from per-signal flags.
    #[must_use]
    pub const fn from_flags(event_loop: bool, heap_used: bool, rss: bool) -> Self {
        Self {
            event_loop_overload: event_loop,
            heap_used_overload: heap_used,
            rss_overload: rss,
        }
    }

    /// Returns `true` if any signal is breached.
    #[must_use]
    pub const fn overload(&self) -> bool {
        self.event_loop_overload || self.heap_used_overload || self.rss_overload
    }

    /// Returns `true` if event-loop delay is above its threshold.
    #[must_use]
    pub const fn event_loop_overload(&self) -> bool {
        self.event_loop_overload
    }

    /// Returns `true` if heap used is above its threshold.
    #[must_use]
    pub const fn heap_used_overload(&self) -> bool {
        self.heap_used_overload
    }

    /// Returns `true` if rss is above its threshold.
    #[must_use]
    pub const fn rss_overload(&self) -> bool {
        self.rss_overload
    }

    /// Returns `true` if the given signal is breached.
    #[must_use]
    pub const fn is_breached(&self, signal: Signal) -> bool {
        match signal {
            Signal::EventLoop => self.event_loop_overload,
            Signal::HeapUsed => self.heap_used_overload,
            Signal::Rss => self.rss_overload,
        }
    }

    /// Breached signals in reporting order.
    pub fn breached(&self) -> impl Iterator<Item = Signal> + '_ {
        Signal::ALL.into_iter().filter(|s| self.is_breached(*s))
    }

    /// Human-readable summary, or `None` when not overloaded.
    ///
    /// ```rust
    /// use loadguard_core::Verdict;
    ///
    /// let verdict = Verdict::from_flags(true, false, true);
    /// assert_eq!(
    ///     verdict.summary().as_deref(),
    ///     Some("Server experiencing heavy load: (event loop, rss)")
    /// );
    /// ```
    #[must_use]
    pub fn summary(&self) -> Option<String> {
        if !self.overload() {
            return None;
        }
        let signals: Vec<&str> = self.breached().map(|s| s.name()).collect();
        Some(format!("{HEAVY_LOAD_MESSAGE}: ({})", signals.join(", ")))
    }
}

/// Verdict plus the inputs needed to audit it.
///
/// Serializes with the field order and camelCase keys consumers of the
/// per-request stats log expect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStats {
    /// Aggregate overload flag.
    pub overload: bool,
    /// Event-loop signal flag.
    pub event_loop_overload: bool,
    /// Heap signal flag.
    pub heap_used_overload: bool,
    /// Rss signal flag.
    pub rss_overload: bool,
    /// Latest event-loop delay in milliseconds.
    pub event_loop_delay: f64,
    /// Configured delay threshold (ms).
    pub max_event_loop_delay: u64,
    /// Configured heap threshold (bytes).
    pub max_heap_used_bytes: u64,
    /// Configured rss threshold (bytes).
    pub max_rss_bytes: u64,
}

impl LoadStats {
    /// Assembles stats from a sample, its verdict and the thresholds.
    #[must_use]
    pub fn new(sample: &Sample, verdict: &Verdict, thresholds: &Thresholds) -> Self {
        Self {
            overload: verdict.overload(),
            event_loop_overload: verdict.event_loop_overload(),
            heap_used_overload: verdict.heap_used_overload(),
            rss_overload: verdict.rss_overload(),
            event_loop_delay: sample.event_loop_delay.as_secs_f64() * 1000.0,
            max_event_loop_delay: thresholds.max_event_loop_delay_ms,
            max_heap_used_bytes: thresholds.max_heap_used_bytes,
            max_rss_bytes: thresholds.max_rss_bytes,
        }
    }
}
