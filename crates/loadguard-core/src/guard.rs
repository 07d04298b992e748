//! The monitor instance.
//!
//! A [`LoadGuard`] owns one [`ClockSampler`] and one [`MemoryReader`]. It
//! stores nothing but the latest delay: every verdict accessor takes a
//! fresh memory reading and re-evaluates, so answers always reflect the
//! moment of the call.

use crate::{
    config::GuardConfig,
    verdict::{LoadStats, Sample, Thresholds, Verdict},
    Result,
};

use loadguard_monitor::{
    Clock, ClockSampler, MemoryReader, ProcessMemoryReader, SystemClock, Ticker, TokioTicker,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// The clock, timer and memory source a guard runs on.
///
/// Production code uses [`Collaborators::system`]; tests pass the manual
/// doubles from `loadguard_monitor`.
#[derive(Clone)]
pub struct Collaborators {
    /// Time source for the sampler.
    pub clock: Arc<dyn Clock>,
    /// Timer driving the sampler.
    pub ticker: Arc<dyn Ticker>,
    /// Memory figures source.
    pub memory: Arc<dyn MemoryReader>,
}

impl Collaborators {
    /// System clock, tokio ticker on the current runtime, `/proc` reader.
    ///
    /// # Errors
    ///
    /// Fails with [`MonitorError::NoRuntime`](loadguard_monitor::MonitorError::NoRuntime)
    /// outside a tokio runtime.
    pub fn system() -> Result<Self> {
        Ok(Self {
            clock: Arc::new(SystemClock),
            ticker: Arc::new(TokioTicker::new()?),
            memory: Arc::new(ProcessMemoryReader::new()),
        })
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Live overload monitor.
///
/// # Example
///
/// ```rust
/// use loadguard_core::{Collaborators, GuardConfig, LoadGuard};
/// use loadguard_monitor::{ManualClock, ManualMemoryReader, ManualTicker};
/// use std::sync::Arc;
///
/// let memory = ManualMemoryReader::new(0, 99_999);
/// let guard = LoadGuard::with_collaborators(
///     GuardConfig::new().with_max_rss_bytes(40),
///     Collaborators {
///         clock: Arc::new(ManualClock::new()),
///         ticker: Arc::new(ManualTicker::new()),
///         memory: Arc::new(memory.clone()),
///     },
/// )?;
///
/// assert!(guard.rss_overload());
/// memory.set_rss(10);
/// assert!(!guard.overload());
/// # Ok::<(), loadguard_core::GuardError>(())
/// ```
pub struct LoadGuard {
    /// Resolved thresholds.
    thresholds: Thresholds,

    /// Event-loop delay sampler.
    sampler: ClockSampler,

    /// Source of heap and rss figures.
    memory: Arc<dyn MemoryReader>,
}

impl LoadGuard {
    /// Creates a guard on the current tokio runtime and starts sampling.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - No tokio runtime is running
    /// - A memory limit is set but process memory cannot be read
    pub fn new(config: GuardConfig) -> Result<Self> {
        config.validate()?;
        Self::with_collaborators(config, Collaborators::system()?)
    }

    /// Creates a guard on explicit collaborators and starts sampling.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, or if a memory
    /// limit is set and the memory reader cannot produce a reading.
    pub fn with_collaborators(config: GuardConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let thresholds = config.thresholds();
        if thresholds.memory_enabled() {
            // Memory limits need a reader that actually works.
            let usage = collaborators.memory.try_read()?;
            debug!(
                heap_used_bytes = usage.heap_used_bytes,
                rss_bytes = usage.rss_bytes,
                "memory reader verified"
            );
        }

        let sampler = ClockSampler::start(
            collaborators.clock,
            collaborators.ticker.as_ref(),
            config.sample_period(),
        );

        info!(
            max_event_loop_delay_ms = thresholds.max_event_loop_delay_ms,
            max_heap_used_bytes = thresholds.max_heap_used_bytes,
            max_rss_bytes = thresholds.max_rss_bytes,
            "load guard started"
        );

        Ok(Self {
            thresholds,
            sampler,
            memory: collaborators.memory,
        })
    }

    /// Latest event-loop delay.
    #[must_use]
    pub fn event_loop_delay(&self) -> Duration {
        self.sampler.delay()
    }

    /// Takes a fresh sample of every signal.
    #[must_use]
    pub fn sample(&self) -> Sample {
        Sample::new(self.sampler.delay(), self.memory.read())
    }

    /// Evaluates the current sample.
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        let verdict = self.thresholds.evaluate(&self.sample());
        debug!(overload = verdict.overload(), "verdict evaluated");
        verdict
    }

    /// Returns `true` if any signal is currently breached.
    #[must_use]
    pub fn overload(&self) -> bool {
        self.verdict().overload()
    }

    /// Returns `true` if event-loop delay is currently breached.
    #[must_use]
    pub fn event_loop_overload(&self) -> bool {
        self.verdict().event_loop_overload()
    }

    /// Returns `true` if heap used is currently breached.
    #[must_use]
    pub fn heap_used_overload(&self) -> bool {
        self.verdict().heap_used_overload()
    }

    /// Returns `true` if rss is currently breached.
    #[must_use]
    pub fn rss_overload(&self) -> bool {
        self.verdict().rss_overload()
    }

    /// Current verdict with the sample and thresholds behind it.
    #[must_use]
    pub fn stats(&self) -> LoadStats {
        let sample = self.sample();
        let verdict = self.thresholds.evaluate(&sample);
        LoadStats::new(&sample, &verdict, &self.thresholds)
    }

    /// Resolved thresholds.
    #[must_use]
    pub const fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Delay threshold in milliseconds (0 when disabled).
    #[must_use]
    pub const fn max_event_loop_delay(&self) -> u64 {
        self.thresholds.max_event_loop_delay_ms
    }

    /// Heap threshold in bytes (0 when disabled).
    #[must_use]
    pub const fn max_heap_used_bytes(&self) -> u64 {
        self.thresholds.max_heap_used_bytes
    }

    /// Rss threshold in bytes (0 when disabled).
    #[must_use]
    pub const fn max_rss_bytes(&self) -> u64 {
        self.thresholds.max_rss_bytes
    }

    /// Sampler tick period.
    #[must_use]
    pub fn sample_period(&self) -> Duration {
        self.sampler.period()
    }

    /// Returns `true` until [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sampler.is_running()
    }

    /// Stops sampling. The last delay stays readable.
    ///
    /// Calling it again has no effect.
    pub fn stop(&self) {
        if self.sampler.stop() {
            info!("load guard stopped");
        }
    }
}

impl std::fmt::Debug for LoadGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadGuard")
            .field("thresholds", &self.thresholds)
            .field("sampler", &self.sampler)
            .finish_non_exhaustive()
    }
}
