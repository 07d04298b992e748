//! Configuration types for loadguard.

use crate::error::GuardError;
use crate::gate::GateEvent;
use crate::verdict::Thresholds;
use crate::Result;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Callback receiving gate log events.
pub type LogCallback = Arc<dyn Fn(&GateEvent<'_>) + Send + Sync>;

/// Configuration for a [`LoadGuard`](crate::LoadGuard) and its gate.
///
/// Deserializes from camelCase JSON; missing keys take their defaults.
///
/// # Example
///
/// ```rust
/// use loadguard_core::GuardConfig;
///
/// let config = GuardConfig::new()
///     .with_max_event_loop_delay(0)
///     .with_max_rss_bytes(512 * 1024 * 1024)
///     .with_client_retry_secs(10);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct GuardConfig {
    /// Sampler tick period in milliseconds.
    pub sample_interval: u64,

    /// Event-loop delay threshold in milliseconds (0 disables).
    pub max_event_loop_delay: u64,

    /// Heap-used threshold in bytes (0 disables).
    pub max_heap_used_bytes: u64,

    /// Resident set threshold in bytes (0 disables).
    pub max_rss_bytes: u64,

    /// `Retry-After` value sent with rejections (0 omits the header).
    pub client_retry_secs: u64,

    /// Hide overload details from clients.
    pub production: bool,

    /// Hand rejections to the continuation as errors instead of writing them.
    pub error_propagation_mode: bool,

    /// Where gate log events go.
    pub logging: Logging,

    /// Log full stats on every gate check.
    pub log_stats_on_req: bool,
}

impl GuardConfig {
    /// Creates a new config with default values.
    ///
    /// Defaults:
    /// - Sample interval: 5 ms
    /// - Max event-loop delay: 42 ms
    /// - Max heap used / max rss: disabled
    /// - Client retry: 1 s
    /// - Production, error propagation, stats logging: off
    /// - Logging: disabled
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sample_interval: 5,
            max_event_loop_delay: 42,
            max_heap_used_bytes: 0,
            max_rss_bytes: 0,
            client_retry_secs: 1,
            production: false,
            error_propagation_mode: false,
            logging: Logging::Disabled,
            log_stats_on_req: false,
        }
    }

    /// Sets the sampler tick period (ms).
    #[must_use]
    pub fn with_sample_interval(mut self, ms: u64) -> Self {
        self.sample_interval = ms;
        self
    }

    /// Sets the event-loop delay threshold (ms).
    #[must_use]
    pub fn with_max_event_loop_delay(mut self, ms: u64) -> Self {
        self.max_event_loop_delay = ms;
        self
    }

    /// Sets the heap-used threshold (bytes).
    #[must_use]
    pub fn with_max_heap_used_bytes(mut self, bytes: u64) -> Self {
        self.max_heap_used_bytes = bytes;
        self
    }

    /// Sets the rss threshold (bytes).
    #[must_use]
    pub fn with_max_rss_bytes(mut self, bytes: u64) -> Self {
        self.max_rss_bytes = bytes;
        self
    }

    /// Sets the `Retry-After` value (seconds).
    #[must_use]
    pub fn with_client_retry_secs(mut self, secs: u64) -> Self {
        self.client_retry_secs = secs;
        self
    }

    /// Enables or disables production mode.
    #[must_use]
    pub fn with_production(mut self, enabled: bool) -> Self {
        self.production = enabled;
        self
    }

    /// Enables or disables error-propagation mode.
    #[must_use]
    pub fn with_error_propagation_mode(mut self, enabled: bool) -> Self {
        self.error_propagation_mode = enabled;
        self
    }

    /// Enables or disables per-request stats logging.
    #[must_use]
    pub fn with_log_stats_on_req(mut self, enabled: bool) -> Self {
        self.log_stats_on_req = enabled;
        self
    }

    /// Sets the logging target.
    #[must_use]
    pub fn with_logging(mut self, logging: Logging) -> Self {
        self.logging = logging;
        self
    }

    /// Logs through `tracing` at the given level.
    #[must_use]
    pub fn with_log_level(self, level: LogLevel) -> Self {
        self.with_logging(Logging::Level(level))
    }

    /// Sends gate log events to a callback.
    #[must_use]
    pub fn with_log_callback<F>(self, callback: F) -> Self
    where
        F: Fn(&GateEvent<'_>) + Send + Sync + 'static,
    {
        self.with_logging(Logging::Callback(Arc::new(callback)))
    }

    /// Returns the configured thresholds.
    #[must_use]
    pub const fn thresholds(&self) -> Thresholds {
        Thresholds::new(
            self.max_event_loop_delay,
            self.max_heap_used_bytes,
            self.max_rss_bytes,
        )
    }

    /// Returns the sample interval as a [`Duration`].
    #[must_use]
    pub const fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_interval)
    }

    /// Checks the configuration for combinations that make no sense.
    ///
    /// # Errors
    ///
    /// - [`GuardError::InvalidSampleInterval`] if `sample_interval` is zero
    /// - [`GuardError::AllThresholdsDisabled`] if every threshold is zero
    /// - [`GuardError::StatsLoggingWithoutTarget`] if `log_stats_on_req` is
    ///   set while logging is disabled
    pub fn validate(&self) -> Result<()> {
        if self.sample_interval == 0 {
            return Err(GuardError::InvalidSampleInterval);
        }
        if !self.thresholds().any_enabled() {
            return Err(GuardError::AllThresholdsDisabled);
        }
        if self.log_stats_on_req && !self.logging.is_enabled() {
            return Err(GuardError::StatsLoggingWithoutTarget);
        }
        Ok(())
    }

    /// Parses and validates a JSON config.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Parse`] for malformed JSON or unknown keys, and
    /// any [`validate`](Self::validate) error.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Io`] if the file cannot be read, otherwise as
    /// [`from_json`](Self::from_json).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Severity used when logging through `tracing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    /// `TRACE`
    Trace,
    /// `DEBUG`
    Debug,
    /// `INFO`
    Info,
    /// `WARN`
    Warn,
    /// `ERROR`
    Error,
}

impl FromStr for LogLevel {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(GuardError::InvalidLogging(format!("unknown level '{other}'"))),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Logging target for gate events.
///
/// In JSON: `false` disables, `true` logs at `warn`, a string names the
/// level. Callbacks can only be set in code.
#[derive(Clone, Default, Deserialize)]
#[serde(try_from = "LoggingOption")]
pub enum Logging {
    /// No gate logging.
    #[default]
    Disabled,
    /// Emit through `tracing` at this level.
    Level(LogLevel),
    /// Hand events to a callback.
    Callback(LogCallback),
}

impl Logging {
    /// Returns `true` unless logging is disabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

impl std::fmt::Debug for Logging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::Level(level) => f.debug_tuple("Level").field(level).finish(),
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Wire form of [`Logging`].
#[derive(Deserialize)]
#[serde(untagged)]
enum LoggingOption {
    Flag(bool),
    Level(String),
}

impl TryFrom<LoggingOption> for Logging {
    type Error = GuardError;

    fn try_from(option: LoggingOption) -> Result<Self> {
        match option {
            LoggingOption::Flag(false) => Ok(Self::Disabled),
            LoggingOption::Flag(true) => Ok(Self::Level(LogLevel::Warn)),
            LoggingOption::Level(name) => name.parse().map(Self::Level),
        }
    }
}
