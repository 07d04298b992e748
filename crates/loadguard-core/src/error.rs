//! Error types for loadguard core.

use thiserror::Error;

/// Core error type for guard construction and configuration.
///
/// Every variant is a setup failure: a running guard never produces one.
#[derive(Debug, Error)]
pub enum GuardError {
    /// No framework identifier was given.
    #[error("Configuration error: a framework identifier is required")]
    MissingFramework,

    /// The framework identifier is not one of the supported conventions.
    #[error("Configuration error: unsupported framework '{0}' (expected one of: http, middleware, router)")]
    UnsupportedFramework(String),

    /// Every threshold is zero, so overload could never be signalled.
    #[error("Configuration error: maxEventLoopDelay, maxHeapUsedBytes and maxRssBytes are all disabled")]
    AllThresholdsDisabled,

    /// The sampling interval must be positive.
    #[error("Configuration error: sampleInterval must be greater than zero")]
    InvalidSampleInterval,

    /// Per-request stats logging needs somewhere to log to.
    #[error("Configuration error: logStatsOnReq requires logging to be enabled")]
    StatsLoggingWithoutTarget,

    /// The logging option could not be interpreted.
    #[error("Configuration error: invalid logging option: {0}")]
    InvalidLogging(String),

    /// Config file could not be read.
    #[error("Config file error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed.
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Monitor error passthrough.
    #[error("Monitor error: {0}")]
    Monitor(#[from] loadguard_monitor::MonitorError),
}
