//! The per-request gate.
//!
//! [`Gate::decide`] is called once per inbound unit of work. It logs (if
//! configured), reads the verdict, and returns a [`GateDecision`]: let the
//! request through, reject it with a ready-made 503 [`Rejection`], or hand
//! an [`OverloadError`] to the caller's continuation.
//!
//! ## Decision flow
//!
//! ```text
//!  log_stats_on_req? ──yes──► emit LoadStats
//!         │
//!     overloaded? ──no──► Pass
//!         │yes
//!  emit summary (if logging)
//!         │
//!  error_propagation_mode? ──yes──► Propagate(OverloadError { 503, expose })
//!         │no
//!     Reject(Rejection { 503, Retry-After?, body })
//! ```
//!
//! The gate never fails: configuration problems are caught when the guard
//! is built.

use crate::adapter::OverloadResponse;
use crate::config::{GuardConfig, LogLevel, Logging};
use crate::verdict::{LoadStats, Sample, Thresholds};
use thiserror::Error;
use tracing::debug;

/// HTTP status used for every rejection.
pub const SERVICE_UNAVAILABLE: u16 = 503;

/// Body sent to clients in production mode.
pub const SERVICE_UNAVAILABLE_MESSAGE: &str = "Service Unavailable";

/// Header carrying the retry hint.
pub const RETRY_AFTER: &str = "Retry-After";

/// Something the gate reports to the logging target.
#[derive(Debug, Clone, Copy)]
pub enum GateEvent<'a> {
    /// Full stats, emitted on every check when `log_stats_on_req` is set.
    Stats(&'a LoadStats),
    /// Overload summary, emitted once per rejected check.
    Overloaded(&'a str),
}

/// A ready-to-write 503 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Response status.
    pub status: u16,
    /// `Retry-After` seconds, if any.
    pub retry_after_secs: Option<u64>,
    /// Response body.
    pub body: String,
}

impl Rejection {
    /// Writes status, headers and body into a response.
    pub fn write_to<R: OverloadResponse + ?Sized>(&self, response: &mut R) {
        response.set_status(self.status);
        if let Some(secs) = self.retry_after_secs {
            response.set_header(RETRY_AFTER, &secs.to_string());
        }
        response.set_body(&self.body);
    }
}

/// Overload signalled as an error value.
///
/// Produced in error-propagation mode and handed to the continuation; the
/// adapter decides how to render it. `expose` tells it whether the message
/// is safe to show to clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct OverloadError {
    status_code: u16,
    expose: bool,
    message: String,
    retry_after_secs: Option<u64>,
}

impl OverloadError {
    /// HTTP status, always 503.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Alias of [`status_code`](Self::status_code).
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status_code
    }

    /// Whether the message may be shown to clients.
    #[must_use]
    pub const fn expose(&self) -> bool {
        self.expose
    }

    /// The message: the overload summary, or the generic text in production.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// `Retry-After` seconds, if configured.
    #[must_use]
    pub const fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after_secs
    }

    /// Renders the error as the response a direct-write gate would send.
    #[must_use]
    pub fn to_rejection(&self) -> Rejection {
        Rejection {
            status: self.status_code,
            retry_after_secs: self.retry_after_secs,
            body: self.message.clone(),
        }
    }
}

impl From<OverloadError> for Rejection {
    fn from(err: OverloadError) -> Self {
        Self {
            status: err.status_code,
            retry_after_secs: err.retry_after_secs,
            body: err.message,
        }
    }
}

/// What the adapter should do with the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Not overloaded; run the application logic.
    Pass,
    /// Overloaded; write this response and stop.
    Reject(Rejection),
    /// Overloaded in error-propagation mode; hand this to the continuation.
    Propagate(OverloadError),
}

impl GateDecision {
    /// Returns `true` if the request may proceed.
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Returns `true` if the request was intercepted.
    #[must_use]
    pub fn is_intercepted(&self) -> bool {
        !self.is_pass()
    }
}

/// Emits a `tracing` event at a level chosen at runtime.
macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            LogLevel::Trace => tracing::trace!($($arg)+),
            LogLevel::Debug => tracing::debug!($($arg)+),
            LogLevel::Info => tracing::info!($($arg)+),
            LogLevel::Warn => tracing::warn!($($arg)+),
            LogLevel::Error => tracing::error!($($arg)+),
        }
    };
}

/// Request-time behaviour derived from a [`GuardConfig`].
#[derive(Debug, Clone)]
pub struct Gate {
    production: bool,
    error_propagation_mode: bool,
    client_retry_secs: u64,
    logging: Logging,
    log_stats_on_req: bool,
}

impl Gate {
    /// Captures the gate-related parts of a config.
    #[must_use]
    pub fn from_config(config: &GuardConfig) -> Self {
        Self {
            production: config.production,
            error_propagation_mode: config.error_propagation_mode,
            client_retry_secs: config.client_retry_secs,
            logging: config.logging.clone(),
            log_stats_on_req: config.log_stats_on_req,
        }
    }

    /// Decides what to do with one request given a fresh sample.
    pub fn decide(&self, sample: &Sample, thresholds: &Thresholds) -> GateDecision {
        let verdict = thresholds.evaluate(sample);

        if self.log_stats_on_req {
            let stats = LoadStats::new(sample, &verdict, thresholds);
            self.emit(&GateEvent::Stats(&stats));
        }

        let Some(summary) = verdict.summary() else {
            return GateDecision::Pass;
        };

        self.emit(&GateEvent::Overloaded(&summary));

        let message = if self.production {
            SERVICE_UNAVAILABLE_MESSAGE.to_string()
        } else {
            summary
        };
        let retry_after_secs = (self.client_retry_secs != 0).then_some(self.client_retry_secs);

        if self.error_propagation_mode {
            debug!(expose = !self.production, "propagating overload error");
            GateDecision::Propagate(OverloadError {
                status_code: SERVICE_UNAVAILABLE,
                expose: !self.production,
                message,
                retry_after_secs,
            })
        } else {
            GateDecision::Reject(Rejection {
                status: SERVICE_UNAVAILABLE,
                retry_after_secs,
                body: message,
            })
        }
    }

    /// Sends an event to the configured logging target.
    fn emit(&self, event: &GateEvent<'_>) {
        match &self.logging {
            Logging::Disabled => {}
            Logging::Callback(callback) => callback(event),
            Logging::Level(level) => match event {
                GateEvent::Stats(stats) => log_at!(
                    *level,
                    overload = stats.overload,
                    event_loop_overload = stats.event_loop_overload,
                    heap_used_overload = stats.heap_used_overload,
                    rss_overload = stats.rss_overload,
                    event_loop_delay_ms = stats.event_loop_delay,
                    max_event_loop_delay_ms = stats.max_event_loop_delay,
                    max_heap_used_bytes = stats.max_heap_used_bytes,
                    max_rss_bytes = stats.max_rss_bytes,
                    "load stats"
                ),
                GateEvent::Overloaded(summary) => log_at!(*level, "{}", summary),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadguard_monitor::MemoryUsage;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn rss_sample(rss: u64) -> Sample {
        Sample::new(Duration::ZERO, MemoryUsage::new(999, rss))
    }

    fn rss_limit() -> Thresholds {
        Thresholds::new(0, 0, 40)
    }

    fn gate(config: GuardConfig) -> Gate {
        Gate::from_config(&config)
    }

    #[test]
    fn test_pass_when_not_overloaded() {
        let decision = gate(GuardConfig::new()).decide(&rss_sample(10), &rss_limit());
        assert_eq!(decision, GateDecision::Pass);
        assert!(decision.is_pass());
    }

    #[test]
    fn test_reject_with_detail_and_retry() {
        let config = GuardConfig::new().with_client_retry_secs(22);
        let decision = gate(config).decide(&rss_sample(99_999), &rss_limit());

        let GateDecision::Reject(rejection) = decision else {
            panic!("expected rejection, got {decision:?}");
        };
        assert_eq!(rejection.status, 503);
        assert_eq!(rejection.retry_after_secs, Some(22));
        assert_eq!(rejection.body, "Server experiencing heavy load: (rss)");
    }

    #[test]
    fn test_zero_retry_omits_hint() {
        let config = GuardConfig::new().with_client_retry_secs(0);
        let decision = gate(config).decide(&rss_sample(99_999), &rss_limit());
        let GateDecision::Reject(rejection) = decision else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.retry_after_secs, None);
    }

    #[test]
    fn test_production_hides_detail() {
        let config = GuardConfig::new().with_production(true);
        let decision = gate(config).decide(&rss_sample(99_999), &rss_limit());
        let GateDecision::Reject(rejection) = decision else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.body, "Service Unavailable");
    }

    #[test]
    fn test_propagation_expose_follows_production() {
        for production in [false, true] {
            let config = GuardConfig::new()
                .with_error_propagation_mode(true)
                .with_production(production);
            let decision = gate(config).decide(&rss_sample(99_999), &rss_limit());

            let GateDecision::Propagate(err) = decision else {
                panic!("expected propagated error");
            };
            assert_eq!(err.status_code(), 503);
            assert_eq!(err.status(), 503);
            assert_eq!(err.expose(), !production);
        }
    }

    #[test]
    fn test_overload_error_renders_as_rejection() {
        let config = GuardConfig::new().with_error_propagation_mode(true);
        let GateDecision::Propagate(err) = gate(config).decide(&rss_sample(99_999), &rss_limit())
        else {
            panic!("expected propagated error");
        };

        assert_eq!(err.to_string(), "Server experiencing heavy load: (rss)");
        let rejection = err.to_rejection();
        assert_eq!(rejection, Rejection::from(err));
        assert_eq!(rejection.retry_after_secs, Some(1));
    }

    #[test]
    fn test_callback_gets_summary_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let config = GuardConfig::new().with_log_callback(move |event| {
            if let GateEvent::Overloaded(msg) = event {
                sink.lock().unwrap().push(msg.to_string());
            }
        });

        let g = gate(config);
        g.decide(&rss_sample(99_999), &rss_limit());
        g.decide(&rss_sample(10), &rss_limit());

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec!["Server experiencing heavy load: (rss)".to_string()]);
    }

    #[test]
    fn test_stats_logged_on_every_check() {
        let stats = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&stats);
        let config = GuardConfig::new()
            .with_log_stats_on_req(true)
            .with_log_callback(move |event| {
                if let GateEvent::Stats(s) = event {
                    sink.lock().unwrap().push(**s);
                }
            });

        let g = gate(config);
        g.decide(&rss_sample(10), &rss_limit());
        g.decide(&rss_sample(99_999), &rss_limit());

        let stats = stats.lock().unwrap();
        assert_eq!(stats.len(), 2);
        assert!(!stats[0].overload);
        assert!(stats[1].rss_overload);
        assert_eq!(stats[1].max_rss_bytes, 40);
    }

    #[test]
    fn test_level_logging_does_not_panic_without_subscriber() {
        let config = GuardConfig::new()
            .with_log_level(LogLevel::Warn)
            .with_log_stats_on_req(true);
        let decision = gate(config).decide(&rss_sample(99_999), &rss_limit());
        assert!(decision.is_intercepted());
    }

    /// Records `(level, message)` for every event.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<(tracing::Level, String)>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Captured {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            struct Message(String);

            impl tracing::field::Visit for Message {
                fn record_debug(
                    &mut self,
                    field: &tracing::field::Field,
                    value: &dyn std::fmt::Debug,
                ) {
                    if field.name() == "message" {
                        self.0 = format!("{value:?}");
                    }
                }
            }

            let mut message = Message(String::new());
            event.record(&mut message);
            self.0
                .lock()
                .unwrap()
                .push((*event.metadata().level(), message.0));
        }
    }

    fn capture(run: impl FnOnce()) -> Vec<(tracing::Level, String)> {
        use tracing_subscriber::layer::SubscriberExt;

        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry().with(captured.clone());
        tracing::subscriber::with_default(subscriber, run);

        let events = captured.0.lock().unwrap().clone();
        events
    }

    #[test]
    fn test_level_logging_emits_summary_at_level() {
        let g = gate(GuardConfig::new().with_log_level(LogLevel::Warn));
        let events = capture(|| {
            g.decide(&rss_sample(99_999), &rss_limit());
        });

        assert_eq!(
            events,
            vec![(
                tracing::Level::WARN,
                "Server experiencing heavy load: (rss)".to_string()
            )]
        );
    }

    #[test]
    fn test_level_logging_emits_stats_on_pass() {
        let g = gate(
            GuardConfig::new()
                .with_log_level(LogLevel::Info)
                .with_log_stats_on_req(true),
        );
        let events = capture(|| {
            g.decide(&rss_sample(10), &rss_limit());
            g.decide(&rss_sample(10), &rss_limit());
        });

        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|(level, msg)| *level == tracing::Level::INFO && msg == "load stats"));
    }

    #[test]
    fn test_disabled_logging_emits_nothing_from_gate() {
        let g = gate(GuardConfig::new());
        let events = capture(|| {
            g.decide(&rss_sample(99_999), &rss_limit());
        });
        assert!(events.is_empty());
    }
}
