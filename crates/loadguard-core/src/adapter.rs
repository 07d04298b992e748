//! Framework adapters.
//!
//! Request-handling code calls the gate in one of three conventions, chosen
//! by identifier when [`protect`] is called:
//!
//! | Identifier | Convention | Entry point |
//! |------------|------------|-------------|
//! | `http` | Handler owns the response and returns early when intercepted | [`Protection::intercept`] |
//! | `middleware` | Gate awaits the downstream future only when passing | [`Protection::middleware`] |
//! | `router` | Continuation is told to proceed, halt, or handle an error | [`Protection::intercept_with`] |
//!
//! All three share the same [`Gate`]; only the hand-off differs.

use crate::{
    config::GuardConfig,
    error::GuardError,
    gate::{Gate, GateDecision, OverloadError},
    guard::{Collaborators, LoadGuard},
    Result,
};

use std::future::Future;
use std::str::FromStr;
use tracing::info;

/// Supported calling conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Framework {
    /// Raw socket server handler.
    Http,
    /// Async middleware chain.
    Middleware,
    /// Callback-style router.
    Router,
}

impl Framework {
    /// All supported conventions.
    pub const ALL: [Framework; 3] = [Framework::Http, Framework::Middleware, Framework::Router];

    /// Identifier accepted by [`protect`].
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Middleware => "middleware",
            Self::Router => "router",
        }
    }
}

impl std::fmt::Display for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Framework {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(GuardError::MissingFramework);
        }
        Self::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| GuardError::UnsupportedFramework(s.to_string()))
    }
}

/// A response the gate can write a rejection into.
pub trait OverloadResponse {
    /// Sets the status code.
    fn set_status(&mut self, status: u16);

    /// Sets a header, replacing any previous value.
    fn set_header(&mut self, name: &str, value: &str);

    /// Replaces the body.
    fn set_body(&mut self, body: &str);
}

/// Plain in-memory response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code.
    pub status: u16,
    /// Headers in insertion order.
    pub headers: Vec<(String, String)>,
    /// Body text.
    pub body: String,
}

impl Response {
    /// Creates an empty `200` response.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Looks up a header, ignoring ASCII case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Serializes the response as an HTTP/1.1 message.
    #[must_use]
    pub fn to_http1(&self) -> String {
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status));
        for (name, value) in &self.headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        out.push_str("Connection: close\r\n\r\n");
        out.push_str(&self.body);
        out
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl OverloadResponse for Response {
    fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn set_body(&mut self, body: &str) {
        self.body = body.to_string();
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "",
    }
}

/// Instruction passed to a router continuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// Run the next handler.
    Proceed,
    /// A rejection was written; stop the chain.
    Halt,
    /// Overloaded in error-propagation mode; handle the error.
    Fail(OverloadError),
}

/// An installed gate plus the guard behind it.
///
/// Dropping it stops sampling; [`stop`](Self::stop) does so explicitly.
#[derive(Debug)]
pub struct Protection {
    guard: LoadGuard,
    gate: Gate,
    framework: Framework,
}

impl Protection {
    /// Runs one gate check.
    pub fn check(&self) -> GateDecision {
        self.gate.decide(&self.guard.sample(), &self.guard.thresholds())
    }

    /// Direct style: writes any rejection into `response`.
    ///
    /// Returns `true` when the request was intercepted. With no
    /// continuation to hand it to, a propagated error is rendered too.
    ///
    /// Entry point of the `http` convention; debug builds assert it.
    pub fn intercept<R: OverloadResponse + ?Sized>(&self, response: &mut R) -> bool {
        self.expect_convention(Framework::Http, "intercept");
        match self.check() {
            GateDecision::Pass => false,
            GateDecision::Reject(rejection) => {
                rejection.write_to(response);
                true
            }
            GateDecision::Propagate(err) => {
                err.to_rejection().write_to(response);
                true
            }
        }
    }

    /// Callback style.
    ///
    /// `next` receives [`Next::Proceed`] on pass and [`Next::Fail`] in
    /// error-propagation mode. After a written rejection only the router
    /// convention is told to [`Next::Halt`]; the others never see `next`.
    pub fn intercept_with<R, F>(&self, response: &mut R, next: F) -> bool
    where
        R: OverloadResponse + ?Sized,
        F: FnOnce(Next),
    {
        match self.check() {
            GateDecision::Pass => {
                next(Next::Proceed);
                false
            }
            GateDecision::Propagate(err) => {
                next(Next::Fail(err));
                true
            }
            GateDecision::Reject(rejection) => {
                rejection.write_to(response);
                if self.framework == Framework::Router {
                    next(Next::Halt);
                }
                true
            }
        }
    }

    /// Middleware-chain style.
    ///
    /// Awaits `next` only when passing. Entry point of the `middleware`
    /// convention; debug builds assert it.
    ///
    /// # Errors
    ///
    /// Returns the [`OverloadError`] in error-propagation mode so the
    /// upstream middleware can render it.
    pub async fn middleware<R, Fut>(
        &self,
        response: &mut R,
        next: Fut,
    ) -> std::result::Result<(), OverloadError>
    where
        R: OverloadResponse + ?Sized,
        Fut: Future<Output = ()>,
    {
        self.expect_convention(Framework::Middleware, "middleware");
        match self.check() {
            GateDecision::Pass => {
                next.await;
                Ok(())
            }
            GateDecision::Reject(rejection) => {
                rejection.write_to(response);
                Ok(())
            }
            GateDecision::Propagate(err) => Err(err),
        }
    }

    /// Stops the guard. Calling it again has no effect.
    pub fn stop(&self) {
        self.guard.stop();
    }

    /// The guard, for introspection.
    #[must_use]
    pub fn guard(&self) -> &LoadGuard {
        &self.guard
    }

    /// The calling convention in use.
    #[must_use]
    pub const fn framework(&self) -> Framework {
        self.framework
    }

    fn expect_convention(&self, expected: Framework, entry: &str) {
        debug_assert_eq!(
            self.framework, expected,
            "`{entry}` belongs to the `{expected}` convention, installed as `{}`",
            self.framework
        );
    }
}

/// Builds a guard on the current tokio runtime and installs its gate.
///
/// # Errors
///
/// Fails for an empty or unsupported framework identifier, an invalid
/// configuration, or when called outside a tokio runtime.
///
/// # Example
///
/// ```rust,no_run
/// use loadguard_core::{protect, GuardConfig, Response};
///
/// # async fn run() -> loadguard_core::Result<()> {
/// let protection = protect("http", GuardConfig::new().with_client_retry_secs(10))?;
///
/// let mut response = Response::new();
/// if !protection.intercept(&mut response) {
///     response.body = "content".into();
/// }
/// protection.stop();
/// # Ok(())
/// # }
/// ```
pub fn protect(framework: &str, config: GuardConfig) -> Result<Protection> {
    let framework: Framework = framework.parse()?;
    config.validate()?;
    install(framework, config, Collaborators::system()?)
}

/// Like [`protect`], on explicit collaborators.
///
/// # Errors
///
/// Fails for an empty or unsupported framework identifier or an invalid
/// configuration.
pub fn protect_with(
    framework: &str,
    config: GuardConfig,
    collaborators: Collaborators,
) -> Result<Protection> {
    install(framework.parse()?, config, collaborators)
}

fn install(
    framework: Framework,
    config: GuardConfig,
    collaborators: Collaborators,
) -> Result<Protection> {
    let gate = Gate::from_config(&config);
    let guard = LoadGuard::with_collaborators(config, collaborators)?;
    info!(framework = %framework, "overload protection installed");
    Ok(Protection {
        guard,
        gate,
        framework,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateEvent;
    use loadguard_monitor::{ManualClock, ManualMemoryReader, ManualTicker};
    use std::sync::Arc;

    fn overloaded(framework: &str, config: GuardConfig) -> (Protection, ManualMemoryReader) {
        let memory = ManualMemoryReader::new(0, 99_999);
        let protection = protect_with(
            framework,
            config.with_max_rss_bytes(40),
            Collaborators {
                clock: Arc::new(ManualClock::new()),
                ticker: Arc::new(ManualTicker::new()),
                memory: Arc::new(memory.clone()),
            },
        )
        .unwrap();
        (protection, memory)
    }

    fn collaborators() -> Collaborators {
        Collaborators {
            clock: Arc::new(ManualClock::new()),
            ticker: Arc::new(ManualTicker::new()),
            memory: Arc::new(ManualMemoryReader::default()),
        }
    }

    #[test]
    fn test_framework_parse() {
        assert_eq!("http".parse::<Framework>().unwrap(), Framework::Http);
        assert_eq!("middleware".parse::<Framework>().unwrap(), Framework::Middleware);
        assert_eq!("router".parse::<Framework>().unwrap(), Framework::Router);
    }

    #[test]
    fn test_missing_framework() {
        let result = protect_with("", GuardConfig::new(), collaborators());
        assert!(matches!(result, Err(GuardError::MissingFramework)));
    }

    #[test]
    fn test_unsupported_framework() {
        let result = protect_with("connect", GuardConfig::new(), collaborators());
        match result {
            Err(GuardError::UnsupportedFramework(name)) => assert_eq!(name, "connect"),
            other => panic!("expected UnsupportedFramework, got {other:?}"),
        }
    }

    #[test]
    fn test_protect_outside_runtime_fails() {
        assert!(matches!(
            protect("http", GuardConfig::new()),
            Err(GuardError::Monitor(_))
        ));
    }

    #[test]
    fn test_intercept_writes_rejection() {
        let (protection, memory) =
            overloaded("http", GuardConfig::new().with_client_retry_secs(22));

        let mut res = Response::new();
        assert!(protection.intercept(&mut res));
        assert_eq!(res.status, 503);
        assert_eq!(res.header("retry-after"), Some("22"));
        assert_eq!(res.body, "Server experiencing heavy load: (rss)");

        memory.set_rss(10);
        let mut res = Response::new();
        assert!(!protection.intercept(&mut res));
        assert_eq!(res.status, 200);
        assert_eq!(res.header("Retry-After"), None);
    }

    #[test]
    fn test_intercept_renders_propagated_error() {
        let (protection, _) = overloaded(
            "http",
            GuardConfig::new()
                .with_error_propagation_mode(true)
                .with_production(true),
        );
        let mut res = Response::new();
        assert!(protection.intercept(&mut res));
        assert_eq!(res.status, 503);
        assert_eq!(res.body, "Service Unavailable");
    }

    #[test]
    fn test_router_halts_after_rejection() {
        let (protection, _) = overloaded("router", GuardConfig::new());
        let mut seen = None;
        let mut res = Response::new();
        assert!(protection.intercept_with(&mut res, |next| seen = Some(next)));
        assert_eq!(seen, Some(Next::Halt));
        assert_eq!(res.status, 503);
    }

    #[test]
    fn test_http_callback_not_invoked_after_rejection() {
        let (protection, _) = overloaded("http", GuardConfig::new());
        let mut called = false;
        let mut res = Response::new();
        assert!(protection.intercept_with(&mut res, |_| called = true));
        assert!(!called);
    }

    #[test]
    fn test_callback_proceeds_on_pass() {
        let (protection, memory) = overloaded("router", GuardConfig::new());
        memory.set_rss(1);
        let mut seen = None;
        let mut res = Response::new();
        assert!(!protection.intercept_with(&mut res, |next| seen = Some(next)));
        assert_eq!(seen, Some(Next::Proceed));
    }

    #[test]
    fn test_callback_receives_error() {
        let (protection, _) = overloaded(
            "router",
            GuardConfig::new().with_error_propagation_mode(true),
        );
        let mut seen = None;
        let mut res = Response::new();
        assert!(protection.intercept_with(&mut res, |next| seen = Some(next)));

        let Some(Next::Fail(err)) = seen else {
            panic!("expected Next::Fail");
        };
        assert_eq!(err.status_code(), 503);
        assert!(err.expose());
        // Nothing written in error-propagation mode.
        assert_eq!(res.status, 200);
    }

    #[tokio::test]
    async fn test_middleware_skips_downstream_when_rejecting() {
        let (protection, memory) = overloaded("middleware", GuardConfig::new());

        let mut ran = false;
        let mut res = Response::new();
        protection
            .middleware(&mut res, async { ran = true })
            .await
            .unwrap();
        assert!(!ran);
        assert_eq!(res.status, 503);

        memory.set_rss(1);
        let mut res = Response::new();
        protection
            .middleware(&mut res, async { ran = true })
            .await
            .unwrap();
        assert!(ran);
        assert_eq!(res.status, 200);
    }

    #[tokio::test]
    async fn test_middleware_propagates_error() {
        let (protection, _) = overloaded(
            "middleware",
            GuardConfig::new()
                .with_error_propagation_mode(true)
                .with_production(true),
        );
        let mut res = Response::new();
        let err = protection
            .middleware(&mut res, async {})
            .await
            .unwrap_err();
        assert!(!err.expose());
        assert_eq!(err.message(), "Service Unavailable");
    }

    #[test]
    fn test_logging_callback_through_protection() {
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let sink = Arc::clone(&count);
        let (protection, _) = overloaded(
            "http",
            GuardConfig::new().with_log_callback(move |event| {
                if matches!(event, GateEvent::Overloaded(_)) {
                    sink.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                }
            }),
        );
        protection.intercept(&mut Response::new());
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_forwards_to_guard() {
        let (protection, _) = overloaded("http", GuardConfig::new());
        assert_eq!(protection.framework(), Framework::Http);
        protection.stop();
        protection.stop();
        assert!(!protection.guard().is_running());
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "belongs to the `http` convention")]
    fn test_intercept_requires_http_convention() {
        let (protection, _) = overloaded("router", GuardConfig::new());
        protection.intercept(&mut Response::new());
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    #[should_panic(expected = "belongs to the `middleware` convention")]
    async fn test_middleware_requires_middleware_convention() {
        let (protection, _) = overloaded("http", GuardConfig::new());
        let _ = protection.middleware(&mut Response::new(), async {}).await;
    }

    #[test]
    fn test_to_http1() {
        let mut res = Response::new();
        res.set_status(503);
        res.set_header("Retry-After", "5");
        res.set_body("busy");
        let wire = res.to_http1();
        assert!(wire.starts_with("HTTP/1.1 503 Service Unavailable\r\n"));
        assert!(wire.contains("Retry-After: 5\r\n"));
        assert!(wire.ends_with("\r\n\r\nbusy"));
    }
}
