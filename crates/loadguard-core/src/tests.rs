//! Unit tests for loadguard-core.

#[test]
fn test_crate_structure() {
    // Smoke test - verifies the public surface fits together
    use crate::{Framework, GateDecision, GuardConfig, LogLevel, Logging, Response, Verdict};

    let _config = GuardConfig::default().with_logging(Logging::Level(LogLevel::Info));
    let _verdict = Verdict::from_flags(false, false, false);
    let _decision = GateDecision::Pass;
    let _response = Response::default();
    assert_eq!(Framework::ALL.len(), 3);
}
