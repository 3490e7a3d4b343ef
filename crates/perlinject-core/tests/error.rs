//! Tests for error handling

use perlinject_core::error::{InjectError, InjectResult};
use perlinject_core::multiplexer::{Outcome, SessionReport};
use perlinject_utils::LocateError;

#[test]
fn test_target_not_found_display()
{
    let error = InjectError::TargetNotFound(12345);
    let message = format!("{}", error);
    assert!(message.contains("12345"));
    assert!(message.contains("not found"));
}

#[test]
fn test_debugger_fatal_display()
{
    let error = InjectError::DebuggerFatal("ptrace: operation not permitted.".to_string());
    let message = format!("{}", error);
    assert!(message.starts_with("GDB failed"));
    assert!(message.contains("operation not permitted"));
}

#[test]
fn test_stream_read_points_at_verbose()
{
    let error = InjectError::StreamRead {
        stream: "stderr".to_string(),
        reason: "broken pipe".to_string(),
    };
    let message = format!("{}", error);
    assert!(message.contains("stderr"));
    assert!(message.contains("--verbose"));
}

#[test]
fn test_locate_error_converts_to_binary_not_found()
{
    let error: InjectError = LocateError::NotFound { name: "gdb".to_string() }.into();
    assert!(matches!(error, InjectError::BinaryNotFound { ref name } if name == "gdb"));
    assert_eq!(error.to_string(), "couldn't find a 'gdb' executable");
}

#[test]
fn test_setup_classification()
{
    assert!(InjectError::TargetNotFound(1).is_setup());
    assert!(InjectError::ValidationFailed(String::new()).is_setup());
    assert!(InjectError::SetupFailed(String::new()).is_setup());
    assert!(!InjectError::Timeout.is_setup());
    assert!(!InjectError::DebuggerFatal(String::new()).is_setup());
}

#[test]
fn test_outcome_into_result()
{
    assert_eq!(Outcome::Success("x\n".to_string()).into_result().unwrap(), "x\n");
    assert!(matches!(Outcome::TimedOut.into_result(), Err(InjectError::Timeout)));
    assert!(matches!(Outcome::Interrupted.into_result(), Err(InjectError::Interrupted)));
    assert_eq!(Outcome::TimedOut.into_result().unwrap_err().to_string(), "GDB process timed out");
}

#[test]
fn test_setup_failure_report_has_no_partial_output()
{
    let report = SessionReport::setup_failure(InjectError::ValidationFailed("bad".to_string()));
    assert!(matches!(report.outcome, Outcome::ValidationFailed(_)));
    assert!(report.partial.is_empty());

    let report = SessionReport::setup_failure(InjectError::SetupFailed("no dir".to_string()));
    assert!(matches!(report.outcome, Outcome::SetupFailed(_)));
}

#[test]
fn test_result_type()
{
    // Test that InjectResult type is properly aliased
    let _result: InjectResult<()> = Ok(());
    let _error_result: InjectResult<()> = Err(InjectError::TargetNotFound(12345));
}
