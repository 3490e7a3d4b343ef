//! # Code Validation
//!
//! Injected code is checked offline before the target is touched, because a
//! failed live injection cannot be retried cleanly: the target may already
//! be paused at a breakpoint.
//!
//! Validation has two stages:
//!
//! 1. [`check_shape`]: reject empty code and code containing `"`. The wrapper
//!    is embedded in a double-quoted debugger expression, so a quote would
//!    end that expression early.
//! 2. [`syntax_check`]: render the real wrapper around the code, pointed at a
//!    discard destination, and run `perl -Mstrict -Mwarnings -c` on exactly
//!    the text the debugger will hand to the interpreter.
//!
//! Both stages are skipped with `force`.

use std::io::Write;
use std::path::Path;
use std::process::Stdio;

use perlinject_protocol::{render_wrapper, Sentinel, DISCARD_DESTINATION};
use tokio::process::Command;
use tracing::debug;

use crate::command::evaluated_text;
use crate::error::{InjectError, InjectResult};
use crate::types::ProcessId;

/// Suffix `perl -c` prints on stderr when the check passes.
const SYNTAX_OK: &str = "syntax OK";

/// Structural checks that need no interpreter.
///
/// ## Errors
///
/// Returns [`InjectError::ValidationFailed`] for empty code or code containing `"`.
pub fn check_shape(code: &str) -> InjectResult<()>
{
    if code.trim().is_empty() {
        return Err(InjectError::ValidationFailed(
            "contains no data (use --force to override)".to_string(),
        ));
    }
    if code.contains('"') {
        return Err(InjectError::ValidationFailed(
            "double quotation marks are not allowed (use --force to override)".to_string(),
        ));
    }
    Ok(())
}

/// Syntax-check `code` inside the injection wrapper with the interpreter at `perl`.
///
/// A nonzero exit status, or anything on stderr other than the "syntax OK"
/// line, fails validation with the captured diagnostics.
///
/// ## Errors
///
/// - [`InjectError::ValidationFailed`]: the interpreter rejected the code
/// - [`InjectError::Io`]: the scratch file could not be written or the
///   interpreter could not be started
pub async fn syntax_check(code: &str, perl: &Path) -> InjectResult<()>
{
    let sentinel = Sentinel::from_token(ProcessId::current().to_string());
    let wrapped = evaluated_text(&render_wrapper(code.trim(), Path::new(DISCARD_DESTINATION), &sentinel));
    debug!(%wrapped, "syntax checking code to inject");

    let mut script = tempfile::Builder::new()
        .prefix("perlinject-selftest-")
        .suffix(".pl")
        .tempfile()?;
    script.write_all(wrapped.as_bytes())?;
    script.flush()?;

    let output = Command::new(perl)
        .arg("-Mstrict")
        .arg("-Mwarnings")
        .arg("-c")
        .arg(script.path())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    let diagnostics: Vec<&str> = stderr
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.trim_end().ends_with(SYNTAX_OK))
        .collect();

    if !output.status.success() || !diagnostics.is_empty() {
        let detail = if diagnostics.is_empty() {
            format!("interpreter exited with {}", output.status)
        } else {
            diagnostics.join("\n")
        };
        return Err(InjectError::ValidationFailed(format!(
            "tests failed (use --force to override): {detail}"
        )));
    }

    debug!("syntax check passed");
    Ok(())
}
