//! Debugger output watchers.
//!
//! gdb's stdout and stderr are each read line by line on their own task so
//! that a chatty stdout can never hide a permission failure on stderr. Every
//! line is logged at debug level. Lines on stderr are matched against
//! [`FATAL_PATTERNS`]; a match is reported once and the watcher keeps
//! draining so the debugger never blocks on a full pipe.
//!
//! Only the debugger's own streams are matched. Channel payload written by
//! the target is never inspected.

use perlinject_protocol::LineReader;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::events::{DebuggerStream, EventSender, SessionEvent};

/// Lower-case fragments that mean the injection cannot succeed.
pub const FATAL_PATTERNS: [&str; 3] = [
    "permission denied",
    "operation not permitted",
    // the target is not a perl interpreter (or its symbols are stripped)
    "no symbol \"pl_sig_pending\"",
];

/// Return the lower-cased line if it contains a fatal pattern.
#[must_use]
pub fn match_fatal(line: &str) -> Option<String>
{
    let lowered = line.to_lowercase();
    FATAL_PATTERNS
        .iter()
        .any(|pattern| lowered.contains(pattern))
        .then_some(lowered)
}

/// Spawn a watcher over one debugger output stream.
pub fn spawn_stream_watcher<R>(stream: DebuggerStream, source: R, events: EventSender) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = LineReader::new(source);
        let mut reported = false;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!("GDB {}: {line}", stream.as_str());
                    if stream != DebuggerStream::Stderr || reported {
                        continue;
                    }
                    if let Some(line) = match_fatal(&line) {
                        reported = true;
                        if events.send(SessionEvent::DebuggerFatal { line }).await.is_err() {
                            return;
                        }
                    }
                }
                Ok(None) => return,
                Err(err) => {
                    let _ = events
                        .send(SessionEvent::DebuggerStreamFailed {
                            stream,
                            reason: err.to_string(),
                        })
                        .await;
                    return;
                }
            }
        }
    })
}
