//! Session event types and helpers.
//!
//! Every producer in a session (the channel reader, the two debugger stream
//! watchers, the debugger exit watcher and the interrupt listener) owns a
//! clone of one [`EventSender`]. The multiplexer owns the receiving end and is
//! the only place where events turn into state transitions.

use std::process::ExitStatus;

use perlinject_protocol::Frame;
use tokio::sync::mpsc;

/// Buffered events per session before producers start waiting.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Which debugger output stream a watcher reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebuggerStream
{
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

impl DebuggerStream
{
    /// `stdout` or `stderr`.
    #[must_use]
    pub fn as_str(self) -> &'static str
    {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Event delivered to the session multiplexer.
#[derive(Debug)]
pub enum SessionEvent
{
    /// A frame arrived on the communication channel.
    Channel(Frame),
    /// The channel reader stopped without seeing the sentinel.
    ChannelClosed
    {
        /// Read error text, or `None` for a clean end of stream.
        error: Option<String>,
    },
    /// A known-fatal line appeared on the debugger's stderr.
    DebuggerFatal
    {
        /// The offending line, lower-cased.
        line: String,
    },
    /// Reading one of the debugger's streams failed.
    DebuggerStreamFailed
    {
        /// Stream that failed.
        stream: DebuggerStream,
        /// I/O error text.
        reason: String,
    },
    /// The debugger process exited.
    DebuggerExited
    {
        /// Exit status, or `None` if it could not be collected.
        status: Option<ExitStatus>,
    },
    /// The operator pressed Ctrl+C outside of a prompt.
    OperatorInterrupt,
}

impl SessionEvent
{
    /// Human-readable description of the event.
    #[must_use]
    pub fn describe(&self) -> String
    {
        match self {
            Self::Channel(Frame::Data(line)) => format!("channel data ({} bytes)", line.len()),
            Self::Channel(Frame::End { .. }) => "channel sentinel".to_string(),
            Self::ChannelClosed { error: None } => "channel reached end of stream".to_string(),
            Self::ChannelClosed { error: Some(error) } => format!("channel read failed: {error}"),
            Self::DebuggerFatal { line } => format!("fatal debugger output: {line}"),
            Self::DebuggerStreamFailed { stream, reason } => {
                format!("reading debugger {} failed: {reason}", stream.as_str())
            }
            Self::DebuggerExited { status } => format!("debugger exited ({})", describe_status(*status)),
            Self::OperatorInterrupt => "operator interrupt".to_string(),
        }
    }
}

/// Format an optional exit status for messages.
#[must_use]
pub fn describe_status(status: Option<ExitStatus>) -> String
{
    match status {
        Some(status) => status.to_string(),
        None => "status unknown".to_string(),
    }
}

/// Sender side of the session event channel.
pub type EventSender = mpsc::Sender<SessionEvent>;
/// Receiver side of the session event channel.
pub type EventReceiver = mpsc::Receiver<SessionEvent>;

/// Create a new session event channel.
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver)
{
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}
