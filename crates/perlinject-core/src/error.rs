//! # Error Types
//!
//! General error handling for injection sessions.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use perlinject_utils::LocateError;
use thiserror::Error;

/// Main error type for injection sessions
///
/// ## Error Categories
///
/// 1. **Setup errors** (never retried, no partial output): TargetNotFound,
///    InvalidTarget, BinaryNotFound, ValidationFailed, SetupFailed
/// 2. **Debugger errors** (returned with partial output): DebuggerLaunchFailed,
///    DebuggerFatal, DebuggerExited, StreamRead, ChannelRead
/// 3. **Wait errors**: Timeout, Interrupted
/// 4. **Escalation errors**: SignalSendFailed (logged, the prompt continues)
/// 5. **I/O errors**: Io
#[derive(Error, Debug)]
pub enum InjectError
{
    /// The target PID does not refer to a live process
    #[error("cannot inject to PID {0}: process not found")]
    TargetNotFound(u32),

    /// The target PID can never be injected into (PID 0, or ourselves)
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// The debugger or the validation interpreter could not be located
    #[error("couldn't find a '{name}' executable")]
    BinaryNotFound
    {
        /// Program that was searched for
        name: String,
    },

    /// The offline syntax check rejected the code
    ///
    /// Carries the interpreter's diagnostic text when one was produced.
    #[error("code to inject is invalid: {0}")]
    ValidationFailed(String),

    /// Provisioning the staging directory or named pipe failed
    #[error("setup failed: {0}")]
    SetupFailed(String),

    /// The debugger subprocess could not be started
    #[error("failed to launch debugger: {0}")]
    DebuggerLaunchFailed(String),

    /// A known-fatal message appeared on the debugger's stderr
    #[error("GDB failed: {0}")]
    DebuggerFatal(String),

    /// The debugger exited before the target finished writing
    #[error("debugger exited before the target finished ({0})")]
    DebuggerExited(String),

    /// Reading one of the debugger's output streams failed
    #[error("failed while reading GDB's {stream}: {reason}; use --verbose to see full output")]
    StreamRead
    {
        /// `stdout` or `stderr`
        stream: String,
        /// Underlying I/O error text
        reason: String,
    },

    /// Reading the communication channel failed
    #[error("failed while reading from the target: {0}")]
    ChannelRead(String),

    /// No result arrived within the session timeout
    #[error("GDB process timed out")]
    Timeout,

    /// The operator aborted the session
    #[error("Interrupted")]
    Interrupted,

    /// Delivering an escalation signal to the target failed
    #[error("failed to send signal {signal} to PID {pid}: {reason}")]
    SignalSendFailed
    {
        /// Target PID
        pid: u32,
        /// Signal number
        signal: i32,
        /// OS error text
        reason: String,
    },

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InjectError
{
    /// Whether this error belongs to the setup phase.
    ///
    /// Setup errors abort before the debugger is ever started.
    #[must_use]
    pub fn is_setup(&self) -> bool
    {
        matches!(
            self,
            Self::TargetNotFound(_)
                | Self::InvalidTarget(_)
                | Self::BinaryNotFound { .. }
                | Self::ValidationFailed(_)
                | Self::SetupFailed(_)
                | Self::Io(_)
        )
    }
}

impl From<LocateError> for InjectError
{
    fn from(err: LocateError) -> Self
    {
        match err {
            LocateError::NotFound { name } => Self::BinaryNotFound { name },
        }
    }
}

/// Convenience type alias for `Result<T, InjectError>`
///
/// ```rust
/// use perlinject_core::error::InjectResult;
/// fn foo() -> InjectResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type InjectResult<T> = std::result::Result<T, InjectError>;
