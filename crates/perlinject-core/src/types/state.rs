//! Injection session states.

use std::fmt;

/// Where an injection session is in its lifecycle.
///
/// ## State Transitions
///
/// - `Starting` → `Attached`: the debugger subprocess was launched
/// - `Attached` → `AwaitingResult`: event producers are running
/// - `AwaitingResult` → `Completed`: sentinel or end-of-stream on the channel
/// - `AwaitingResult` → `TimedOut`: timer fired with escalation disabled
/// - `AwaitingResult` → `Escalating`: timer fired with escalation enabled
/// - `Escalating` → `AwaitingResult`: a signal was sent, or the prompt asked to retry
/// - any active state → `Failed`: fatal debugger condition
/// - `Completed`/`TimedOut`/`Failed`/`Interrupted` → `Terminating` → `Done`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState
{
    /// Setup is done and the debugger is being launched
    Starting,
    /// The debugger is running against the target
    Attached,
    /// Waiting for the target to write to the channel
    AwaitingResult,
    /// The operator is being asked for a signal to send
    Escalating,
    /// The target reported completion
    Completed,
    /// No result arrived in time
    TimedOut,
    /// The operator aborted
    Interrupted,
    /// The debugger failed
    Failed,
    /// Resources are being released
    Terminating,
    /// Everything has been released
    Done,
}

impl SessionState
{
    /// Whether the multiplexer has reached a conclusion in this state.
    #[must_use]
    pub fn is_concluded(self) -> bool
    {
        matches!(
            self,
            Self::Completed | Self::TimedOut | Self::Interrupted | Self::Failed | Self::Terminating | Self::Done
        )
    }
}

impl fmt::Display for SessionState
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let name = match self {
            Self::Starting => "starting",
            Self::Attached => "attached",
            Self::AwaitingResult => "awaiting result",
            Self::Escalating => "escalating",
            Self::Completed => "completed",
            Self::TimedOut => "timed out",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
            Self::Terminating => "terminating",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}
