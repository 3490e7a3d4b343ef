//! Process identifiers.

use std::fmt;

use nix::unistd::Pid;

/// Process identifier (PID)
///
/// Wrapping the raw number keeps "the target" and "some integer" apart in
/// signatures, and gives one place to convert to the `nix` representation
/// used for signalling.
///
/// ## Example
///
/// ```rust
/// use perlinject_core::types::ProcessId;
///
/// let pid = ProcessId::from(12345);
/// assert_eq!(pid.raw(), 12345);
/// assert_eq!(pid.to_string(), "12345");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub u32);

impl ProcessId
{
    /// PID of the running orchestrator.
    #[must_use]
    pub fn current() -> Self
    {
        Self(std::process::id())
    }

    /// Get the raw `u32` value.
    #[must_use]
    pub fn raw(self) -> u32
    {
        self.0
    }

    /// Convert to a `nix` PID for signalling.
    ///
    /// Values above `i32::MAX` cannot name a real process; they saturate so
    /// that signalling them fails instead of targeting a process group.
    #[must_use]
    pub fn as_nix(self) -> Pid
    {
        Pid::from_raw(i32::try_from(self.0).unwrap_or(i32::MAX))
    }
}

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}
