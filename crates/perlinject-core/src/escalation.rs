//! # Escalation
//!
//! When the target does not report back in time and a signal catalog is
//! configured, the operator is asked for a signal to send to the target.
//! A target blocked in a system call often returns to its interpreter loop
//! once interrupted, which lets the pending injection run.
//!
//! This module holds the pieces the session multiplexer needs without
//! depending on a terminal:
//!
//! - [`parse_selection`]: pure interpretation of one line of operator input
//! - [`EscalationPrompter`]: the blocking prompt, implemented by the UI crate
//! - [`SignalSender`]: signal delivery, implemented for the host by [`KillSender`]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::sys::signal::{self, Signal};

use crate::error::{InjectError, InjectResult};
use crate::signals::SignalCatalog;
use crate::types::ProcessId;

/// Shown once when escalation starts.
pub const ESCALATION_BANNER: &str = "The target process is not responding. Send a signal to try to wake it up, or press CTRL+C to abort.\nWARNING: Waking a process with a signal will almost certainly crash it after debug output is acquired.";

/// Shown with the banner and after invalid input.
pub const SIGNAL_HELP: &str = "Type a case-insensitive signal name or number ('sigint', 'INT', and '2' are equivalent), or 'L'/'?' to list available signals.";

/// Prompt text for one line of input.
pub const SIGNAL_PROMPT: &str = "Signal name, number, 'L' or '?': ";

/// Interpretation of one line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection
{
    /// Nothing was typed
    Empty,
    /// `L` or `?`: show the catalog
    List,
    /// `abort` or `quit`
    Abort,
    /// A signal from the catalog
    Signal(i32),
    /// Anything else, trimmed
    Invalid(String),
}

/// Interpret one line of operator input against `catalog`.
#[must_use]
pub fn parse_selection(input: &str, catalog: &SignalCatalog) -> Selection
{
    let trimmed = input.trim();
    let line = trimmed.to_ascii_uppercase();
    match line.as_str() {
        "" => Selection::Empty,
        "L" | "?" => Selection::List,
        "ABORT" | "QUIT" => Selection::Abort,
        _ => match catalog.resolve(&line) {
            Some(number) => Selection::Signal(number),
            None => Selection::Invalid(trimmed.to_string()),
        },
    }
}

/// Result of one bounded prompt attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome
{
    /// Send this signal to the target
    Signal(i32),
    /// The attempt window passed without a decision; wait another timeout
    Retry,
    /// Input did not name a signal; ask again right away
    Invalid(String),
    /// Give up on the session
    Abort,
}

/// Tells a prompt attempt in flight that the session has concluded.
///
/// Clones share one flag. Once cancelled it stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct PromptCancel(Arc<AtomicBool>);

impl PromptCancel
{
    /// A flag that is not yet cancelled.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Ask the prompt to return as soon as it can.
    pub fn cancel(&self)
    {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether [`PromptCancel::cancel`] has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool
    {
        self.0.load(Ordering::SeqCst)
    }
}

/// Blocking operator prompt.
///
/// The multiplexer runs each call on a blocking thread and gets the prompter
/// back afterwards, so implementations own their terminal state across
/// attempts. Each call must return within a bounded window so the session
/// never waits on the terminal forever, and must check `cancel` often: the
/// session waits for a cancelled attempt to return before it reports, so any
/// terminal state the attempt changed is restored first. The answer of a
/// cancelled attempt is ignored.
pub trait EscalationPrompter: Send
{
    /// Ask once for a signal.
    fn prompt(&mut self, catalog: &SignalCatalog, cancel: &PromptCancel) -> PromptOutcome;
}

/// Delivers escalation signals to the target.
pub trait SignalSender: Send + Sync
{
    /// Send `signal` to `pid`.
    ///
    /// ## Errors
    ///
    /// Returns [`InjectError::SignalSendFailed`] when delivery fails.
    fn send(&self, pid: ProcessId, signal: i32) -> InjectResult<()>;
}

/// [`SignalSender`] backed by `kill(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct KillSender;

impl SignalSender for KillSender
{
    fn send(&self, pid: ProcessId, number: i32) -> InjectResult<()>
    {
        let failed = |reason: String| InjectError::SignalSendFailed {
            pid: pid.raw(),
            signal: number,
            reason,
        };

        let signal = Signal::try_from(number).map_err(|errno| failed(errno.desc().to_string()))?;
        signal::kill(pid.as_nix(), signal).map_err(|errno| failed(errno.desc().to_string()))
    }
}
