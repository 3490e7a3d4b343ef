//! # Session Multiplexer
//!
//! The coordination point of an injection session. Producers (channel
//! reader, debugger stream watchers, debugger supervisor, interrupt listener)
//! push [`SessionEvent`]s into one channel; the multiplexer owns the receiver,
//! the timeout timer and the escalation prompt, and is the only place where
//! the session state changes or the result buffer grows.
//!
//! ## Rules
//!
//! - Channel data is appended to the result. It never resets the timer.
//! - The sentinel, or a clean end of stream, concludes with `Success`.
//! - A fatal line on the debugger's stderr concludes with `DebuggerFailed`.
//! - The timer firing without a signal catalog concludes with `TimedOut`.
//! - With a catalog, the timer firing starts an escalation prompt:
//!   - a signal is sent and the timer re-armed; a failed send prompts again
//!   - "retry" re-arms the timer and prompts again on the next expiry
//!   - invalid input prompts again at once, leaving the timer alone
//!   - "abort" concludes with `Interrupted`
//! - If the debugger exits first, the channel gets [`DEBUGGER_EXIT_GRACE`]
//!   (never past the armed timer) to deliver the sentinel before the session
//!   fails.
//!
//! The prompt runs on a blocking thread. The multiplexer hands the prompter
//! over for one attempt and gets it back with the answer, so terminal state
//! lives in one owner for the whole session. If the session concludes while
//! an attempt is running, the attempt is cancelled and awaited (for at most
//! [`PROMPT_CANCEL_GRACE`]) before the report is returned.

use std::fmt;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use perlinject_protocol::Frame;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::error::InjectError;
use crate::escalation::{EscalationPrompter, KillSender, PromptCancel, PromptOutcome, SignalSender};
use crate::events::{describe_status, EventReceiver, SessionEvent};
use crate::signals::SignalCatalog;
use crate::types::{ProcessId, SessionState};

/// How long the channel may still deliver after the debugger exits.
pub const DEBUGGER_EXIT_GRACE: Duration = Duration::from_secs(1);

/// How long a cancelled prompt attempt may take to return.
pub const PROMPT_CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Final result of a session.
#[derive(Debug)]
pub enum Outcome
{
    /// The target reported back; carries everything it wrote
    Success(String),
    /// Nothing conclusive arrived before the timer fired
    TimedOut,
    /// The operator aborted
    Interrupted,
    /// The debugger failed or exited early
    DebuggerFailed(InjectError),
    /// The code was rejected before the target was contacted
    ValidationFailed(InjectError),
    /// Resources could not be provisioned
    SetupFailed(InjectError),
}

impl Outcome
{
    /// Map a setup-phase error onto the matching outcome.
    #[must_use]
    pub fn from_setup_error(err: InjectError) -> Self
    {
        match err {
            InjectError::ValidationFailed(_) => Self::ValidationFailed(err),
            _ => Self::SetupFailed(err),
        }
    }

    /// Whether this is [`Outcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool
    {
        matches!(self, Self::Success(_))
    }

    /// Session state this outcome concludes in.
    #[must_use]
    pub fn state(&self) -> SessionState
    {
        match self {
            Self::Success(_) => SessionState::Completed,
            Self::TimedOut => SessionState::TimedOut,
            Self::Interrupted => SessionState::Interrupted,
            Self::DebuggerFailed(_) | Self::ValidationFailed(_) | Self::SetupFailed(_) => SessionState::Failed,
        }
    }

    /// Captured text on success, otherwise the error.
    ///
    /// ## Errors
    ///
    /// Every outcome other than `Success` maps to its [`InjectError`].
    pub fn into_result(self) -> Result<String, InjectError>
    {
        match self {
            Self::Success(text) => Ok(text),
            Self::TimedOut => Err(InjectError::Timeout),
            Self::Interrupted => Err(InjectError::Interrupted),
            Self::DebuggerFailed(err) | Self::ValidationFailed(err) | Self::SetupFailed(err) => Err(err),
        }
    }
}

impl fmt::Display for Outcome
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Success(text) => write!(f, "success ({} bytes)", text.len()),
            Self::TimedOut => f.write_str("timed out"),
            Self::Interrupted => f.write_str("interrupted"),
            Self::DebuggerFailed(err) => write!(f, "debugger failed: {err}"),
            Self::ValidationFailed(err) => write!(f, "validation failed: {err}"),
            Self::SetupFailed(err) => write!(f, "setup failed: {err}"),
        }
    }
}

/// Counters collected while multiplexing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats
{
    /// Prompt attempts started
    pub prompts: u32,
    /// Signals delivered to the target
    pub signals_sent: u32,
    /// Times the timer was re-armed
    pub timer_rearms: u32,
    /// Payload lines received
    pub lines: usize,
}

/// Outcome plus whatever output accumulated on the way.
#[derive(Debug)]
pub struct SessionReport
{
    /// How the session ended
    pub outcome: Outcome,
    /// Output received from the target, also on failure
    pub partial: String,
    /// Counters
    pub stats: SessionStats,
}

impl SessionReport
{
    /// Report for a session that never got past setup.
    #[must_use]
    pub fn setup_failure(err: InjectError) -> Self
    {
        Self {
            outcome: Outcome::from_setup_error(err),
            partial: String::new(),
            stats: SessionStats::default(),
        }
    }

    /// See [`Outcome::into_result`].
    ///
    /// ## Errors
    ///
    /// Every outcome other than `Success` maps to its [`InjectError`].
    pub fn into_result(self) -> Result<String, InjectError>
    {
        self.outcome.into_result()
    }
}

type PromptTask = JoinHandle<(PromptOutcome, Box<dyn EscalationPrompter>)>;

/// Event loop for one session.
pub struct Multiplexer
{
    target: ProcessId,
    timeout: Duration,
    catalog: Arc<SignalCatalog>,
    prompter: Option<Box<dyn EscalationPrompter>>,
    sender: Arc<dyn SignalSender>,
    exit_grace: Duration,

    state: SessionState,
    buffer: String,
    stats: SessionStats,
    deadline: Instant,
    timer_armed: bool,
    prompt_task: Option<PromptTask>,
    cancel: PromptCancel,
    grace_deadline: Option<Instant>,
    exit_status: Option<ExitStatus>,
}

impl Multiplexer
{
    /// Multiplexer for a session against `target` with the given timeout.
    ///
    /// Escalation is disabled until [`Multiplexer::with_escalation`] is used.
    #[must_use]
    pub fn new(target: ProcessId, timeout: Duration) -> Self
    {
        Self {
            target,
            timeout,
            catalog: Arc::new(SignalCatalog::default()),
            prompter: None,
            sender: Arc::new(KillSender),
            exit_grace: DEBUGGER_EXIT_GRACE,
            state: SessionState::Attached,
            buffer: String::new(),
            stats: SessionStats::default(),
            deadline: Instant::now() + timeout,
            timer_armed: false,
            prompt_task: None,
            cancel: PromptCancel::new(),
            grace_deadline: None,
            exit_status: None,
        }
    }

    /// Enable escalation. An empty catalog leaves it disabled.
    #[must_use]
    pub fn with_escalation(mut self, catalog: SignalCatalog, prompter: Box<dyn EscalationPrompter>) -> Self
    {
        self.catalog = Arc::new(catalog);
        self.prompter = Some(prompter);
        self
    }

    /// Replace the signal sender.
    #[must_use]
    pub fn with_signal_sender(mut self, sender: Arc<dyn SignalSender>) -> Self
    {
        self.sender = sender;
        self
    }

    /// Replace [`DEBUGGER_EXIT_GRACE`].
    #[must_use]
    pub fn with_exit_grace(mut self, grace: Duration) -> Self
    {
        self.exit_grace = grace;
        self
    }

    fn escalation_enabled(&self) -> bool
    {
        !self.catalog.is_empty() && (self.prompter.is_some() || self.prompt_task.is_some())
    }

    /// Consume events until the session concludes.
    pub async fn run(mut self, mut events: EventReceiver) -> SessionReport
    {
        self.transition(SessionState::AwaitingResult);
        self.arm_timer();
        let mut events_open = true;

        let outcome = loop {
            tokio::select! {
                biased;

                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        if let Some(outcome) = self.handle_event(event) {
                            break outcome;
                        }
                    }
                    None => {
                        debug!("all event producers are gone; waiting on the timer");
                        events_open = false;
                    }
                },
                () = sleep_until(self.deadline), if self.timer_armed && self.prompt_task.is_none() => {
                    self.timer_armed = false;
                    if let Some(outcome) = self.on_timeout() {
                        break outcome;
                    }
                },
                joined = join_prompt(&mut self.prompt_task), if self.prompt_task.is_some() => {
                    self.prompt_task = None;
                    if let Some(outcome) = self.on_prompt_finished(joined) {
                        break outcome;
                    }
                },
                () = wait_until(self.grace_deadline), if self.grace_deadline.is_some() => {
                    break self.on_grace_expired();
                },
                else => break Outcome::TimedOut,
            }
        };

        self.cancel_prompt().await;
        self.transition(outcome.state());
        debug!("session concluded: {outcome}");
        SessionReport {
            outcome,
            partial: self.buffer,
            stats: self.stats,
        }
    }

    fn handle_event(&mut self, event: SessionEvent) -> Option<Outcome>
    {
        trace!("event: {}", event.describe());
        match event {
            SessionEvent::Channel(Frame::Data(line)) => {
                // A zero-length line is payload (a blank line in the target's
                // report), not end of output. Completion is only the sentinel
                // or end of stream, and read errors arrive as ChannelClosed.
                self.buffer.push_str(&line);
                self.buffer.push('\n');
                self.stats.lines += 1;
                None
            }
            SessionEvent::Channel(Frame::End { residue }) => {
                if !residue.is_empty() {
                    self.buffer.push_str(&residue);
                    self.buffer.push('\n');
                    self.stats.lines += 1;
                }
                debug!("received sentinel");
                Some(Outcome::Success(self.buffer.clone()))
            }
            SessionEvent::ChannelClosed { error: None } => {
                debug!("channel reached end of stream");
                Some(Outcome::Success(self.buffer.clone()))
            }
            SessionEvent::ChannelClosed { error: Some(reason) } => {
                Some(Outcome::DebuggerFailed(InjectError::ChannelRead(reason)))
            }
            SessionEvent::DebuggerFatal { line } => Some(Outcome::DebuggerFailed(InjectError::DebuggerFatal(line))),
            SessionEvent::DebuggerStreamFailed { stream, reason } => {
                Some(Outcome::DebuggerFailed(InjectError::StreamRead {
                    stream: stream.as_str().to_string(),
                    reason,
                }))
            }
            SessionEvent::DebuggerExited { status } => {
                self.on_debugger_exited(status);
                None
            }
            SessionEvent::OperatorInterrupt => {
                info!("interrupted by operator");
                Some(Outcome::Interrupted)
            }
        }
    }

    fn on_debugger_exited(&mut self, status: Option<ExitStatus>)
    {
        if self.grace_deadline.is_some() {
            return;
        }
        debug!(
            "debugger exited ({}); waiting up to {:?} for the target",
            describe_status(status),
            self.exit_grace
        );
        self.exit_status = status;

        let mut deadline = Instant::now() + self.exit_grace;
        if self.timer_armed {
            deadline = deadline.min(self.deadline);
        }
        self.grace_deadline = Some(deadline);
    }

    fn on_grace_expired(&mut self) -> Outcome
    {
        Outcome::DebuggerFailed(InjectError::DebuggerExited(describe_status(self.exit_status)))
    }

    fn on_timeout(&mut self) -> Option<Outcome>
    {
        if !self.escalation_enabled() {
            warn!("no result within {:?}", self.timeout);
            return Some(Outcome::TimedOut);
        }
        self.start_prompt()
    }

    fn start_prompt(&mut self) -> Option<Outcome>
    {
        let Some(mut prompter) = self.prompter.take() else {
            error!("escalation prompter is unavailable");
            return Some(Outcome::TimedOut);
        };

        self.transition(SessionState::Escalating);
        self.stats.prompts += 1;
        let catalog = Arc::clone(&self.catalog);
        let cancel = self.cancel.clone();
        self.prompt_task = Some(tokio::task::spawn_blocking(move || {
            let outcome = prompter.prompt(&catalog, &cancel);
            (outcome, prompter)
        }));
        None
    }

    fn on_prompt_finished(
        &mut self,
        joined: Result<(PromptOutcome, Box<dyn EscalationPrompter>), JoinError>,
    ) -> Option<Outcome>
    {
        let (answer, prompter) = match joined {
            Ok(result) => result,
            Err(err) => {
                error!("escalation prompt failed: {err}");
                return Some(Outcome::TimedOut);
            }
        };
        self.prompter = Some(prompter);

        match answer {
            PromptOutcome::Signal(signal) => match self.sender.send(self.target, signal) {
                Ok(()) => {
                    info!("sent signal {signal} to target process ({})", self.target);
                    self.stats.signals_sent += 1;
                    self.transition(SessionState::AwaitingResult);
                    self.rearm_timer();
                    None
                }
                Err(err) => {
                    error!("{err}");
                    self.start_prompt()
                }
            },
            PromptOutcome::Retry => {
                self.transition(SessionState::AwaitingResult);
                self.rearm_timer();
                None
            }
            PromptOutcome::Invalid(input) => {
                warn!("invalid escalation input: '{input}'");
                self.start_prompt()
            }
            PromptOutcome::Abort => Some(Outcome::Interrupted),
        }
    }

    /// Stop a prompt attempt that outlived the session and wait for it.
    async fn cancel_prompt(&mut self)
    {
        let Some(task) = self.prompt_task.take() else {
            return;
        };

        debug!("cancelling escalation prompt");
        self.cancel.cancel();
        match tokio::time::timeout(PROMPT_CANCEL_GRACE, task).await {
            Ok(Ok((answer, prompter))) => {
                debug!("cancelled prompt returned {answer:?}");
                self.prompter = Some(prompter);
            }
            Ok(Err(err)) => error!("escalation prompt failed: {err}"),
            Err(_) => warn!("escalation prompt did not stop within {PROMPT_CANCEL_GRACE:?}"),
        }
    }

    fn arm_timer(&mut self)
    {
        self.deadline = Instant::now() + self.timeout;
        self.timer_armed = true;
    }

    fn rearm_timer(&mut self)
    {
        self.stats.timer_rearms += 1;
        debug!("timer re-armed for {:?}", self.timeout);
        self.arm_timer();
    }

    fn transition(&mut self, next: SessionState)
    {
        if self.state != next {
            debug!("session state: {} -> {next}", self.state);
            self.state = next;
        }
    }
}

async fn join_prompt(task: &mut Option<PromptTask>) -> Result<(PromptOutcome, Box<dyn EscalationPrompter>), JoinError>
{
    match task {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>)
{
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
