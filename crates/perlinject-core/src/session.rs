//! # Injection Session
//!
//! Owns every resource of one injection and runs it end to end:
//!
//! 1. target sanity checks (not PID 0, not ourselves)
//! 2. validation (shape, then an offline syntax check) unless forced
//! 3. target liveness
//! 4. debugger lookup
//! 5. channel provisioning, sentinel and wrapper generation
//! 6. debugger launch, event producers, multiplexing
//! 7. shutdown and cleanup
//!
//! Steps 1 to 5 never contact the target beyond a signal-0 probe, and a
//! failure in any of them is reported once without starting the debugger.
//! Cleanup runs on every path, including drop.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use perlinject_core::config::SessionConfig;
//! use perlinject_core::escalation::{EscalationPrompter, KillSender, PromptCancel, PromptOutcome};
//! use perlinject_core::session::InjectionSession;
//! use perlinject_core::signals::SignalCatalog;
//!
//! struct GiveUp;
//!
//! impl EscalationPrompter for GiveUp
//! {
//!     fn prompt(&mut self, _catalog: &SignalCatalog, _cancel: &PromptCancel) -> PromptOutcome
//!     {
//!         PromptOutcome::Abort
//!     }
//! }
//!
//! # async fn demo() {
//! let mut session = InjectionSession::new(SessionConfig::builder(4242).build());
//! let report = session.run(Box::new(GiveUp), Arc::new(KillSender)).await;
//! match report.into_result() {
//!     Ok(output) => print!("{output}"),
//!     Err(err) => eprintln!("Error: {err}"),
//! }
//! # }
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use perlinject_protocol::{render_wrapper, Sentinel};
use perlinject_utils::locate_binary;
use tokio::net::unix::pipe;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::channel::{spawn_reader, Channel};
use crate::command::DebuggerCommand;
use crate::config::{SessionConfig, DEBUGGER_ENV, DEBUGGER_NAME, INTERPRETER_NAME};
use crate::debugger::DebuggerHandle;
use crate::error::{InjectError, InjectResult};
use crate::escalation::{EscalationPrompter, SignalSender};
use crate::events::{event_channel, EventSender, SessionEvent};
use crate::multiplexer::{Multiplexer, Outcome, SessionReport};
use crate::types::{ProcessId, SessionState};
use crate::{target, validate};

/// Prefix of staging directory names.
pub const CHANNEL_LABEL: &str = "perlinject";

/// How long a debugger that delivered a result may take to detach and quit.
pub const DEBUGGER_SETTLE: Duration = Duration::from_secs(2);

/// Everything [`InjectionSession::prepare`] produces for the launch.
struct Prepared
{
    command: DebuggerCommand,
    sentinel: Sentinel,
    receiver: pipe::Receiver,
}

/// One injection into one target process.
#[derive(Debug)]
pub struct InjectionSession
{
    config: SessionConfig,
    state: SessionState,
    channel: Option<Channel>,
    debugger: Option<DebuggerHandle>,
}

impl InjectionSession
{
    /// Create a session. Nothing is checked or provisioned until [`InjectionSession::run`].
    #[must_use]
    pub fn new(config: SessionConfig) -> Self
    {
        Self {
            config,
            state: SessionState::Starting,
            channel: None,
            debugger: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState
    {
        self.state
    }

    /// Configuration the session runs with.
    #[must_use]
    pub fn config(&self) -> &SessionConfig
    {
        &self.config
    }

    /// Staging directory, while it exists.
    #[must_use]
    pub fn channel_dir(&self) -> Option<&Path>
    {
        self.channel.as_ref().filter(|c| !c.is_closed()).map(Channel::dir_path)
    }

    /// Run the session to completion and release its resources.
    ///
    /// `prompter` is only used when the configuration carries a signal catalog.
    pub async fn run(&mut self, prompter: Box<dyn EscalationPrompter>, sender: Arc<dyn SignalSender>) -> SessionReport
    {
        let prepared = match self.prepare().await {
            Ok(prepared) => prepared,
            Err(err) => {
                debug!("setup failed: {err}");
                self.cleanup();
                return SessionReport::setup_failure(err);
            }
        };

        let (events, receiver) = event_channel();
        match DebuggerHandle::spawn(&prepared.command, &events) {
            Ok(debugger) => self.debugger = Some(debugger),
            Err(err) => {
                self.cleanup();
                return SessionReport {
                    outcome: Outcome::DebuggerFailed(err),
                    partial: String::new(),
                    stats: Default::default(),
                };
            }
        }
        self.transition(SessionState::Attached);

        spawn_reader(prepared.receiver, prepared.sentinel, events.clone());
        let interrupts = spawn_interrupt_listener(events.clone());
        drop(events);

        let mut multiplexer = Multiplexer::new(self.config.target, self.config.timeout).with_signal_sender(sender);
        if self.config.escalation_enabled() {
            multiplexer = multiplexer.with_escalation(self.config.signal_catalog.clone(), prompter);
        }

        self.transition(SessionState::AwaitingResult);
        let report = multiplexer.run(receiver).await;
        interrupts.abort();
        self.transition(report.outcome.state());

        let settle = if report.outcome.is_success() { DEBUGGER_SETTLE } else { Duration::ZERO };
        self.shutdown(settle).await;
        report
    }

    /// Checks, lookups and provisioning. Nothing here starts the debugger.
    async fn prepare(&mut self) -> InjectResult<Prepared>
    {
        let pid = self.config.target;
        target::check_target(pid)?;

        if self.config.force {
            debug!("skipping validation");
        } else {
            validate::check_shape(&self.config.code)?;
            let perl = locate_binary(INTERPRETER_NAME, &overrides(self.config.interpreter_path.as_deref(), None))?;
            validate::syntax_check(&self.config.code, &perl).await?;
        }

        target::ensure_alive(pid)?;

        let gdb = locate_binary(
            DEBUGGER_NAME,
            &overrides(self.config.debugger_path.as_deref(), env::var_os(DEBUGGER_ENV).map(PathBuf::from)),
        )?;

        let channel = self.channel.insert(Channel::provision(CHANNEL_LABEL, pid)?);
        let receiver = channel
            .take_receiver()
            .ok_or_else(|| InjectError::SetupFailed("channel read end already taken".to_string()))?;

        let sentinel = Sentinel::generate(ProcessId::current().raw(), pid.raw());
        let wrapped = render_wrapper(&self.config.code, channel.pipe_path(), &sentinel);
        let command = DebuggerCommand::injection(gdb, pid, &self.config.hooks, &wrapped);

        Ok(Prepared {
            command,
            sentinel,
            receiver,
        })
    }

    /// Let the debugger settle for up to `settle`, stop it, and clean up.
    pub async fn shutdown(&mut self, settle: Duration)
    {
        self.transition(SessionState::Terminating);
        if let Some(debugger) = self.debugger.as_mut() {
            debugger.shutdown(settle).await;
        }
        self.cleanup();
    }

    /// Stop the debugger if it still runs and remove the staging directory.
    ///
    /// Idempotent; safe after partial setup.
    pub fn cleanup(&mut self)
    {
        if let Some(mut debugger) = self.debugger.take() {
            debugger.terminate();
        }
        if let Some(mut channel) = self.channel.take() {
            if let Err(err) = channel.close() {
                warn!("failed to remove {}: {err}", channel.dir_path().display());
            }
        }
        if self.state != SessionState::Done {
            debug!("cleaned up");
        }
        self.transition(SessionState::Done);
    }

    fn transition(&mut self, next: SessionState)
    {
        if self.state != next {
            debug!("session {}: {} -> {next}", self.config.target, self.state);
            self.state = next;
        }
    }
}

impl Drop for InjectionSession
{
    fn drop(&mut self)
    {
        self.cleanup();
    }
}

fn overrides(configured: Option<&Path>, from_env: Option<PathBuf>) -> Vec<PathBuf>
{
    configured.map(Path::to_path_buf).into_iter().chain(from_env).collect()
}

fn spawn_interrupt_listener(events: EventSender) -> JoinHandle<()>
{
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = events.send(SessionEvent::OperatorInterrupt).await;
        }
    })
}
