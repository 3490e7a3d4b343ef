//! # Debugger Process
//!
//! Runs the gdb subprocess for one session and owns it until it exits.
//!
//! [`DebuggerHandle::spawn`] launches the child, hands its stdout and stderr
//! to two [watchers](crate::watch), and moves the child into a supervisor
//! task. The supervisor waits for the child to exit, or for a termination
//! request, and then reports [`SessionEvent::DebuggerExited`].
//!
//! ## Termination
//!
//! gdb detaches from its inferior when it receives `SIGTERM`, which removes
//! the breakpoints it inserted. A plain `SIGKILL` would leave `int3`
//! instructions behind in the target. Termination therefore sends `SIGTERM`
//! first and only kills the child if it is still running after
//! [`DEBUGGER_TERM_GRACE`].

use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::DebuggerCommand;
use crate::error::{InjectError, InjectResult};
use crate::events::{DebuggerStream, EventSender, SessionEvent};
use crate::watch::spawn_stream_watcher;

/// Time between `SIGTERM` and `SIGKILL` when stopping the debugger.
pub const DEBUGGER_TERM_GRACE: Duration = Duration::from_millis(200);

/// Handle to a running debugger subprocess.
///
/// Dropping the handle requests termination.
#[derive(Debug)]
pub struct DebuggerHandle
{
    pid: Option<u32>,
    exited: Arc<AtomicBool>,
    terminate: Option<oneshot::Sender<()>>,
    supervisor: Option<JoinHandle<()>>,
}

impl DebuggerHandle
{
    /// Launch `command` and start watching it.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// ## Errors
    ///
    /// Returns [`InjectError::DebuggerLaunchFailed`] if the process cannot be started.
    pub fn spawn(command: &DebuggerCommand, events: &EventSender) -> InjectResult<Self>
    {
        debug!("starting command: {command}");
        let mut child = command
            .to_command()
            .spawn()
            .map_err(|e| InjectError::DebuggerLaunchFailed(format!("{}: {e}", command.program().display())))?;

        let pid = child.id();
        info!(pid, "debugger started");

        if let Some(stdout) = child.stdout.take() {
            spawn_stream_watcher(DebuggerStream::Stdout, stdout, events.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_stream_watcher(DebuggerStream::Stderr, stderr, events.clone());
        }

        let exited = Arc::new(AtomicBool::new(false));
        let (terminate, terminate_rx) = oneshot::channel();
        let supervisor = tokio::spawn(supervise(child, terminate_rx, Arc::clone(&exited), events.clone()));

        Ok(Self {
            pid,
            exited,
            terminate: Some(terminate),
            supervisor: Some(supervisor),
        })
    }

    /// OS process ID of the debugger, if it was known at launch.
    #[must_use]
    pub fn pid(&self) -> Option<u32>
    {
        self.pid
    }

    /// Whether the debugger has exited.
    #[must_use]
    pub fn has_exited(&self) -> bool
    {
        self.exited.load(Ordering::SeqCst)
    }

    /// Ask the supervisor to stop the debugger. Returns immediately.
    ///
    /// Calling this more than once, or after the debugger exited, does nothing.
    pub fn terminate(&mut self)
    {
        if let Some(terminate) = self.terminate.take() {
            if !self.has_exited() {
                debug!(pid = self.pid, "requesting debugger termination");
            }
            let _ = terminate.send(());
        }
    }

    /// Give the debugger up to `settle` to exit on its own, then terminate it
    /// and wait for the supervisor to finish.
    pub async fn shutdown(&mut self, settle: Duration)
    {
        let Some(mut supervisor) = self.supervisor.take() else {
            return;
        };

        if !self.has_exited() && !settle.is_zero() {
            if tokio::time::timeout(settle, &mut supervisor).await.is_ok() {
                self.terminate.take();
                return;
            }
            debug!(pid = self.pid, "debugger still running after {settle:?}");
        }

        self.terminate();
        if let Err(err) = supervisor.await {
            warn!("debugger supervisor failed: {err}");
        }
    }
}

impl Drop for DebuggerHandle
{
    fn drop(&mut self)
    {
        self.terminate();
    }
}

async fn supervise(mut child: Child, terminate: oneshot::Receiver<()>, exited: Arc<AtomicBool>, events: EventSender)
{
    let status = tokio::select! {
        status = child.wait() => status.ok(),
        _ = terminate => stop_child(&mut child).await,
    };

    exited.store(true, Ordering::SeqCst);
    debug!("debugger exited with {status:?}");
    let _ = events.send(SessionEvent::DebuggerExited { status }).await;
}

/// `SIGTERM`, wait [`DEBUGGER_TERM_GRACE`], then `SIGKILL`.
async fn stop_child(child: &mut Child) -> Option<ExitStatus>
{
    if let Ok(Some(status)) = child.try_wait() {
        return Some(status);
    }

    if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
        if let Err(errno) = signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
            debug!(pid, "SIGTERM to debugger failed: {errno}");
        }
    }

    if let Ok(status) = tokio::time::timeout(DEBUGGER_TERM_GRACE, child.wait()).await {
        return status.ok();
    }

    warn!("debugger ignored SIGTERM; killing it");
    if let Err(err) = child.kill().await {
        warn!("failed to kill debugger: {err}");
    }
    child.wait().await.ok()
}
