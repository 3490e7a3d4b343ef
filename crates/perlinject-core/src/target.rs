//! Target process checks performed before anything is provisioned.

use nix::errno::Errno;
use nix::sys::signal;
use tracing::{debug, warn};

use crate::error::{InjectError, InjectResult};
use crate::types::ProcessId;

/// Reject PIDs that can never be injected into.
///
/// PID 0 would address our own process group and the orchestrator cannot
/// attach a debugger to itself.
///
/// ## Errors
///
/// Returns [`InjectError::InvalidTarget`] for PID 0 or the orchestrator's own PID.
pub fn check_target(pid: ProcessId) -> InjectResult<()>
{
    if pid.raw() == 0 {
        return Err(InjectError::InvalidTarget("PID 0 is not a process".to_string()));
    }
    if pid == ProcessId::current() {
        return Err(InjectError::InvalidTarget(format!("PID {pid} is this process")));
    }
    if i32::try_from(pid.raw()).is_err() {
        return Err(InjectError::InvalidTarget(format!("PID {pid} is out of range")));
    }
    Ok(())
}

/// Probe the target with signal 0.
///
/// `EPERM` means the process exists but belongs to another user; the debugger
/// will report that itself, so the session proceeds.
///
/// ## Errors
///
/// Returns [`InjectError::TargetNotFound`] when no process has this PID.
pub fn ensure_alive(pid: ProcessId) -> InjectResult<()>
{
    match signal::kill(pid.as_nix(), None) {
        Ok(()) => {
            debug!(pid = pid.raw(), "target is alive");
            Ok(())
        }
        Err(Errno::EPERM) => {
            warn!(pid = pid.raw(), "target exists but is not ours to signal; the debugger may fail to attach");
            Ok(())
        }
        Err(Errno::ESRCH) => Err(InjectError::TargetNotFound(pid.raw())),
        Err(errno) => Err(InjectError::Io(std::io::Error::from(errno))),
    }
}
