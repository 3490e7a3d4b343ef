//! # perlinject-core
//!
//! Injection session orchestration for perlinject.
//!
//! This crate runs one injection of Perl code into a live process:
//! - Validating the code offline before the target is touched
//! - Provisioning a private named pipe for the target to write into
//! - Driving gdb through attach, break, eval, detach
//! - Multiplexing channel output, debugger output, a timeout and operator
//!   escalation into a single [`Outcome`]
//! - Cleaning up on every exit path
//!
//! ## Platform Support
//!
//! - **Linux**: gdb attaching with `ptrace`
//! - **macOS**: gdb builds that can attach (codesigned), otherwise setup fails
//!   with the debugger's permission error
//!
//! The crate never traces processes itself; all of that is gdb's job.

pub mod channel;
pub mod command;
pub mod config;
pub mod debugger;
pub mod error;
pub mod escalation;
pub mod events;
pub mod multiplexer;
pub mod prelude;
pub mod session;
pub mod signals;
pub mod target;
pub mod types;
pub mod validate;
pub mod watch;

pub use config::{SessionConfig, DEFAULT_CODE, DEFAULT_TIMEOUT};
// Re-export commonly used types
pub use error::{InjectError, InjectResult};
pub use multiplexer::{Outcome, SessionReport, SessionStats};
pub use session::InjectionSession;
pub use types::{ProcessId, SessionState};
