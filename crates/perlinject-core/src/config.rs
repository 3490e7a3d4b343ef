//! # Session Configuration
//!
//! Builder-style configuration for one injection session.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use perlinject_core::config::SessionConfig;
//!
//! let config = SessionConfig::builder(4242)
//!     .code("print $fh scalar(localtime)")
//!     .timeout(Duration::from_secs(10))
//!     .build();
//! assert_eq!(config.target.raw(), 4242);
//! assert!(!config.escalation_enabled());
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::signals::SignalCatalog;
use crate::types::ProcessId;

/// Code injected when the operator supplies none: the target's Perl call stack.
pub const DEFAULT_CODE: &str = "require Carp unless exists($INC{'Carp.pm'}); local $Carp::MaxArgLen = 0; local $Carp::MaxArgNums = 0; print $fh Carp::longmess('INJECT')";

/// How long to wait for the target to report back.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Environment variable naming an explicit debugger executable.
pub const DEBUGGER_ENV: &str = "GDB";

/// Name of the debugger executable.
pub const DEBUGGER_NAME: &str = "gdb";

/// Name of the interpreter used for offline syntax checks.
pub const INTERPRETER_NAME: &str = "perl";

/// Symbols in the target runtime that the debugger script relies on.
///
/// The defaults describe a non-threaded `perl` binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeHooks
{
    /// Function that dispatches pending deferred signals; a safe point to
    /// evaluate code from.
    pub reentry_function: String,
    /// Flag that makes the runtime loop call `reentry_function` soon.
    pub pending_flag: String,
    /// String-evaluation entry point, called as `eval(code, croak_on_error)`.
    pub eval_function: String,
}

impl Default for RuntimeHooks
{
    fn default() -> Self
    {
        Self {
            reentry_function: "Perl_despatch_signals".to_string(),
            pending_flag: "PL_sig_pending".to_string(),
            eval_function: "Perl_eval_pv".to_string(),
        }
    }
}

/// Everything a session needs to know before it starts.
#[derive(Debug, Clone)]
pub struct SessionConfig
{
    /// Process to inject into
    pub target: ProcessId,
    /// Perl code to evaluate inside the target
    pub code: String,
    /// Bound on waiting for a result (re-armed only by escalation)
    pub timeout: Duration,
    /// Skip validation and quoting restrictions
    pub force: bool,
    /// Signals offered during escalation; empty disables escalation
    pub signal_catalog: SignalCatalog,
    /// Target runtime symbols
    pub hooks: RuntimeHooks,
    /// Explicit debugger path, tried after `PATH`
    pub debugger_path: Option<PathBuf>,
    /// Explicit interpreter path for validation, tried after `PATH`
    pub interpreter_path: Option<PathBuf>,
}

impl SessionConfig
{
    /// Start building a configuration for `target`.
    pub fn builder(target: impl Into<ProcessId>) -> SessionConfigBuilder
    {
        SessionConfigBuilder::new(target.into())
    }

    /// Whether timeouts hand over to the operator instead of failing.
    #[must_use]
    pub fn escalation_enabled(&self) -> bool
    {
        !self.signal_catalog.is_empty()
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder
{
    config: SessionConfig,
}

impl SessionConfigBuilder
{
    fn new(target: ProcessId) -> Self
    {
        Self {
            config: SessionConfig {
                target,
                code: DEFAULT_CODE.to_string(),
                timeout: DEFAULT_TIMEOUT,
                force: false,
                signal_catalog: SignalCatalog::default(),
                hooks: RuntimeHooks::default(),
                debugger_path: None,
                interpreter_path: None,
            },
        }
    }

    /// Code to inject. Surrounding whitespace is trimmed.
    #[must_use]
    pub fn code(mut self, code: impl Into<String>) -> Self
    {
        self.config.code = code.into().trim().to_string();
        self
    }

    /// Result timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self
    {
        self.config.timeout = timeout;
        self
    }

    /// Bypass validation.
    #[must_use]
    pub fn force(mut self, force: bool) -> Self
    {
        self.config.force = force;
        self
    }

    /// Enable escalation with the given catalog.
    #[must_use]
    pub fn signal_catalog(mut self, catalog: SignalCatalog) -> Self
    {
        self.config.signal_catalog = catalog;
        self
    }

    /// Override the runtime symbols.
    #[must_use]
    pub fn hooks(mut self, hooks: RuntimeHooks) -> Self
    {
        self.config.hooks = hooks;
        self
    }

    /// Explicit debugger executable.
    #[must_use]
    pub fn debugger_path(mut self, path: impl Into<PathBuf>) -> Self
    {
        self.config.debugger_path = Some(path.into());
        self
    }

    /// Explicit validation interpreter.
    #[must_use]
    pub fn interpreter_path(mut self, path: impl Into<PathBuf>) -> Self
    {
        self.config.interpreter_path = Some(path.into());
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> SessionConfig
    {
        self.config
    }
}
