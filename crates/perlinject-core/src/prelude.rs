//! Common module for library exports

pub use crate::config::{RuntimeHooks, SessionConfig, DEFAULT_CODE, DEFAULT_TIMEOUT};
pub use crate::error::{InjectError, InjectResult};
pub use crate::escalation::{
    parse_selection, EscalationPrompter, KillSender, PromptCancel, PromptOutcome, Selection, SignalSender,
};
pub use crate::multiplexer::{Multiplexer, Outcome, SessionReport, SessionStats};
pub use crate::session::InjectionSession;
pub use crate::signals::SignalCatalog;
pub use crate::types::{ProcessId, SessionState};
