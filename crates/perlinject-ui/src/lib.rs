//! # perlinject-ui
//!
//! Terminal interaction for perlinject.
//!
//! When a target does not report back in time, the operator may send it a
//! signal to shake it loose from a blocking system call. This crate provides
//! the prompt for that, built on `crossterm`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use perlinject_core::escalation::{EscalationPrompter, PromptCancel};
//! use perlinject_core::signals::SignalCatalog;
//! use perlinject_ui::TerminalPrompter;
//!
//! let mut prompter = TerminalPrompter::default();
//! let answer = prompter.prompt(&SignalCatalog::host(), &PromptCancel::new());
//! println!("{answer:?}");
//! ```

pub mod input;
pub mod prompt;

pub use input::{EditAction, LineEditor};
pub use prompt::{TerminalPrompter, DEFAULT_ATTEMPT_WINDOW};
