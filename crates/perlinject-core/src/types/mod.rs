//! # Types
//!
//! Small value types shared across the session machinery.

pub mod process;
pub mod state;

// Re-export all public types
pub use process::ProcessId;
pub use state::SessionState;
