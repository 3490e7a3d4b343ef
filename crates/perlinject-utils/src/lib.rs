//! # perlinject utilities
//!
//! Shared utilities for perlinject: logging setup built on `tracing`, and
//! lookup of the helper executables (`gdb`, `perl`) the injector drives.

pub mod locate;
pub mod logging;

pub use locate::{locate_binary, LocateError};
// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
