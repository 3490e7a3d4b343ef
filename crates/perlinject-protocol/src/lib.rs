//! # perlinject-protocol
//!
//! The out-of-band channel between perlinject and the target process.
//!
//! The target writes newline-delimited text into a named pipe. Every line is
//! opaque payload except the last, which carries a per-session [`Sentinel`].
//! Receipt of that line (or end-of-stream) means the target has finished.
//!
//! This crate holds the pure parts of that protocol:
//!
//! - [`sentinel`]: collision-resistant termination tokens
//! - [`framing`]: turning a byte stream into [`Frame`]s
//! - [`wrapper`]: the Perl code that runs the operator's snippet inside the target

pub mod framing;
pub mod sentinel;
pub mod wrapper;

pub use framing::{Frame, FrameReader, LineReader};
pub use sentinel::Sentinel;
pub use wrapper::{render_wrapper, DISCARD_DESTINATION};
