//! Line framing for the communication channel.
//!
//! The channel is newline-delimited text. [`LineReader`] turns any
//! `AsyncRead` into lines (lossily decoding invalid UTF-8, since the target
//! may dump arbitrary bytes), and [`FrameReader`] classifies those lines as
//! payload or end-of-output.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::sentinel::Sentinel;

/// One unit read from the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame
{
    /// An ordinary payload line, without its trailing newline.
    Data(String),
    /// The sentinel line. `residue` is any payload that preceded the
    /// sentinel on the same line.
    End
    {
        /// Text before the sentinel marker (usually empty).
        residue: String,
    },
}

impl Frame
{
    /// Whether this frame terminates the stream.
    #[must_use]
    pub fn is_end(&self) -> bool
    {
        matches!(self, Frame::End { .. })
    }
}

/// Reads newline-terminated lines from an async byte stream.
#[derive(Debug)]
pub struct LineReader<R>
{
    inner: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R>
{
    /// Wrap a reader.
    pub fn new(reader: R) -> Self
    {
        Self {
            inner: BufReader::new(reader),
            buf: Vec::with_capacity(256),
        }
    }

    /// Read the next line.
    ///
    /// Returns `Ok(None)` on a zero-length read (end of stream). A final
    /// line without a newline is still returned.
    ///
    /// ## Errors
    ///
    /// Propagates I/O errors from the underlying reader.
    pub async fn next_line(&mut self) -> io::Result<Option<String>>
    {
        self.buf.clear();
        let read = self.inner.read_until(b'\n', &mut self.buf).await?;
        if read == 0 {
            return Ok(None);
        }

        while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
            self.buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

/// Reads [`Frame`]s from the channel for one session.
///
/// After the sentinel has been seen the reader reports end-of-stream, even
/// if more bytes are buffered.
#[derive(Debug)]
pub struct FrameReader<R>
{
    lines: LineReader<R>,
    sentinel: Sentinel,
    finished: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R>
{
    /// Create a frame reader looking for `sentinel`.
    pub fn new(reader: R, sentinel: Sentinel) -> Self
    {
        Self {
            lines: LineReader::new(reader),
            sentinel,
            finished: false,
        }
    }

    /// Read the next frame, or `Ok(None)` at end of stream.
    ///
    /// ## Errors
    ///
    /// Propagates I/O errors from the underlying reader.
    pub async fn next_frame(&mut self) -> io::Result<Option<Frame>>
    {
        if self.finished {
            return Ok(None);
        }

        let Some(line) = self.lines.next_line().await? else {
            self.finished = true;
            return Ok(None);
        };

        if let Some(residue) = self.sentinel.strip_from(&line) {
            self.finished = true;
            return Ok(Some(Frame::End {
                residue: residue.to_string(),
            }));
        }
        // Blank lines stay payload; only the sentinel or EOF ends the stream.
        Ok(Some(Frame::Data(line)))
    }
}
