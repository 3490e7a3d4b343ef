//! # Communication Channel
//!
//! The target reports back through a named pipe in a private staging
//! directory. The directory and the pipe are world-writable because the
//! target may run as a different user than we do.
//!
//! ## Lifecycle
//!
//! 1. [`Channel::provision`] creates the directory, the FIFO inside it, and
//!    opens the read end. Any failure removes the directory again.
//! 2. [`Channel::take_receiver`] hands the read end to [`spawn_reader`], which
//!    turns frames into [`SessionEvent`]s.
//! 3. [`Channel::close`] removes the directory. It is idempotent and also
//!    runs on drop.
//!
//! The read end is opened read-write so that opening it does not block while
//! the target has not connected yet. Holding a write end also means a target
//! closing its handle is not seen as end of stream; the sentinel line is what
//! marks completion.

use std::fs::{self, OpenOptions, Permissions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use perlinject_protocol::{Frame, FrameReader, Sentinel};
use tempfile::TempDir;
use tokio::io::AsyncRead;
use tokio::net::unix::pipe;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{InjectError, InjectResult};
use crate::events::{EventSender, SessionEvent};
use crate::types::ProcessId;

/// File name of the FIFO inside the staging directory.
pub const PIPE_NAME: &str = "communication_pipe.fifo";

const WORLD_ACCESS: u32 = 0o777;

/// Staging directory plus named pipe for one session.
#[derive(Debug)]
pub struct Channel
{
    dir: Option<TempDir>,
    dir_path: PathBuf,
    pipe_path: PathBuf,
    receiver: Option<pipe::Receiver>,
}

impl Channel
{
    /// Provision a channel for a session against `target`.
    ///
    /// The directory name embeds `label`, our PID, the target PID and a
    /// nanosecond timestamp, and gets a random suffix on top, so concurrent
    /// sessions never share a path. The system temp directory is tried first,
    /// then the directory holding our own executable.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// ## Errors
    ///
    /// Returns [`InjectError::SetupFailed`] if the directory, the pipe, or the
    /// read end cannot be created. Nothing is left on disk in that case.
    pub fn provision(label: &str, target: ProcessId) -> InjectResult<Self>
    {
        let dir = create_staging_dir(label, target)?;
        let dir_path = dir.path().to_path_buf();
        let pipe_path = dir_path.join(PIPE_NAME);

        // `dir` drops on every early return below, which removes it again.
        fs::set_permissions(&dir_path, Permissions::from_mode(WORLD_ACCESS))
            .map_err(|e| setup_failed(&dir_path, "could not open up permissions on", &e))?;

        mkfifo(&pipe_path, Mode::from_bits_truncate(WORLD_ACCESS))
            .map_err(|errno| setup_failed(&pipe_path, "could not create pipe", &io::Error::from(errno)))?;
        // mkfifo is subject to the umask
        fs::set_permissions(&pipe_path, Permissions::from_mode(WORLD_ACCESS))
            .map_err(|e| setup_failed(&pipe_path, "could not open up permissions on", &e))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&pipe_path)
            .map_err(|e| setup_failed(&pipe_path, "could not open", &e))?;
        let receiver =
            pipe::Receiver::from_file(file).map_err(|e| setup_failed(&pipe_path, "could not register", &e))?;

        debug!(pipe = %pipe_path.display(), "provisioned communication channel");
        Ok(Self {
            dir: Some(dir),
            dir_path,
            pipe_path,
            receiver: Some(receiver),
        })
    }

    /// Path of the named pipe the target writes to.
    #[must_use]
    pub fn pipe_path(&self) -> &Path
    {
        &self.pipe_path
    }

    /// Path of the staging directory.
    #[must_use]
    pub fn dir_path(&self) -> &Path
    {
        &self.dir_path
    }

    /// Whether [`Channel::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool
    {
        self.dir.is_none()
    }

    /// Take the read end. Returns `None` after the first call.
    pub fn take_receiver(&mut self) -> Option<pipe::Receiver>
    {
        self.receiver.take()
    }

    /// Remove the staging directory and everything in it.
    ///
    /// Safe to call any number of times; a directory that is already gone is
    /// not an error.
    ///
    /// ## Errors
    ///
    /// Returns the I/O error if removal fails for another reason.
    pub fn close(&mut self) -> io::Result<()>
    {
        self.receiver = None;
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };

        debug!(dir = %self.dir_path.display(), "removing staging directory");
        match dir.close() {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}

impl Drop for Channel
{
    fn drop(&mut self)
    {
        if let Err(err) = self.close() {
            warn!(dir = %self.dir_path.display(), "failed to remove staging directory: {err}");
        }
    }
}

fn create_staging_dir(label: &str, target: ProcessId) -> InjectResult<TempDir>
{
    let nanos = timestamp_nanos();
    let prefix = format!("{label}-{}-{target}-{nanos}-", ProcessId::current());
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix);

    match builder.tempdir() {
        Ok(dir) => Ok(dir),
        Err(first) => {
            warn!("could not create staging directory in the system temp dir: {first}");
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf))
                .ok_or_else(|| InjectError::SetupFailed(format!("could not create staging directory: {first}")))?;
            builder.tempdir_in(&exe_dir).map_err(|second| {
                InjectError::SetupFailed(format!(
                    "could not create staging directory in the system temp dir ({first}) or in {} ({second})",
                    exe_dir.display()
                ))
            })
        }
    }
}

fn timestamp_nanos() -> i64
{
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

fn setup_failed(path: &Path, what: &str, err: &io::Error) -> InjectError
{
    InjectError::SetupFailed(format!("{what} {}: {err}", path.display()))
}

/// Read frames from `source` and forward them as session events.
///
/// The task ends after the sentinel, at end of stream, on a read error, or
/// when the multiplexer has dropped its receiver. A reader stuck on a pipe
/// nobody writes to is simply abandoned when the session ends.
pub fn spawn_reader<R>(source: R, sentinel: Sentinel, events: EventSender) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut frames = FrameReader::new(source, sentinel);
        loop {
            let event = match frames.next_frame().await {
                Ok(Some(frame)) => {
                    if let Frame::Data(line) = &frame {
                        debug!("got data from target: {line}");
                    }
                    let end = frame.is_end();
                    if events.send(SessionEvent::Channel(frame)).await.is_err() || end {
                        return;
                    }
                    continue;
                }
                Ok(None) => SessionEvent::ChannelClosed { error: None },
                Err(err) => SessionEvent::ChannelClosed {
                    error: Some(err.to_string()),
                },
            };
            let _ = events.send(event).await;
            return;
        }
    })
}
