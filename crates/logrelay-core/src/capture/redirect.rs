//! Redirection of the process stdout/stderr file descriptors.
//!
//! Each redirected descriptor is pointed at the write end of a pipe; a
//! reader thread feeds the read end through a [`LineBuffer`] so every line
//! becomes a `tracing` event. The original descriptors are kept so they can be
//! restored later, and stdout can be written to directly (the terminal UI
//! does).

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::thread::JoinHandle;

use tracing::debug;

use crate::error::RelayError;
use crate::line_buffer::{CapturedStream, LineBuffer};

/// Guard for the redirected stdout and stderr. Restores both on drop.
#[derive(Debug)]
pub struct StdStreamRedirect {
    stdout: Option<RedirectedFd>,
    stderr: Option<RedirectedFd>,
}

#[derive(Debug)]
struct RedirectedFd {
    stream: CapturedStream,
    fd: RawFd,
    /// Duplicate of the descriptor as it was before redirection.
    saved: OwnedFd,
    reader: Option<JoinHandle<()>>,
}

impl StdStreamRedirect {
    /// Redirect stdout (INFO) and stderr (ERROR) into the log path.
    pub fn capture() -> Result<Self, RelayError> {
        let stdout = RedirectedFd::install(CapturedStream::Stdout, libc::STDOUT_FILENO)?;
        let stderr = match RedirectedFd::install(CapturedStream::Stderr, libc::STDERR_FILENO) {
            Ok(stderr) => stderr,
            Err(e) => {
                stdout.restore();
                return Err(e);
            }
        };
        Ok(Self {
            stdout: Some(stdout),
            stderr: Some(stderr),
        })
    }

    /// A writer to the stdout the process had before redirection.
    pub fn original_stdout(&self) -> io::Result<File> {
        match &self.stdout {
            Some(r) => Ok(File::from(r.saved.try_clone()?)),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "stdout is not redirected",
            )),
        }
    }

    /// Point both descriptors back at their originals and wait for the
    /// reader threads to flush their last lines. Idempotent.
    pub fn restore(&mut self) {
        if let Some(stderr) = self.stderr.take() {
            stderr.restore();
        }
        if let Some(stdout) = self.stdout.take() {
            stdout.restore();
        }
    }
}

impl Drop for StdStreamRedirect {
    fn drop(&mut self) {
        self.restore();
    }
}

impl RedirectedFd {
    fn install(stream: CapturedStream, fd: RawFd) -> Result<Self, RelayError> {
        let err = |source| RelayError::Redirect {
            stream: stream.name(),
            source,
        };

        flush_std(stream);

        // SAFETY: fd 1 and fd 2 stay open for the life of the process.
        let saved = unsafe { BorrowedFd::borrow_raw(fd) }
            .try_clone_to_owned()
            .map_err(err)?;
        let (read_end, write_end) = pipe().map_err(err)?;

        // SAFETY: both descriptors are open; dup2 atomically replaces `fd`.
        if unsafe { libc::dup2(write_end.as_raw_fd(), fd) } == -1 {
            return Err(err(io::Error::last_os_error()));
        }
        drop(write_end);

        let reader = std::thread::Builder::new()
            .name(format!("relay-{}", stream.name()))
            .spawn(move || pump(read_end, stream));
        let reader = match reader {
            Ok(handle) => handle,
            Err(e) => {
                // SAFETY: `saved` is open; this undoes the dup2 above.
                unsafe { libc::dup2(saved.as_raw_fd(), fd) };
                return Err(err(e));
            }
        };

        debug!(stream = stream.name(), "redirected");
        Ok(Self {
            stream,
            fd,
            saved,
            reader: Some(reader),
        })
    }

    fn restore(mut self) {
        flush_std(self.stream);
        // SAFETY: `saved` is open. Replacing `fd` closes our pipe write end,
        // which lets the reader thread hit EOF.
        if unsafe { libc::dup2(self.saved.as_raw_fd(), self.fd) } == -1 {
            return;
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

fn flush_std(stream: CapturedStream) {
    let _ = match stream {
        CapturedStream::Stdout => io::stdout().flush(),
        _ => io::stderr().flush(),
    };
}

/// A close-on-exec pipe, so agent subprocesses never hold our read end.
fn pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds: [RawFd; 2] = [-1; 2];
    // SAFETY: `fds` has room for the two descriptors pipe(2) writes.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: pipe(2) succeeded, so both descriptors are open and unowned.
    let (read_end, write_end) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    set_cloexec(&read_end)?;
    set_cloexec(&write_end)?;
    Ok((read_end, write_end))
}

fn set_cloexec(fd: &OwnedFd) -> io::Result<()> {
    // SAFETY: `fd` is open for the duration of both calls.
    unsafe {
        let flags = libc::fcntl(fd.as_raw_fd(), libc::F_GETFD);
        if flags == -1 || libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, flags | libc::FD_CLOEXEC) == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Reader-thread body: whole lines in, `tracing` events out.
fn pump(read_end: OwnedFd, stream: CapturedStream) {
    let mut reader = BufReader::new(File::from(read_end));
    let mut lines = LineBuffer::for_stream(stream);
    let mut chunk = Vec::new();
    loop {
        chunk.clear();
        match reader.read_until(b'\n', &mut chunk) {
            Ok(0) => break,
            Ok(_) => lines.write_bytes(&chunk),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    lines.flush_line();
}
