//! Log capture: the single entry point that funnels every log-worthy output
//! of the process into the relay queue.
//!
//! [`LogCapture::install`] is the one place global state is touched. It
//! installs the global `tracing` subscriber (which also bridges `log`
//! records), redirects stdout/stderr, and replaces the panic hook. The
//! returned guard undoes the redirection and the hook on
//! [`LogCapture::restore`] or drop; the subscriber stays for the life of the
//! process.

mod layer;
mod panic_hook;
#[cfg(unix)]
mod redirect;

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::queue::LogQueue;
use crate::relay::RelayContext;

pub use layer::CaptureLayer;
#[cfg(unix)]
pub use redirect::StdStreamRedirect;

use panic_hook::PanicCapture;

/// Guard for the installed capture. Owns the process-scoped [`RelayContext`].
#[derive(Debug)]
pub struct LogCapture {
    context: RelayContext,
    #[cfg(unix)]
    redirect: Option<StdStreamRedirect>,
    panic: Option<PanicCapture>,
}

impl LogCapture {
    /// Install capture for the whole process.
    ///
    /// Fails if the configuration is invalid, a global subscriber already
    /// exists, the log file cannot be opened, or redirection fails.
    pub fn install(config: &RelayConfig) -> Result<Self, RelayError> {
        config.validate()?;
        let format = config.line_format()?;
        let filter = config.env_filter()?;
        let context = RelayContext::new(LogQueue::new(), config.poll_interval);

        let console = if config.console {
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(config.color)
                    .with_writer(console_writer()),
            )
        } else {
            None
        };

        let file = match &config.log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(path)
                    .map_err(|source| RelayError::LogFile {
                        path: path.clone(),
                        source,
                    })?;
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
            }
            None => None,
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(CaptureLayer::new(context.queue().clone(), format))
            .with(console)
            .with(file)
            .try_init()
            .map_err(|e| RelayError::AlreadyInstalled(e.to_string()))?;

        let mut capture = Self {
            context,
            #[cfg(unix)]
            redirect: None,
            panic: Some(PanicCapture::install()),
        };

        if config.capture_std_streams {
            capture.redirect_std_streams()?;
        }

        tracing::debug!(
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            std_streams = config.capture_std_streams,
            "log capture installed"
        );
        Ok(capture)
    }

    #[cfg(unix)]
    fn redirect_std_streams(&mut self) -> Result<(), RelayError> {
        self.redirect = Some(StdStreamRedirect::capture()?);
        Ok(())
    }

    #[cfg(not(unix))]
    fn redirect_std_streams(&mut self) -> Result<(), RelayError> {
        tracing::warn!("stdout/stderr redirection is not supported on this platform");
        Ok(())
    }

    pub fn context(&self) -> &RelayContext {
        &self.context
    }

    /// Handle to the shared queue.
    pub fn get_queue(&self) -> LogQueue {
        self.context.queue().clone()
    }

    /// Remove and return every queued line without waiting.
    pub fn drain_all(&self) -> Vec<String> {
        self.context.queue().drain_all()
    }

    /// A writer to the real terminal stdout, bypassing redirection.
    pub fn terminal_stdout(&self) -> io::Result<Box<dyn Write + Send>> {
        #[cfg(unix)]
        {
            if let Some(redirect) = &self.redirect {
                return Ok(Box::new(redirect.original_stdout()?));
            }
        }
        Ok(Box::new(io::stdout()))
    }

    /// Undo stream redirection and the panic hook. Idempotent.
    pub fn restore(&mut self) {
        #[cfg(unix)]
        {
            if let Some(mut redirect) = self.redirect.take() {
                redirect.restore();
            }
        }
        if let Some(mut panic) = self.panic.take() {
            panic.restore();
        }
    }
}

impl Drop for LogCapture {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Console output goes to a duplicate of stderr taken before redirection,
/// so mirrored records never loop back into the capture.
fn console_writer() -> BoxMakeWriter {
    match duplicate_stderr() {
        Ok(file) => BoxMakeWriter::new(Mutex::new(file)),
        Err(_) => BoxMakeWriter::new(io::stderr),
    }
}

#[cfg(unix)]
fn duplicate_stderr() -> io::Result<File> {
    use std::os::fd::AsFd;
    Ok(File::from(io::stderr().as_fd().try_clone_to_owned()?))
}

#[cfg(not(unix))]
fn duplicate_stderr() -> io::Result<File> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "no stderr duplicate"))
}
