//! Route panic reports through the log path.

use std::panic::{self, PanicHookInfo};

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>;

/// Keeps the previous panic hook so it can be reinstated.
pub(crate) struct PanicCapture {
    previous: Option<PanicHook>,
}

impl PanicCapture {
    /// Replace the panic hook with one that logs at ERROR, target `panic`.
    pub(crate) fn install() -> Self {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(report));
        Self {
            previous: Some(previous),
        }
    }

    pub(crate) fn restore(&mut self) {
        if let Some(previous) = self.previous.take() {
            panic::set_hook(previous);
        }
    }
}

impl Drop for PanicCapture {
    fn drop(&mut self) {
        self.restore();
    }
}

impl std::fmt::Debug for PanicCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanicCapture")
            .field("installed", &self.previous.is_some())
            .finish()
    }
}

fn report(info: &PanicHookInfo<'_>) {
    let payload = info.payload();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    let thread = std::thread::current();
    let thread = thread.name().unwrap_or("<unnamed>");
    match info.location() {
        Some(location) => tracing::error!(
            target: "panic",
            "thread '{thread}' panicked at {}:{}: {message}",
            location.file(),
            location.line()
        ),
        None => tracing::error!(target: "panic", "thread '{thread}' panicked: {message}"),
    }
}
