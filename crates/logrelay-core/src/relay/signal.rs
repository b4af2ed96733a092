//! One-shot stop flag for a relay worker.

use tokio_util::sync::{CancellationToken, DropGuard};

/// "No new work will be submitted." Setting it more than once is a no-op,
/// and checking it never blocks.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    token: CancellationToken,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.token.cancel();
    }

    pub fn is_set(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A guard that sets the signal when dropped, unless disarmed.
    pub fn set_on_drop(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }
}
