//! The per-request relay worker.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::buffer::DisplayBuffer;
use super::signal::StopSignal;
use crate::queue::LogQueue;

/// Drains a [`LogQueue`] into a [`DisplayBuffer`] until stopped.
///
/// The worker exits only when, after a poll interval with nothing to pop,
/// the stop signal is set and the queue is empty. Lines that arrive while
/// it is winding down are still relayed.
#[derive(Debug)]
pub struct RelayWorker {
    buffer: DisplayBuffer,
    queue: LogQueue,
    poll_interval: Duration,
    stop: StopSignal,
    observer: Option<mpsc::UnboundedSender<String>>,
}

impl RelayWorker {
    pub fn new(
        buffer: DisplayBuffer,
        queue: LogQueue,
        poll_interval: Duration,
        stop: StopSignal,
    ) -> Self {
        Self {
            buffer,
            queue,
            poll_interval,
            stop,
            observer: None,
        }
    }

    /// Also send each relayed line to `observer` as it is appended.
    ///
    /// A closed observer is ignored; the buffer is still filled.
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<String>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run the relay loop on the current task.
    pub async fn run(mut self) {
        let mut relayed = 0usize;
        loop {
            match self.queue.pop_timeout(self.poll_interval).await {
                Some(line) => {
                    if let Some(observer) = &self.observer {
                        if observer.send(line.clone()).is_err() {
                            self.observer = None;
                        }
                    }
                    self.buffer.push(line);
                    relayed += 1;
                }
                None => {
                    if self.stop.is_set() && self.queue.is_empty() {
                        break;
                    }
                }
            }
        }
        debug!(relayed, "relay worker finished");
    }

    /// Run the relay loop on its own tokio task.
    pub fn spawn(self) -> RelayHandle {
        let stop = self.stop.clone();
        RelayHandle {
            handle: tokio::spawn(self.run()),
            stop,
        }
    }
}

/// Owner's side of a spawned [`RelayWorker`].
#[derive(Debug)]
pub struct RelayHandle {
    handle: JoinHandle<()>,
    stop: StopSignal,
}

impl RelayHandle {
    pub fn stop(&self) {
        self.stop.set();
    }

    /// Wait for the worker to finish. Once this returns the buffer no
    /// longer changes.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            warn!(error = %e, "relay worker ended abnormally");
        }
    }

    /// Set the stop signal, then wait for the worker to drain and exit.
    pub async fn stop_and_join(self) {
        self.stop();
        self.join().await;
    }
}
