//! What the observer currently sees for one request.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Ordered lines appended by a single relay worker.
///
/// Clones share storage: the request processor keeps one handle to read
/// the result, the worker holds another to append. Only the worker appends.
#[derive(Debug, Clone, Default)]
pub struct DisplayBuffer {
    lines: Arc<Mutex<Vec<String>>>,
}

impl DisplayBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a previous transcript ("logs so far").
    ///
    /// Splits on `\n` exactly, so `from_transcript(t).transcript() == t`.
    pub fn from_transcript(transcript: &str) -> Self {
        if transcript.is_empty() {
            return Self::new();
        }
        Self::from_lines(transcript.split('\n').map(str::to_string).collect())
    }

    pub fn from_lines(lines: Vec<String>) -> Self {
        Self {
            lines: Arc::new(Mutex::new(lines)),
        }
    }

    fn lines(&self) -> MutexGuard<'_, Vec<String>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, line: String) {
        self.lines().push(line);
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines().clone()
    }

    pub fn len(&self) -> usize {
        self.lines().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines().is_empty()
    }

    /// All lines joined with `\n`.
    pub fn transcript(&self) -> String {
        self.lines().join("\n")
    }
}
