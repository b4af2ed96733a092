//! Adapts fragment-oriented writers to line-oriented logging.

use std::borrow::Cow;
use std::fmt;
use std::io;

type LineSink = Box<dyn FnMut(&str) + Send>;

/// Accumulates write fragments and forwards each complete, trimmed,
/// non-blank line to a sink.
///
/// A trailing fragment without a newline stays buffered until a later
/// write supplies the newline or [`LineBuffer::flush_line`] is called.
/// Bytes are decoded only once a line is complete, so a UTF-8 sequence
/// split across writes survives intact.
pub struct LineBuffer {
    pending: Vec<u8>,
    sink: LineSink,
}

impl LineBuffer {
    pub fn new(sink: impl FnMut(&str) + Send + 'static) -> Self {
        Self {
            pending: Vec::new(),
            sink: Box::new(sink),
        }
    }

    /// A buffer whose completed lines become `tracing` events for `stream`.
    pub fn for_stream(stream: CapturedStream) -> Self {
        Self::new(move |line| stream.emit(line))
    }

    /// Append a fragment, emitting every line it completes.
    pub fn write_str(&mut self, fragment: &str) {
        self.write_bytes(fragment.as_bytes());
    }

    /// Append raw bytes, emitting every line they complete. Invalid UTF-8
    /// in a completed line is replaced lossily.
    pub fn write_bytes(&mut self, fragment: &[u8]) {
        self.pending.extend_from_slice(fragment);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.emit(&line);
        }
    }

    /// Emit whatever unterminated remainder is buffered.
    pub fn flush_line(&mut self) {
        let rest = std::mem::take(&mut self.pending);
        self.emit(&rest);
    }

    /// Bytes held back waiting for a newline.
    pub fn pending(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.pending)
    }

    fn emit(&mut self, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            (self.sink)(trimmed);
        }
    }
}

impl io::Write for LineBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_line();
        Ok(())
    }
}

impl fmt::Debug for LineBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineBuffer")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

/// A byte stream whose lines are re-emitted as `tracing` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturedStream {
    /// Process stdout: INFO, target `STDOUT`.
    Stdout,
    /// Process stderr: ERROR, target `STDERR`.
    Stderr,
    /// Stderr of an agent subprocess: WARN, target `agent_stderr`.
    AgentStderr,
}

impl CapturedStream {
    pub fn name(self) -> &'static str {
        match self {
            CapturedStream::Stdout => "stdout",
            CapturedStream::Stderr => "stderr",
            CapturedStream::AgentStderr => "agent stderr",
        }
    }

    // Targets and levels must be constants in the tracing macros.
    fn emit(self, line: &str) {
        match self {
            CapturedStream::Stdout => tracing::info!(target: "STDOUT", "{line}"),
            CapturedStream::Stderr => tracing::error!(target: "STDERR", "{line}"),
            CapturedStream::AgentStderr => tracing::warn!(target: "agent_stderr", "{line}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    fn collecting() -> (LineBuffer, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let buffer = LineBuffer::new(move |line| sink.lock().unwrap().push(line.to_string()));
        (buffer, lines)
    }

    #[test]
    fn splits_one_fragment_into_lines() {
        let (mut buf, lines) = collecting();
        buf.write_str("A\nB\nC");
        assert_eq!(*lines.lock().unwrap(), vec!["A", "B"]);
        buf.flush_line();
        assert_eq!(*lines.lock().unwrap(), vec!["A", "B", "C"]);
    }

    #[test]
    fn unterminated_fragment_waits_for_newline() {
        let (mut buf, lines) = collecting();
        buf.write_str("partial");
        assert!(lines.lock().unwrap().is_empty());
        assert_eq!(buf.pending(), "partial");

        buf.write_str(" line\nnext");
        assert_eq!(*lines.lock().unwrap(), vec!["partial line"]);
        assert_eq!(buf.pending(), "next");
    }

    #[test]
    fn blank_lines_are_discarded() {
        let (mut buf, lines) = collecting();
        buf.write_str("\n   \n\t\nreal\n  \n");
        buf.flush_line();
        assert_eq!(*lines.lock().unwrap(), vec!["real"]);
    }

    #[test]
    fn lines_are_trimmed() {
        let (mut buf, lines) = collecting();
        buf.write_str("   padded\t\r\n");
        assert_eq!(*lines.lock().unwrap(), vec!["padded"]);
    }

    #[test]
    fn flush_clears_the_accumulator() {
        let (mut buf, lines) = collecting();
        buf.write_str("tail  ");
        buf.flush_line();
        buf.flush_line();
        assert_eq!(*lines.lock().unwrap(), vec!["tail"]);
        assert_eq!(buf.pending(), "");
    }

    #[test]
    fn io_write_forwards_lossy_utf8() {
        let (mut buf, lines) = collecting();
        buf.write_all(b"caf\xc3\xa9\n\xffbad\n").unwrap();
        buf.flush().unwrap();
        let got = lines.lock().unwrap().clone();
        assert_eq!(got[0], "café");
        assert_eq!(got[1], "\u{FFFD}bad");
    }

    #[test]
    fn utf8_sequence_split_across_writes_is_kept() {
        let (mut buf, lines) = collecting();
        buf.write_all(b"caf\xc3").unwrap();
        buf.write_all(b"\xa9\n").unwrap();
        assert_eq!(*lines.lock().unwrap(), vec!["café"]);
    }

    #[test]
    fn split_sequence_in_unterminated_tail_is_kept_on_flush() {
        let (mut buf, lines) = collecting();
        buf.write_bytes(b"na\xc3");
        buf.write_bytes(b"\xafve");
        buf.flush_line();
        assert_eq!(*lines.lock().unwrap(), vec!["naïve"]);
    }
}
