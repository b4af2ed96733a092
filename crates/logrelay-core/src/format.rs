//! Line format templates.
//!
//! A template is literal text with `{timestamp}`, `{level}`, `{target}` and
//! `{message}` placeholders. `{{` and `}}` produce literal braces.

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::error::RelayError;
use crate::record::LogRecord;

const ANSI_RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Timestamp,
    Level,
    Target,
    Message,
}

/// A parsed template that renders a [`LogRecord`] into one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFormat {
    segments: Vec<Segment>,
    color: bool,
}

impl LineFormat {
    pub const DEFAULT_TEMPLATE: &'static str = "{timestamp} | {level} | {target} | {message}";

    /// `chrono` format used for `{timestamp}`.
    pub const TIMESTAMP_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S%.3f";

    /// Parse a template string.
    ///
    /// Fails on unknown placeholders, unbalanced braces, or a template
    /// without `{message}` (which would silently drop every message).
    pub fn parse(template: &str) -> Result<Self, RelayError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(RelayError::Template(format!(
                            "unclosed placeholder {{{name}"
                        )));
                    }
                    let segment = match name.trim() {
                        "timestamp" => Segment::Timestamp,
                        "level" => Segment::Level,
                        "target" => Segment::Target,
                        "message" => Segment::Message,
                        other => {
                            return Err(RelayError::Template(format!(
                                "unknown placeholder {{{other}}}"
                            )));
                        }
                    };
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(segment);
                }
                '}' => {
                    return Err(RelayError::Template(
                        "unmatched '}' (use '}}' for a literal brace)".to_string(),
                    ));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        if !segments.contains(&Segment::Message) {
            return Err(RelayError::Template(
                "template must contain {message}".to_string(),
            ));
        }

        Ok(Self {
            segments,
            color: false,
        })
    }

    /// Wrap each rendered line in an ANSI color chosen by level.
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Render a record. The result never contains a line break.
    pub fn render(&self, record: &LogRecord) -> String {
        let mut line = String::new();
        if self.color {
            line.push_str(record.level.ansi_color());
        }
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => line.push_str(&single_line(text)),
                Segment::Timestamp => {
                    let _ = write!(line, "{}", record.timestamp.format(Self::TIMESTAMP_FORMAT));
                }
                Segment::Level => line.push_str(record.level.as_str()),
                Segment::Target => line.push_str(&single_line(&record.source)),
                Segment::Message => line.push_str(&single_line(&record.message)),
            }
        }
        if self.color {
            line.push_str(ANSI_RESET);
        }
        line
    }
}

impl Default for LineFormat {
    fn default() -> Self {
        Self {
            segments: vec![
                Segment::Timestamp,
                Segment::Literal(" | ".to_string()),
                Segment::Level,
                Segment::Literal(" | ".to_string()),
                Segment::Target,
                Segment::Literal(" | ".to_string()),
                Segment::Message,
            ],
            color: false,
        }
    }
}

/// Escape line breaks so a record always occupies exactly one line.
fn single_line(text: &str) -> Cow<'_, str> {
    if !text.contains(['\n', '\r']) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace("\r\n", "\\n").replace(['\n', '\r'], "\\n"))
}
