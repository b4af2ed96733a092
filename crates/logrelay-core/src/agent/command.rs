//! Agent adapter for stream-json agent CLIs such as Claude Code.
//!
//! Each call runs `claude -p <query> --output-format stream-json --verbose`
//! and parses its JSONL stdout. Assistant messages and tool calls are logged
//! as they arrive, so they show up in the live relay while the call is still
//! running. The session id from the stream is kept and passed back with
//! `--resume` to continue the conversation.

use std::collections::BTreeSet;
use std::pin::pin;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::trait_def::{Agent, AgentResult, TokenUsage};
use crate::line_buffer::{CapturedStream, LineBuffer};

/// Longest message text logged per line before truncation.
const LOG_PREVIEW_CHARS: usize = 200;

/// Harness for an agent CLI speaking the stream-json protocol.
#[derive(Clone)]
pub struct CommandAgent {
    /// Path to the agent binary. Defaults to `"claude"` (found via `$PATH`).
    binary: String,
    model: Option<String>,
    extra_args: Vec<String>,
    /// Session to resume on the next call.
    session: Arc<Mutex<Option<String>>>,
}

impl std::fmt::Debug for CommandAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandAgent")
            .field("binary", &self.binary)
            .field("model", &self.model)
            .field("extra_args", &self.extra_args)
            .finish()
    }
}

impl CommandAgent {
    pub const DEFAULT_BINARY: &'static str = "claude";

    /// An adapter that looks for `claude` on `$PATH`.
    pub fn new() -> Self {
        Self::with_binary(Self::DEFAULT_BINARY)
    }

    pub fn with_binary(path: impl Into<String>) -> Self {
        Self {
            binary: path.into(),
            model: None,
            extra_args: Vec::new(),
            session: Arc::new(Mutex::new(None)),
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Extra arguments appended after the built-in flags.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The session the next call will resume, if any.
    pub async fn session_id(&self) -> Option<String> {
        self.session.lock().await.clone()
    }

    fn command(&self, text: &str, resume: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-p")
            .arg(text)
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose");
        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(session) = resume {
            cmd.arg("--resume").arg(session);
        }
        cmd.args(&self.extra_args);

        // stdout carries the protocol, stderr is relayed as log lines, and
        // stdin is closed so the agent never waits for input.
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for CommandAgent {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// stream-json parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum StreamEvent {
    Session {
        id: String,
    },
    Message {
        content: String,
    },
    ToolCall {
        tool: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool: String,
        output: serde_json::Value,
    },
    Usage(TokenUsage),
    Result {
        text: Option<String>,
        usage: Option<TokenUsage>,
        is_error: bool,
    },
    Error {
        message: String,
    },
}

fn parse_usage(v: &serde_json::Value) -> Option<TokenUsage> {
    let usage = v.get("usage")?;
    let usage = TokenUsage {
        input_tokens: usage.get("input_tokens").and_then(|t| t.as_u64()).unwrap_or(0),
        output_tokens: usage.get("output_tokens").and_then(|t| t.as_u64()).unwrap_or(0),
    };
    (usage.total() > 0).then_some(usage)
}

fn str_field<'a>(v: &'a serde_json::Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| v.get(*k).and_then(|s| s.as_str()))
}

/// Parse one JSONL line into zero or more events.
///
/// `Err` means the line was not JSON; callers log it and keep reading.
fn parse_stream_json_line(line: &str) -> Result<Vec<StreamEvent>> {
    let v: serde_json::Value =
        serde_json::from_str(line).context("malformed JSON in stream output")?;

    let mut events = Vec::new();
    let event_type = v.get("type").and_then(|t| t.as_str()).unwrap_or("");

    match event_type {
        "system" => {
            if let Some(id) = str_field(&v, &["session_id"]) {
                events.push(StreamEvent::Session { id: id.to_string() });
            }
        }

        "assistant" => {
            if let Some(message) = v.get("message") {
                let blocks = message.get("content").and_then(|c| c.as_array());
                for block in blocks.into_iter().flatten() {
                    match block.get("type").and_then(|t| t.as_str()) {
                        Some("text") => {
                            if let Some(text) = str_field(block, &["text"]) {
                                events.push(StreamEvent::Message {
                                    content: text.to_string(),
                                });
                            }
                        }
                        Some("tool_use") => events.push(StreamEvent::ToolCall {
                            tool: str_field(block, &["name"]).unwrap_or("unknown").to_string(),
                            input: block.get("input").cloned().unwrap_or_default(),
                        }),
                        _ => {}
                    }
                }
                if let Some(usage) = parse_usage(message) {
                    events.push(StreamEvent::Usage(usage));
                }
            }
        }

        // Tool results come back wrapped in a user turn.
        "user" => {
            let blocks = v
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_array());
            for block in blocks.into_iter().flatten() {
                if block.get("type").and_then(|t| t.as_str()) == Some("tool_result") {
                    events.push(StreamEvent::ToolResult {
                        tool: str_field(block, &["tool_use_id", "name"])
                            .unwrap_or("unknown")
                            .to_string(),
                        output: block.get("content").cloned().unwrap_or_default(),
                    });
                }
            }
        }

        "tool_use" => events.push(StreamEvent::ToolCall {
            tool: str_field(&v, &["name", "tool"]).unwrap_or("unknown").to_string(),
            input: v.get("input").cloned().unwrap_or_default(),
        }),

        "tool_result" => events.push(StreamEvent::ToolResult {
            tool: str_field(&v, &["name", "tool"]).unwrap_or("unknown").to_string(),
            output: v
                .get("output")
                .or_else(|| v.get("content"))
                .cloned()
                .unwrap_or_default(),
        }),

        "result" => {
            if let Some(id) = str_field(&v, &["session_id"]) {
                events.push(StreamEvent::Session { id: id.to_string() });
            }
            let is_error = v.get("is_error").and_then(|e| e.as_bool()).unwrap_or(false)
                || str_field(&v, &["subtype"]).is_some_and(|s| s.starts_with("error"));
            events.push(StreamEvent::Result {
                text: str_field(&v, &["result"]).map(str::to_string),
                usage: parse_usage(&v),
                is_error,
            });
        }

        "error" => {
            let message = v
                .get("error")
                .and_then(|e| str_field(e, &["message"]))
                .or_else(|| str_field(&v, &["message"]))
                .unwrap_or("unknown error")
                .to_string();
            events.push(StreamEvent::Error { message });
        }

        other => {
            debug!(event_type = other, "ignoring unrecognised stream-json event type");
        }
    }

    Ok(events)
}

/// Parsed events from the agent's stdout, ending at EOF.
fn stream_events(stdout: ChildStdout) -> impl Stream<Item = StreamEvent> + Send {
    async_stream::stream! {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match parse_stream_json_line(trimmed) {
                        Ok(events) => {
                            for event in events {
                                yield event;
                            }
                        }
                        Err(e) => warn!(line = trimmed, error = %e, "skipping malformed JSONL line"),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    yield StreamEvent::Error { message: format!("stdout read error: {e}") };
                    break;
                }
            }
        }
    }
}

/// Relay the agent's stderr as WARNING lines.
async fn forward_stderr(mut stderr: ChildStderr) {
    let mut lines = LineBuffer::for_stream(CapturedStream::AgentStderr);
    let mut chunk = [0u8; 4096];
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => lines.write_bytes(&chunk[..n]),
        }
    }
    lines.flush_line();
}

fn preview(text: &str) -> String {
    if text.chars().count() <= LOG_PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(LOG_PREVIEW_CHARS - 3).collect();
    format!("{cut}...")
}

// ---------------------------------------------------------------------------
// Per-call accumulation
// ---------------------------------------------------------------------------

/// Everything observed during one call, folded into an [`AgentResult`].
#[derive(Debug)]
struct CallState {
    messages: Vec<String>,
    final_text: Option<String>,
    usage: TokenUsage,
    reported_usage: Option<TokenUsage>,
    cycle_durations: Vec<Duration>,
    cycle_started: Instant,
    tools_used: BTreeSet<String>,
    error: Option<String>,
    session_id: Option<String>,
}

impl CallState {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            final_text: None,
            usage: TokenUsage::default(),
            reported_usage: None,
            cycle_durations: Vec::new(),
            cycle_started: Instant::now(),
            tools_used: BTreeSet::new(),
            error: None,
            session_id: None,
        }
    }

    fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Session { id } => self.session_id = Some(id),
            StreamEvent::Message { content } => {
                let now = Instant::now();
                self.cycle_durations.push(now - self.cycle_started);
                self.cycle_started = now;
                info!(target: "agent", "{}", preview(&content));
                self.messages.push(content);
            }
            StreamEvent::ToolCall { tool, input } => {
                info!(target: "agent", tool = %tool, input = %input, "calling tool");
                self.tools_used.insert(tool);
            }
            StreamEvent::ToolResult { tool, output } => {
                let size = output.to_string().len();
                debug!(target: "agent", tool = %tool, bytes = size, "tool returned");
            }
            StreamEvent::Usage(usage) => self.usage += usage,
            StreamEvent::Result {
                text,
                usage,
                is_error,
            } => {
                if is_error {
                    self.error = Some(text.clone().unwrap_or_else(|| "agent run failed".to_string()));
                }
                self.final_text = text;
                // The result line carries the cumulative total.
                self.reported_usage = usage;
            }
            StreamEvent::Error { message } => {
                warn!(target: "agent", "{message}");
                self.error = Some(message);
            }
        }
    }

    fn finish(self, status: ExitStatus) -> Result<AgentResult> {
        if let Some(error) = self.error {
            bail!("agent reported an error: {error}");
        }
        if !status.success() {
            bail!("agent exited with {status}");
        }
        let text = self
            .final_text
            .or_else(|| self.messages.last().cloned())
            .unwrap_or_default();
        Ok(AgentResult {
            text,
            usage: self.reported_usage.unwrap_or(self.usage),
            cycle_durations: self.cycle_durations,
            tools_used: self.tools_used,
        })
    }
}

// ---------------------------------------------------------------------------
// Agent trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl Agent for CommandAgent {
    fn name(&self) -> &str {
        "claude-code"
    }

    async fn invoke(&self, text: &str) -> Result<AgentResult> {
        let resume = self.session.lock().await.clone();
        let mut child = self.command(text, resume.as_deref()).spawn().with_context(|| {
            format!(
                "failed to spawn agent binary at '{}' -- is it installed and on PATH?",
                self.binary
            )
        })?;
        debug!(pid = ?child.id(), resumed = resume.is_some(), "agent process started");

        let stdout = child.stdout.take().context("agent stdout was not captured")?;
        let stderr = child.stderr.take().map(|s| tokio::spawn(forward_stderr(s)));

        let mut state = CallState::new();
        let mut events = pin!(stream_events(stdout));
        while let Some(event) = events.next().await {
            state.apply(event);
        }

        let status = child.wait().await.context("failed to wait for agent process")?;
        if let Some(stderr) = stderr {
            let _ = stderr.await;
        }
        if let Some(id) = state.session_id.clone() {
            *self.session.lock().await = Some(id);
        }
        state.finish(status)
    }

    async fn reset(&self) {
        if self.session.lock().await.take().is_some() {
            info!(target: "agent", "conversation reset");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_assistant_text_and_usage() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Found 3 commercials."}],"usage":{"input_tokens":10,"output_tokens":5}}}"#;
        let events = parse_stream_json_line(line).unwrap();
        assert_eq!(
            events,
            vec![
                StreamEvent::Message {
                    content: "Found 3 commercials.".to_string()
                },
                StreamEvent::Usage(TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5
                }),
            ]
        );
    }

    #[test]
    fn parse_assistant_tool_use_block() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"keyword_search","input":{"keywords":["car","beach"]}}]}}"#;
        let events = parse_stream_json_line(line).unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::ToolCall {
                tool: "keyword_search".to_string(),
                input: serde_json::json!({"keywords": ["car", "beach"]}),
            }]
        );
    }

    #[test]
    fn parse_user_turn_tool_result() {
        let line = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"toolu_1","content":"3 hits"}]}}"#;
        let events = parse_stream_json_line(line).unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::ToolResult {
                tool: "toolu_1".to_string(),
                output: serde_json::json!("3 hits"),
            }]
        );
    }

    #[test]
    fn parse_system_init_session() {
        let line = r#"{"type":"system","subtype":"init","session_id":"abc-123"}"#;
        assert_eq!(
            parse_stream_json_line(line).unwrap(),
            vec![StreamEvent::Session {
                id: "abc-123".to_string()
            }]
        );
    }

    #[test]
    fn parse_result_line() {
        let line = r#"{"type":"result","subtype":"success","is_error":false,"result":"done","session_id":"s1","usage":{"input_tokens":100,"output_tokens":40}}"#;
        let events = parse_stream_json_line(line).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            StreamEvent::Result {
                text: Some("done".to_string()),
                usage: Some(TokenUsage {
                    input_tokens: 100,
                    output_tokens: 40
                }),
                is_error: false,
            }
        );
    }

    #[test]
    fn parse_error_subtype_marks_result_as_error() {
        let line = r#"{"type":"result","subtype":"error_max_turns"}"#;
        let events = parse_stream_json_line(line).unwrap();
        assert!(matches!(events[0], StreamEvent::Result { is_error: true, .. }));
    }

    #[test]
    fn parse_error_event() {
        let line = r#"{"type":"error","error":{"message":"rate limited"}}"#;
        assert_eq!(
            parse_stream_json_line(line).unwrap(),
            vec![StreamEvent::Error {
                message: "rate limited".to_string()
            }]
        );
    }

    #[test]
    fn parse_unknown_type_yields_nothing() {
        assert!(parse_stream_json_line(r#"{"type":"ping"}"#).unwrap().is_empty());
    }

    #[test]
    fn parse_malformed_line_is_error() {
        assert!(parse_stream_json_line("not json").is_err());
    }

    #[test]
    fn command_includes_model_resume_and_extra_args() {
        let agent = CommandAgent::with_binary("/opt/agent")
            .model("sonnet")
            .args(["--max-turns", "4"]);
        let cmd = agent.command("find beach ads", Some("sess-9"));
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-p",
                "find beach ads",
                "--output-format",
                "stream-json",
                "--verbose",
                "--model",
                "sonnet",
                "--resume",
                "sess-9",
                "--max-turns",
                "4",
            ]
        );
        assert_eq!(cmd.as_std().get_program(), "/opt/agent");
    }

    #[cfg(unix)]
    fn exit_status(code: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }

    #[cfg(unix)]
    #[test]
    fn call_state_prefers_result_text_and_reported_usage() {
        let mut state = CallState::new();
        state.apply(StreamEvent::Message {
            content: "thinking".to_string(),
        });
        state.apply(StreamEvent::ToolCall {
            tool: "semantic_search".to_string(),
            input: serde_json::Value::Null,
        });
        state.apply(StreamEvent::Usage(TokenUsage {
            input_tokens: 1,
            output_tokens: 1,
        }));
        state.apply(StreamEvent::Result {
            text: Some("final answer".to_string()),
            usage: Some(TokenUsage {
                input_tokens: 50,
                output_tokens: 7,
            }),
            is_error: false,
        });
        let result = state.finish(exit_status(0)).unwrap();
        assert_eq!(result.text, "final answer");
        assert_eq!(result.usage.total(), 57);
        assert_eq!(result.cycle_durations.len(), 1);
        assert!(result.tools_used.contains("semantic_search"));
    }

    #[cfg(unix)]
    #[test]
    fn call_state_falls_back_to_last_message() {
        let mut state = CallState::new();
        state.apply(StreamEvent::Message {
            content: "first".to_string(),
        });
        state.apply(StreamEvent::Message {
            content: "second".to_string(),
        });
        let result = state.finish(exit_status(0)).unwrap();
        assert_eq!(result.text, "second");
        assert_eq!(result.cycle_durations.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn call_state_reports_errors_and_bad_exit() {
        let mut state = CallState::new();
        state.apply(StreamEvent::Error {
            message: "timeout".to_string(),
        });
        let err = state.finish(exit_status(0)).unwrap_err();
        assert!(err.to_string().contains("timeout"), "{err}");

        let err = CallState::new().finish(exit_status(2)).unwrap_err();
        assert!(err.to_string().contains("exited"), "{err}");
    }

    #[test]
    fn preview_truncates_long_text() {
        let long = "x".repeat(500);
        let p = preview(&long);
        assert_eq!(p.chars().count(), LOG_PREVIEW_CHARS);
        assert!(p.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }

    #[tokio::test]
    async fn missing_binary_fails_to_spawn() {
        let agent = CommandAgent::with_binary("/nonexistent/agent-binary");
        let err = agent.invoke("hello").await.unwrap_err();
        assert!(err.to_string().contains("failed to spawn"), "{err}");
    }

    #[tokio::test]
    async fn reset_forgets_session() {
        let agent = CommandAgent::new();
        *agent.session.lock().await = Some("s1".to_string());
        agent.reset().await;
        assert!(agent.session_id().await.is_none());
    }
}
