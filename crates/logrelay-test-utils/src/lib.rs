//! Shared test utilities for logrelay integration tests.
//!
//! Provides a [`ScriptedAgent`] that logs and sleeps on a fixed script
//! instead of calling a real model, and helpers for building an isolated
//! relay context with a capture subscriber bound to it.

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing_subscriber::layer::SubscriberExt;

use logrelay_core::{
    Agent, AgentResult, CaptureLayer, LineFormat, LogQueue, RelayContext, TokenUsage,
};

/// Template used by [`capture_subscriber`]: `LEVEL | target | message`.
pub const TEST_TEMPLATE: &str = "{level} | {target} | {message}";

/// Target of every line a [`ScriptedAgent`] logs.
pub const AGENT_TARGET: &str = "scripted_agent";

/// One scripted step, run in order on every invocation.
#[derive(Debug, Clone)]
pub enum Step {
    Info(String),
    Warn(String),
    Sleep(Duration),
}

#[derive(Debug, Clone)]
enum Outcome {
    Reply(AgentResult),
    Fail(String),
}

/// An [`Agent`] that plays back a script of log lines and delays, then
/// replies or fails.
#[derive(Debug)]
pub struct ScriptedAgent {
    steps: Vec<Step>,
    outcome: Outcome,
    queries: Mutex<Vec<String>>,
    resets: AtomicUsize,
}

impl ScriptedAgent {
    /// An agent that answers `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        Self::with_outcome(Outcome::Reply(AgentResult::new(text)))
    }

    /// An agent whose call fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_outcome(Outcome::Fail(message.into()))
    }

    fn with_outcome(outcome: Outcome) -> Self {
        Self {
            steps: Vec::new(),
            outcome,
            queries: Mutex::new(Vec::new()),
            resets: AtomicUsize::new(0),
        }
    }

    pub fn info(mut self, line: impl Into<String>) -> Self {
        self.steps.push(Step::Info(line.into()));
        self
    }

    pub fn warn(mut self, line: impl Into<String>) -> Self {
        self.steps.push(Step::Warn(line.into()));
        self
    }

    pub fn sleep(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Sleep(duration));
        self
    }

    /// Report `usage`, one cycle of `cycle`, and `tools` on success.
    pub fn with_metrics(mut self, usage: TokenUsage, cycle: Duration, tools: &[&str]) -> Self {
        if let Outcome::Reply(result) = &mut self.outcome {
            result.usage = usage;
            result.cycle_durations = vec![cycle];
            result.tools_used = tools.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>();
        }
        self
    }

    /// Every query received, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, text: &str) -> Result<AgentResult> {
        self.queries.lock().unwrap().push(text.to_string());
        for step in &self.steps {
            match step {
                Step::Info(line) => tracing::info!(target: AGENT_TARGET, "{line}"),
                Step::Warn(line) => tracing::warn!(target: AGENT_TARGET, "{line}"),
                Step::Sleep(duration) => tokio::time::sleep(*duration).await,
            }
        }
        match &self.outcome {
            Outcome::Reply(result) => Ok(result.clone()),
            Outcome::Fail(message) => Err(anyhow!("{message}")),
        }
    }

    async fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

/// A fresh context with its own queue and the given poll interval.
pub fn isolated_context(poll_interval: Duration) -> RelayContext {
    RelayContext::new(LogQueue::new(), poll_interval)
}

/// A subscriber that captures into `context`'s queue using [`TEST_TEMPLATE`].
///
/// Install it with `tracing::subscriber::set_default` for the duration of a
/// test running on a current-thread runtime.
pub fn capture_subscriber(
    context: &RelayContext,
) -> impl tracing::Subscriber + Send + Sync + use<> {
    let format = LineFormat::parse(TEST_TEMPLATE).expect("test template is valid");
    tracing_subscriber::registry().with(CaptureLayer::new(context.queue().clone(), format))
}
