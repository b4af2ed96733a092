//! The `Agent` trait and its result type.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// Token counters reported by the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

/// What one agent invocation produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentResult {
    pub text: String,
    pub usage: TokenUsage,
    /// Wall time of each model cycle, in order.
    pub cycle_durations: Vec<Duration>,
    /// Names of the tools the agent called.
    pub tools_used: BTreeSet<String>,
}

impl AgentResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Sum of all cycle durations.
    pub fn execution_time(&self) -> Duration {
        self.cycle_durations.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

impl fmt::Display for AgentResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A conversational agent reachable through a single blocking call.
///
/// Object-safe so the processor can hold an `Arc<dyn Agent>`.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Human-readable name (e.g. "claude-code").
    fn name(&self) -> &str;

    /// Send `text` and wait for the full answer. Latency is unbounded and
    /// the call cannot be cancelled from outside.
    async fn invoke(&self, text: &str) -> Result<AgentResult>;

    /// Forget conversation state so the next call starts fresh.
    async fn reset(&self) {}
}

const _: () = {
    fn _assert_object_safe(_: &dyn Agent) {}
};

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoAgent;

    #[async_trait]
    impl Agent for EchoAgent {
        fn name(&self) -> &str {
            "echo"
        }

        async fn invoke(&self, text: &str) -> Result<AgentResult> {
            Ok(AgentResult::new(text))
        }
    }

    #[tokio::test]
    async fn agent_is_usable_as_trait_object() {
        let agent: Box<dyn Agent> = Box::new(EchoAgent);
        assert_eq!(agent.name(), "echo");
        let result = agent.invoke("hello").await.unwrap();
        assert_eq!(result.to_string(), "hello");
        agent.reset().await;
    }

    #[test]
    fn execution_time_sums_cycles() {
        let result = AgentResult {
            cycle_durations: vec![Duration::from_millis(1500), Duration::from_millis(250)],
            ..AgentResult::default()
        };
        assert_eq!(result.execution_time(), Duration::from_millis(1750));
    }

    #[test]
    fn whitespace_only_text_is_empty() {
        assert!(AgentResult::new("  \n").is_empty());
        assert!(!AgentResult::new("found 3 videos").is_empty());
    }

    #[test]
    fn usage_accumulates() {
        let mut usage = TokenUsage::default();
        usage += TokenUsage { input_tokens: 10, output_tokens: 5 };
        usage += TokenUsage { input_tokens: 1, output_tokens: 2 };
        assert_eq!(usage.total(), 18);
    }
}
