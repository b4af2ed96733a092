//! One request: run the agent while its logs stream into a display buffer.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{Mutex, mpsc};
use tracing::{Instrument, error, info};
use uuid::Uuid;

use crate::agent::Agent;
use crate::relay::{DisplayBuffer, RelayContext, StopSignal};

/// Fixed query sent when the user starts a new conversation.
pub const RESET_QUERY: &str = "Forget our previous conversation.";

/// Reply shown when the agent returns no text.
pub const NO_RESULTS: &str = "No results found. Try a different query.";

/// What a request hands back to the display surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    /// The agent's answer, or a user-facing error message.
    pub output: String,
    /// The prior transcript plus every line relayed during this request.
    pub transcript: String,
}

/// Runs agent requests with a live relay of their log output.
///
/// Requests on one processor run one at a time: the queue is shared
/// process-wide, so two concurrent relay workers would split each other's
/// lines.
pub struct RequestProcessor {
    context: RelayContext,
    agent: Arc<dyn Agent>,
    gate: Mutex<()>,
}

impl std::fmt::Debug for RequestProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestProcessor")
            .field("context", &self.context)
            .field("agent", &self.agent.name())
            .finish()
    }
}

impl RequestProcessor {
    pub fn new(context: RelayContext, agent: Arc<dyn Agent>) -> Self {
        Self {
            context,
            agent,
            gate: Mutex::new(()),
        }
    }

    pub fn context(&self) -> &RelayContext {
        &self.context
    }

    /// Run `query` and return the answer with the extended transcript.
    ///
    /// Never fails: agent errors become the output string and an ERROR line
    /// in the transcript.
    pub async fn process(&self, query: &str, prior_transcript: &str) -> Processed {
        self.run(query, prior_transcript, None).await
    }

    /// Like [`process`](Self::process), also sending each relayed line to
    /// `observer` as soon as it is appended.
    pub async fn process_with_observer(
        &self,
        query: &str,
        prior_transcript: &str,
        observer: mpsc::UnboundedSender<String>,
    ) -> Processed {
        self.run(query, prior_transcript, Some(observer)).await
    }

    /// Start a new conversation: clear agent state, then tell the agent.
    pub async fn reset(&self, prior_transcript: &str) -> Processed {
        self.agent.reset().await;
        self.process(RESET_QUERY, prior_transcript).await
    }

    /// Like [`reset`](Self::reset), with live lines sent to `observer`.
    pub async fn reset_with_observer(
        &self,
        prior_transcript: &str,
        observer: mpsc::UnboundedSender<String>,
    ) -> Processed {
        self.agent.reset().await;
        self.process_with_observer(RESET_QUERY, prior_transcript, observer)
            .await
    }

    async fn run(
        &self,
        query: &str,
        prior_transcript: &str,
        observer: Option<mpsc::UnboundedSender<String>>,
    ) -> Processed {
        let _serial = self.gate.lock().await;

        let buffer = DisplayBuffer::from_transcript(prior_transcript);
        let stop = StopSignal::new();
        let mut worker = self.context.worker(buffer.clone(), stop.clone());
        if let Some(observer) = observer {
            worker = worker.with_observer(observer);
        }
        let relay = worker.spawn();
        // If this future is dropped mid-call, the worker must still wind
        // down instead of draining the shared queue forever.
        let _stop_on_drop = stop.set_on_drop();

        let request_id = Uuid::new_v4();
        let output = self
            .call_agent(query)
            .instrument(tracing::info_span!("request", %request_id))
            .await;

        // Any failure line is already queued by now; only then may the
        // worker start winding down.
        stop.set();
        relay.join().await;

        Processed {
            output,
            transcript: buffer.transcript(),
        }
    }

    async fn call_agent(&self, query: &str) -> String {
        info!("Processing started for user query.");

        let outcome = AssertUnwindSafe(self.agent.invoke(query))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(anyhow::anyhow!("agent '{}' panicked", self.agent.name())));

        match outcome {
            Ok(result) => {
                info!("Processing complete.");
                info!("Total tokens: {}", result.usage.total());
                info!(
                    "Execution time: {:.2} seconds",
                    result.execution_time().as_secs_f64()
                );
                let tools: Vec<&str> = result.tools_used.iter().map(String::as_str).collect();
                info!("Tools used: [{}]", tools.join(", "));

                if result.is_empty() {
                    NO_RESULTS.to_string()
                } else {
                    result.text
                }
            }
            Err(e) => {
                error!("Query processing failed: {e:#}");
                format!("Error: {e:#}")
            }
        }
    }
}
