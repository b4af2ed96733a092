//! Integration tests for `RequestProcessor` with a scripted agent.
//!
//! Each test binds a capture subscriber to its own queue with
//! `set_default` and runs on a current-thread runtime, so the agent, the
//! processor, and the relay worker all log into that queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use logrelay_core::processor::{NO_RESULTS, RESET_QUERY};
use logrelay_core::{RequestProcessor, TokenUsage};
use logrelay_test_utils::{ScriptedAgent, capture_subscriber, isolated_context};

const POLL: Duration = Duration::from_millis(20);

fn processor(agent: Arc<ScriptedAgent>) -> (RequestProcessor, tracing::subscriber::DefaultGuard) {
    let context = isolated_context(POLL);
    let guard = tracing::subscriber::set_default(capture_subscriber(&context));
    (RequestProcessor::new(context, agent), guard)
}

fn lines(transcript: &str) -> Vec<&str> {
    transcript.lines().collect()
}

// -----------------------------------------------------------------------
// Success path
// -----------------------------------------------------------------------

#[tokio::test]
async fn answer_and_agent_logs_are_returned() {
    let agent = Arc::new(
        ScriptedAgent::replying("Use the weekly report.")
            .info("Searching index")
            .sleep(Duration::from_millis(30))
            .warn("slow tool")
            .with_metrics(
                TokenUsage {
                    input_tokens: 120,
                    output_tokens: 30,
                },
                Duration::from_millis(1500),
                &["keyword_search", "read_doc"],
            ),
    );
    let (processor, _guard) = processor(agent.clone());

    let result = processor.process("where is the report?", "").await;

    assert_eq!(result.output, "Use the weekly report.");
    assert_eq!(agent.queries(), vec!["where is the report?"]);
    let transcript = lines(&result.transcript);
    assert_eq!(
        transcript,
        vec![
            "INFO | logrelay_core::processor | Processing started for user query.",
            "INFO | scripted_agent | Searching index",
            "WARNING | scripted_agent | slow tool",
            "INFO | logrelay_core::processor | Processing complete.",
            "INFO | logrelay_core::processor | Total tokens: 150",
            "INFO | logrelay_core::processor | Execution time: 1.50 seconds",
            "INFO | logrelay_core::processor | Tools used: [keyword_search, read_doc]",
        ]
    );
}

#[tokio::test]
async fn empty_answer_becomes_no_results() {
    let agent = Arc::new(ScriptedAgent::replying("   "));
    let (processor, _guard) = processor(agent);

    let result = processor.process("anything", "").await;

    assert_eq!(result.output, NO_RESULTS);
}

#[tokio::test]
async fn second_request_extends_first_transcript() {
    let agent = Arc::new(ScriptedAgent::replying("ok").info("working"));
    let (processor, _guard) = processor(agent);

    let first = processor.process("one", "").await;
    let second = processor.process("two", &first.transcript).await;

    assert!(second.transcript.starts_with(&first.transcript));
    let first_len = lines(&first.transcript).len();
    let second_len = lines(&second.transcript).len();
    assert_eq!(second_len, first_len * 2);
}

#[tokio::test]
async fn prior_transcript_is_kept_verbatim() {
    let agent = Arc::new(ScriptedAgent::replying("ok"));
    let (processor, _guard) = processor(agent);

    let result = processor.process("q", "earlier line 1\nearlier line 2").await;

    let transcript = lines(&result.transcript);
    assert_eq!(&transcript[..2], &["earlier line 1", "earlier line 2"]);
    assert!(transcript.len() > 2);
}

// -----------------------------------------------------------------------
// Failure path
// -----------------------------------------------------------------------

#[tokio::test]
async fn agent_error_is_returned_as_output_and_logged() {
    let agent = Arc::new(ScriptedAgent::failing("timeout").info("calling model"));
    let (processor, _guard) = processor(agent);

    let result = processor.process("q", "").await;

    assert_eq!(result.output, "Error: timeout");
    let transcript = lines(&result.transcript);
    assert!(transcript.contains(&"INFO | scripted_agent | calling model"));
    assert_eq!(
        transcript.last().copied(),
        Some("ERROR | logrelay_core::processor | Query processing failed: timeout")
    );
    assert!(!result.transcript.contains("Processing complete."));
}

#[tokio::test]
async fn processor_recovers_after_a_failure() {
    let failing = Arc::new(ScriptedAgent::failing("boom"));
    let (processor, guard) = processor(failing);
    let failed = processor.process("q", "").await;
    drop(guard);

    let context = processor.context().clone();
    let _guard = tracing::subscriber::set_default(capture_subscriber(&context));
    let processor = RequestProcessor::new(context, Arc::new(ScriptedAgent::replying("fine")));
    let result = processor.process("again", &failed.transcript).await;

    assert_eq!(result.output, "fine");
    assert!(result.transcript.starts_with(&failed.transcript));
}

#[tokio::test]
async fn abandoned_request_releases_the_shared_queue() {
    let agent = Arc::new(ScriptedAgent::replying("late").sleep(Duration::from_secs(60)));
    let (processor, _guard) = processor(agent);

    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), processor.process("q", "")).await;
    assert!(abandoned.is_err(), "request should still be running");

    // Give the orphaned worker a few polls to notice and exit.
    tokio::time::sleep(POLL * 5).await;
    let queue = processor.context().queue().clone();
    queue.push("idle line");
    tokio::time::sleep(POLL * 5).await;

    assert_eq!(queue.drain_all(), vec!["idle line"]);
}

// -----------------------------------------------------------------------
// Reset and observers
// -----------------------------------------------------------------------

#[tokio::test]
async fn reset_clears_agent_state_and_sends_reset_query() {
    let agent = Arc::new(ScriptedAgent::replying("Sure."));
    let (processor, _guard) = processor(agent.clone());

    let result = processor.reset("").await;

    assert_eq!(result.output, "Sure.");
    assert_eq!(agent.reset_count(), 1);
    assert_eq!(agent.queries(), vec![RESET_QUERY]);
}

#[tokio::test]
async fn reset_with_observer_relays_its_lines() {
    let agent = Arc::new(ScriptedAgent::replying("Sure.").info("forgetting"));
    let (processor, _guard) = processor(agent.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let result = processor.reset_with_observer("", tx).await;

    assert_eq!(result.output, "Sure.");
    assert_eq!(agent.reset_count(), 1);
    let mut seen = Vec::new();
    while let Ok(line) = rx.try_recv() {
        seen.push(line);
    }
    assert!(seen.contains(&"INFO | scripted_agent | forgetting".to_string()));
}

#[tokio::test]
async fn observer_receives_the_relayed_lines() {
    let agent = Arc::new(ScriptedAgent::replying("ok").info("visible live"));
    let (processor, _guard) = processor(agent);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let result = processor.process_with_observer("q", "prior", tx).await;

    let mut seen = Vec::new();
    while let Ok(line) = rx.try_recv() {
        seen.push(line);
    }
    let relayed: Vec<String> = lines(&result.transcript)
        .into_iter()
        .skip(1)
        .map(str::to_string)
        .collect();
    assert_eq!(seen, relayed);
    assert!(seen.iter().any(|l| l.ends_with("visible live")));
}
