//! `logrelay ask`: one request, answer on stdout.

use std::io::Write;

use anyhow::Result;

use logrelay_core::RequestProcessor;

/// Run `query` once and print the answer, optionally preceded by the
/// relayed log transcript.
pub async fn run_ask<W>(
    processor: &RequestProcessor,
    query: &str,
    show_transcript: bool,
    out: &mut W,
) -> Result<()>
where
    W: Write + ?Sized,
{
    let processed = processor.process(query, "").await;
    if show_transcript && !processed.transcript.is_empty() {
        writeln!(out, "{}", processed.transcript)?;
        writeln!(out)?;
    }
    writeln!(out, "{}", processed.output)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use logrelay_test_utils::{ScriptedAgent, capture_subscriber, isolated_context};

    async fn ask(agent: ScriptedAgent, show_transcript: bool) -> String {
        let context = isolated_context(Duration::from_millis(10));
        let _guard = tracing::subscriber::set_default(capture_subscriber(&context));
        let processor = RequestProcessor::new(context, Arc::new(agent));

        let mut out = Vec::new();
        run_ask(&processor, "q", show_transcript, &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn prints_only_the_answer_by_default() {
        let out = ask(ScriptedAgent::replying("done").info("step"), false).await;
        assert_eq!(out, "done\n");
    }

    #[tokio::test]
    async fn transcript_precedes_the_answer() {
        let out = ask(ScriptedAgent::replying("done").info("step"), true).await;
        assert!(out.starts_with("INFO | logrelay_core::processor | Processing started for user query.\n"));
        assert!(out.contains("INFO | scripted_agent | step\n"));
        assert!(out.ends_with("\n\ndone\n"));
    }
}
