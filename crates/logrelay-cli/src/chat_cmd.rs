//! `logrelay chat`: interactive loop with live log output.

use std::io::Write;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use logrelay_core::{Processed, RequestProcessor};

const PROMPT: &str = "> ";
const HELP: &str = "Ask a question. `/reset` starts a new conversation, `exit` quits.";

/// Run the chat loop until `exit`, `quit`, or end of input.
///
/// `startup` lines (logs drained before the first request) are printed
/// first. Each request's log lines are printed as they are relayed, then
/// the answer.
pub async fn run_chat<R, W>(
    processor: &RequestProcessor,
    startup: Vec<String>,
    input: R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write + ?Sized,
{
    for line in startup {
        writeln!(out, "{line}")?;
    }
    writeln!(out, "{HELP}")?;

    let mut lines = input.lines();
    let mut transcript = String::new();
    loop {
        write!(out, "{PROMPT}")?;
        out.flush()?;

        let Some(line) = lines.next_line().await.context("failed to read input")? else {
            break;
        };
        let query = line.trim();
        match query {
            "" => continue,
            "exit" | "quit" => break,
            "/reset" => {
                let processed = relay_live(processor, Turn::Reset, &transcript, out).await?;
                writeln!(out, "New conversation started.")?;
                transcript = finish(out, processed)?;
            }
            _ => {
                let processed = relay_live(processor, Turn::Query(query), &transcript, out).await?;
                transcript = finish(out, processed)?;
            }
        }
    }
    Ok(())
}

/// What one turn of the loop sends to the processor.
enum Turn<'a> {
    Query(&'a str),
    Reset,
}

/// Run one turn, printing each relayed line while the request runs.
async fn relay_live<W>(
    processor: &RequestProcessor,
    turn: Turn<'_>,
    transcript: &str,
    out: &mut W,
) -> Result<Processed>
where
    W: Write + ?Sized,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let request = async {
        match turn {
            Turn::Query(query) => processor.process_with_observer(query, transcript, tx).await,
            Turn::Reset => processor.reset_with_observer(transcript, tx).await,
        }
    };
    tokio::pin!(request);

    let processed = loop {
        tokio::select! {
            biased;
            Some(line) = rx.recv() => {
                writeln!(out, "  {line}")?;
                out.flush()?;
            }
            processed = &mut request => break processed,
        }
    };
    while let Ok(line) = rx.try_recv() {
        writeln!(out, "  {line}")?;
    }
    Ok(processed)
}

/// Print the answer and hand back the transcript for the next turn.
fn finish<W: Write + ?Sized>(out: &mut W, processed: Processed) -> Result<String> {
    writeln!(out)?;
    writeln!(out, "{}", processed.output)?;
    writeln!(out)?;
    Ok(processed.transcript)
}
