mod ask_cmd;
mod chat_cmd;
mod config;
#[cfg(test)]
mod test_util;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use logrelay_core::{Agent, LogCapture, RequestProcessor};

use config::{CliOverrides, ResolvedConfig};

#[derive(Parser)]
#[command(name = "logrelay", about = "Live log relay for long-running LLM agent requests")]
struct Cli {
    /// Log level directive (overrides LOGRELAY_LOG_LEVEL)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Relay poll interval in milliseconds, 1-1000 (overrides LOGRELAY_POLL_INTERVAL_MS)
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    /// Agent binary (overrides LOGRELAY_AGENT_BINARY)
    #[arg(long, global = true)]
    agent_binary: Option<String>,

    /// Model passed to the agent (overrides LOGRELAY_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a logrelay config file with the defaults
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Interactive chat with live log output
    Chat,
    /// Ask one question and print the answer
    Ask {
        /// The question to send to the agent
        query: String,
        /// Also print the log lines relayed during the request
        #[arg(long)]
        transcript: bool,
    },
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            log_level: self.log_level.clone(),
            poll_interval_ms: self.poll_interval_ms,
            agent_binary: self.agent_binary.clone(),
            model: self.model.clone(),
        }
    }
}

/// Execute the `logrelay init` command: write the default config file.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile::default();
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  logging.level = {}", cfg.logging.level);
    println!("  logging.poll_interval_ms = {}", cfg.logging.poll_interval_ms);
    println!("  agent.binary = {}", cfg.agent.binary);

    Ok(())
}

/// Install capture and build the processor every request command needs.
fn start(resolved: &ResolvedConfig, console: bool) -> anyhow::Result<(LogCapture, RequestProcessor)> {
    let mut relay = resolved.relay.clone();
    relay.console &= console;
    let capture = LogCapture::install(&relay)?;

    let agent: Arc<dyn Agent> = Arc::new(resolved.agent());
    info!(
        agent = agent.name(),
        binary = %resolved.agent_binary,
        "logrelay ready"
    );
    let processor = RequestProcessor::new(capture.context().clone(), agent);
    Ok((capture, processor))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Init { force } => {
            cmd_init(*force)?;
        }
        Commands::Chat => {
            let resolved = ResolvedConfig::resolve(&cli.overrides())?;
            // chat prints the relay itself; a console mirror would double it.
            let (mut capture, processor) = start(&resolved, false)?;
            let mut out = capture.terminal_stdout()?;
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let result = chat_cmd::run_chat(&processor, capture.drain_all(), stdin, &mut out).await;
            capture.restore();
            result?;
        }
        Commands::Ask { query, transcript } => {
            let resolved = ResolvedConfig::resolve(&cli.overrides())?;
            let (mut capture, processor) = start(&resolved, true)?;
            capture.drain_all();
            let mut out = capture.terminal_stdout()?;
            let result = ask_cmd::run_ask(&processor, query, *transcript, &mut out).await;
            capture.restore();
            result?;
        }
    }

    Ok(())
}
