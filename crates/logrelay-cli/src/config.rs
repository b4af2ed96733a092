//! Configuration file management for logrelay.
//!
//! Provides a TOML-based config file at `~/.config/logrelay/config.toml` and
//! a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use logrelay_core::{CommandAgent, RelayConfig};

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub logging: LoggingSection,
    pub agent: AgentSection,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `EnvFilter` directives, e.g. `info` or `info,logrelay_core=debug`.
    pub level: String,
    /// Line template with `{timestamp}`, `{level}`, `{target}`, `{message}`.
    pub format: String,
    pub poll_interval_ms: u64,
    pub color: bool,
    /// Mirror records to stderr.
    pub console: bool,
    pub capture_std_streams: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        let relay = RelayConfig::default();
        Self {
            level: relay.level,
            format: relay.format,
            poll_interval_ms: relay.poll_interval.as_millis() as u64,
            color: relay.color,
            console: relay.console,
            capture_std_streams: relay.capture_std_streams,
            file: relay.log_file,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Agent binary, looked up on `$PATH` when not absolute.
    pub binary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Extra arguments appended to every agent invocation.
    pub args: Vec<String>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            binary: CommandAgent::DEFAULT_BINARY.to_string(),
            model: None,
            args: Vec::new(),
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the logrelay config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/logrelay` or
/// `~/.config/logrelay`, also on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("logrelay");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("logrelay")
}

/// Return the path to the logrelay config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. `Ok(None)` if there is no file.
pub fn load_config() -> Result<Option<ConfigFile>> {
    let path = config_path();
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given on the command line; `None` means "not given".
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub log_level: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub agent_binary: Option<String>,
    pub model: Option<String>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct ResolvedConfig {
    pub relay: RelayConfig,
    pub agent_binary: String,
    pub model: Option<String>,
    pub agent_args: Vec<String>,
}

impl ResolvedConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - Level: `--log-level` > `LOGRELAY_LOG_LEVEL` > `logging.level` > `info`
    /// - Poll interval: `--poll-interval-ms` > `LOGRELAY_POLL_INTERVAL_MS` > `logging.poll_interval_ms` > 100
    /// - Agent binary: `--agent-binary` > `LOGRELAY_AGENT_BINARY` > `agent.binary` > `claude`
    /// - Model: `--model` > `LOGRELAY_MODEL` > `agent.model` > none
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let file = load_config()?.unwrap_or_default();
        Self::from_parts(cli, file)
    }

    fn from_parts(cli: &CliOverrides, file: ConfigFile) -> Result<Self> {
        let ConfigFile { logging, agent } = file;

        let level = cli
            .log_level
            .clone()
            .or_else(|| env("LOGRELAY_LOG_LEVEL"))
            .unwrap_or(logging.level);

        let poll_interval_ms = match cli.poll_interval_ms {
            Some(ms) => ms,
            None => match env("LOGRELAY_POLL_INTERVAL_MS") {
                Some(raw) => raw.parse().with_context(|| {
                    format!("LOGRELAY_POLL_INTERVAL_MS is not a number of milliseconds: {raw:?}")
                })?,
                None => logging.poll_interval_ms,
            },
        };

        let agent_binary = cli
            .agent_binary
            .clone()
            .or_else(|| env("LOGRELAY_AGENT_BINARY"))
            .unwrap_or(agent.binary);
        let model = cli.model.clone().or_else(|| env("LOGRELAY_MODEL")).or(agent.model);

        let relay = RelayConfig {
            format: logging.format,
            level,
            poll_interval: Duration::from_millis(poll_interval_ms),
            color: logging.color,
            console: logging.console,
            capture_std_streams: logging.capture_std_streams,
            log_file: logging.file,
        };
        relay.validate().context("invalid logging configuration")?;

        Ok(Self {
            relay,
            agent_binary,
            model,
            agent_args: agent.args,
        })
    }

    /// The agent adapter these settings describe.
    pub fn agent(&self) -> CommandAgent {
        let agent = CommandAgent::with_binary(&self.agent_binary).args(&self.agent_args);
        match &self.model {
            Some(model) => agent.model(model),
            None => agent,
        }
    }
}

/// A non-empty environment variable.
fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
