//! TOML configuration parsing and validation.
//!
//! Every section is optional; a missing key falls back to its default, and
//! [`Config::minimal`] gives the all-defaults configuration used when no
//! config file exists (the `chunk` command runs without one).

use anyhow::{Context, Result};
use md_assist_core::chunk::DEFAULT_MAX_WORDS;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::assistant::PollPolicy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_words")]
    pub max_words: usize,
    /// Directory chunk files are written to. Defaults to the working directory.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_words: DEFAULT_MAX_WORDS,
            output_dir: None,
        }
    }
}

fn default_max_words() -> usize {
    DEFAULT_MAX_WORDS
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub instructions: Option<String>,
    /// Document uploaded by `ask` when `--file` is not given.
    #[serde(default)]
    pub document: Option<PathBuf>,
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub poll: PollConfig,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            name: default_name(),
            instructions: None,
            document: None,
            state_path: default_state_path(),
            timeout_secs: default_timeout_secs(),
            poll: PollConfig::default(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_name() -> String {
    "Protocol Analyzer".to_string()
}
fn default_state_path() -> PathBuf {
    PathBuf::from(".mda/session.toml")
}
fn default_timeout_secs() -> u64 {
    60
}

/// Persona used when `assistant.instructions` is not set.
pub const DEFAULT_INSTRUCTIONS: &str = "You are an expert in network security and protocol \
analysis with deep knowledge of network protocols such as TCP/IP, UDP, HTTP/S, FTP, SSH and \
SPDM, of security principles, and of analysing traffic for signs of malicious activity. Ground \
your answers in the attached documents. Give detailed explanations, best practices for secure \
configuration, and mitigation strategies for common threats, in an informative and \
professional style suited to both beginners and advanced users.";

impl AssistantConfig {
    pub fn instructions(&self) -> &str {
        self.instructions.as_deref().unwrap_or(DEFAULT_INSTRUCTIONS)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollConfig {
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

fn default_initial_interval_ms() -> u64 {
    1000
}
fn default_max_interval_ms() -> u64 {
    8000
}
fn default_deadline_secs() -> u64 {
    600
}

impl PollConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            max_interval: Duration::from_millis(self.max_interval_ms),
            deadline: Duration::from_secs(self.deadline_secs),
        }
    }
}

impl Config {
    /// All-defaults configuration, used when no config file is available.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_words == 0 {
        anyhow::bail!("chunking.max_words must be > 0");
    }

    let assistant = &config.assistant;
    if assistant.base_url.trim().is_empty() {
        anyhow::bail!("assistant.base_url must not be empty");
    }
    if assistant.model.trim().is_empty() {
        anyhow::bail!("assistant.model must not be empty");
    }
    if assistant.timeout_secs == 0 {
        anyhow::bail!("assistant.timeout_secs must be > 0");
    }

    let poll = &assistant.poll;
    if poll.initial_interval_ms == 0 {
        anyhow::bail!("assistant.poll.initial_interval_ms must be > 0");
    }
    if poll.max_interval_ms < poll.initial_interval_ms {
        anyhow::bail!("assistant.poll.max_interval_ms must be >= initial_interval_ms");
    }
    if poll.deadline_secs == 0 {
        anyhow::bail!("assistant.poll.deadline_secs must be > 0");
    }

    Ok(config)
}
