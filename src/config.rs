//! Layered configuration for pagesmith.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. `pagesmith.toml` in the working directory, or the file given with `--config`
//! 3. `.env` (loaded into the process environment by `dotenvy`)
//! 4. Environment variables
//! 5. CLI flags
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 7860
//!
//! [queue]
//! capacity = 16
//! workers = 2
//!
//! [github]
//! user = "octocat"
//!
//! [llm]
//! provider = "gemini"
//! model = "gemini-2.5-flash"
//!
//! [pipeline]
//! deploy_timeout_secs = 300
//!
//! [logging]
//! json = true
//! dir = "logs"
//! ```
//!
//! Secrets are never read from the file and never serialized; they come
//! from `INTAKE_SECRET`, `GITHUB_TOKEN` and `LLM_API_KEY`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::hosting::DEFAULT_API_URL;
use crate::llm::{
    DEFAULT_GEMINI_ENDPOINT, DEFAULT_GEMINI_MODEL, DEFAULT_OPENAI_ENDPOINT, DEFAULT_OPENAI_MODEL,
};
use crate::pipeline::PipelineSettings;

pub const DEFAULT_CONFIG_FILE: &str = "pagesmith.toml";

/// Which completion API to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    /// OpenAI-compatible chat completions (OpenRouter, aipipe, ...).
    #[default]
    Openai,
    Gemini,
}

impl fmt::Display for LlmProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProviderKind::Openai => write!(f, "openai"),
            LlmProviderKind::Gemini => write!(f, "gemini"),
        }
    }
}

impl std::str::FromStr for LlmProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LlmProviderKind::Openai),
            "gemini" => Ok(LlmProviderKind::Gemini),
            _ => anyhow::bail!("Invalid LLM provider '{}'. Valid values: openai, gemini", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7860
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSection {
    /// Waiting entries before intake answers 503
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_capacity() -> usize {
    16
}

fn default_workers() -> usize {
    2
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GithubSection {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Account owning every generated repository
    #[serde(default)]
    pub user: String,
    #[serde(default = "default_github_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_github_timeout() -> u64 {
    30
}

impl Default for GithubSection {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            user: String::new(),
            request_timeout_secs: default_github_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(default)]
    pub provider: LlmProviderKind,
    /// Defaults to the provider's public endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Defaults to the provider's default model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_llm_timeout")]
    pub request_timeout_secs: u64,
}

fn default_llm_timeout() -> u64 {
    120
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::default(),
            endpoint: None,
            model: None,
            request_timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmSection {
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(match self.provider {
            LlmProviderKind::Openai => DEFAULT_OPENAI_ENDPOINT,
            LlmProviderKind::Gemini => DEFAULT_GEMINI_ENDPOINT,
        })
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(match self.provider {
            LlmProviderKind::Openai => DEFAULT_OPENAI_MODEL,
            LlmProviderKind::Gemini => DEFAULT_GEMINI_MODEL,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
    #[serde(default = "default_deploy_timeout")]
    pub deploy_timeout_secs: u64,
    #[serde(default = "default_workflow_file")]
    pub workflow_file: String,
    /// Per-request timeout for the evaluation callback
    #[serde(default = "default_evaluation_timeout")]
    pub evaluation_timeout_secs: u64,
}

fn default_settle_delay() -> u64 {
    5
}

fn default_deploy_timeout() -> u64 {
    180
}

fn default_workflow_file() -> String {
    "deploy.yml".to_string()
}

fn default_evaluation_timeout() -> u64 {
    30
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            settle_delay_secs: default_settle_delay(),
            deploy_timeout_secs: default_deploy_timeout(),
            workflow_file: default_workflow_file(),
            evaluation_timeout_secs: default_evaluation_timeout(),
        }
    }
}

impl PipelineSection {
    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            workflow_file: self.workflow_file.clone(),
            settle_delay: Duration::from_secs(self.settle_delay_secs),
            deploy_timeout: Duration::from_secs(self.deploy_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
    /// Also write daily-rolling log files here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// Credentials, resolved from the environment only.
#[derive(Clone, Default, PartialEq)]
pub struct Secrets {
    pub intake_secret: Option<String>,
    pub github_token: Option<String>,
    pub llm_api_key: Option<String>,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("intake_secret", &presence(&self.intake_secret))
            .field("github_token", &presence(&self.github_token))
            .field("llm_api_key", &presence(&self.llm_api_key))
            .finish()
    }
}

fn presence(value: &Option<String>) -> &'static str {
    if value.is_some() { "set" } else { "unset" }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PagesmithConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub queue: QueueSection,
    #[serde(default)]
    pub github: GithubSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(skip)]
    pub secrets: Secrets,
}

impl PagesmithConfig {
    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse pagesmith.toml")
    }

    /// Load configuration from a TOML file.
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Resolve the full configuration: file (explicit, or the default file if
    /// present), then `.env`, then the process environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::load_file(path)?
                } else {
                    Self::default()
                }
            }
        };

        // A missing .env is normal.
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env");
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides and resolve secrets through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(user) = get("GITHUB_USER") {
            self.github.user = user;
        }
        if let Some(url) = get("GITHUB_API_URL") {
            self.github.api_url = url;
        }
        if let Some(provider) = get("LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Some(endpoint) = get("LLM_ENDPOINT") {
            self.llm.endpoint = Some(endpoint);
        }
        if let Some(model) = get("LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(port) = get("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid PORT '{}'", port))?;
        }
        if let Some(capacity) = get("QUEUE_CAPACITY") {
            self.queue.capacity = capacity
                .parse()
                .with_context(|| format!("Invalid QUEUE_CAPACITY '{}'", capacity))?;
        }
        if let Some(workers) = get("QUEUE_WORKERS") {
            self.queue.workers = workers
                .parse()
                .with_context(|| format!("Invalid QUEUE_WORKERS '{}'", workers))?;
        }

        let provider_key = match self.llm.provider {
            LlmProviderKind::Openai => "AIPIPE_TOKEN",
            LlmProviderKind::Gemini => "GEMINI_API_KEY",
        };
        self.secrets = Secrets {
            intake_secret: get("INTAKE_SECRET").or_else(|| get("GOOGLE_FORM_SECRET")),
            github_token: get("GITHUB_TOKEN"),
            llm_api_key: get("LLM_API_KEY").or_else(|| get(provider_key)),
        };
        Ok(())
    }

    /// Apply CLI overrides.
    pub fn with_cli_args(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.server.port = port;
        }
        self
    }

    /// Problems that prevent serving. Empty means ready.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.secrets.intake_secret.is_none() {
            problems.push("INTAKE_SECRET is not set".to_string());
        }
        if self.secrets.github_token.is_none() {
            problems.push("GITHUB_TOKEN is not set".to_string());
        }
        if self.secrets.llm_api_key.is_none() {
            problems.push(format!(
                "No API key for the {} provider (set LLM_API_KEY)",
                self.llm.provider
            ));
        }
        if self.github.user.trim().is_empty() {
            problems.push("github.user is empty (set GITHUB_USER)".to_string());
        }
        if self.queue.capacity == 0 {
            problems.push("queue.capacity must be at least 1".to_string());
        }
        if self.queue.workers == 0 {
            problems.push("queue.workers must be at least 1".to_string());
        }
        if self.pipeline.workflow_file.trim().is_empty() {
            problems.push("pipeline.workflow_file is empty".to_string());
        }

        problems
    }

    /// Effective configuration as TOML, with secrets reduced to set/unset.
    pub fn to_display_toml(&self) -> Result<String> {
        let mut out = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        out.push_str(&format!(
            "\n[secrets]\nINTAKE_SECRET = \"{}\"\nGITHUB_TOKEN = \"{}\"\nLLM_API_KEY = \"{}\"\n",
            presence(&self.secrets.intake_secret),
            presence(&self.secrets.github_token),
            presence(&self.secrets.llm_api_key),
        ));
        Ok(out)
    }
}
