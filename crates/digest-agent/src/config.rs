//! Digest configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (applied by `main`)
//! 2. Environment variables (`DIGEST_*`, `TELEGRAM_*`)
//! 3. TOML file passed with `--config`
//! 4. Built-in defaults (tunables only)
//!
//! Endpoint URL, model, bot token and chat id have no built-in defaults;
//! [`DigestConfig::validate`] rejects a config that lacks them. Components
//! never read the environment themselves, they receive these structs.

use anyhow::{bail, Context, Result};
use report_pipeline::{
    ChangeDetection, MarkerAnchor, DEFAULT_MAX_CHUNK_LEN, DEFAULT_SIMILARITY_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::orchestrator::NotifyPolicy;

const ENV_LLM_BASE_URL: &str = "DIGEST_LLM_BASE_URL";
const ENV_LLM_MODEL: &str = "DIGEST_LLM_MODEL";
const ENV_LLM_API_KEY: &str = "DIGEST_LLM_API_KEY";
const ENV_TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
const ENV_TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
const ENV_TELEGRAM_API_BASE: &str = "TELEGRAM_API_BASE";
const ENV_STATE_DIR: &str = "DIGEST_STATE_DIR";
const ENV_SIMILARITY_THRESHOLD: &str = "DIGEST_SIMILARITY_THRESHOLD";
const ENV_MAX_CHUNK_LEN: &str = "DIGEST_MAX_CHUNK_LEN";
const ENV_MAX_ATTEMPTS: &str = "DIGEST_MAX_ATTEMPTS";
const ENV_RETRY_DELAY_SECS: &str = "DIGEST_RETRY_DELAY_SECS";
const ENV_NOTIFY_POLICY: &str = "DIGEST_NOTIFY_POLICY";
const ENV_CHANGE_DETECTION: &str = "DIGEST_CHANGE_DETECTION";

const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
/// Generation attempts per cycle before giving up on incomplete output.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_GENERATOR_TIMEOUT_SECS: u64 = 300;
const DEFAULT_TELEGRAM_TIMEOUT_SECS: u64 = 30;

/// OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Base URL without the `/chat/completions` suffix (e.g. `https://openrouter.ai/api/v1`)
    pub base_url: String,
    pub model: String,
    /// Sent as a bearer token when present
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            model: String::new(),
            api_key: None,
            temperature: 0.0,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_GENERATOR_TIMEOUT_SECS,
        }
    }
}

impl GeneratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Telegram Bot API target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub api_base: String,
    pub bot_token: String,
    pub chat_id: String,
    pub parse_mode: String,
    pub timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
            bot_token: String::new(),
            chat_id: String::new(),
            parse_mode: "HTML".to_string(),
            timeout_secs: DEFAULT_TELEGRAM_TIMEOUT_SECS,
        }
    }
}

impl TelegramConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Top-level digest configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    pub generator: GeneratorConfig,
    pub telegram: TelegramConfig,
    /// Directory holding the snapshot, history log and lock file
    pub state_dir: PathBuf,
    pub similarity_threshold: f64,
    pub max_chunk_len: usize,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub policy: NotifyPolicy,
    pub detection: ChangeDetection,
    pub marker_anchor: MarkerAnchor,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            generator: GeneratorConfig::default(),
            telegram: TelegramConfig::default(),
            state_dir: PathBuf::from("."),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_chunk_len: DEFAULT_MAX_CHUNK_LEN,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            policy: NotifyPolicy::default(),
            detection: ChangeDetection::default(),
            marker_anchor: MarkerAnchor::default(),
        }
    }
}

impl DigestConfig {
    /// Load the TOML file (if any), then apply process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_env(|key| std::env::var(key).ok())
    }

    /// Parse a TOML config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse digest config TOML")
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_LLM_BASE_URL) {
            self.generator.base_url = url;
        }
        if let Some(model) = get(ENV_LLM_MODEL) {
            self.generator.model = model;
        }
        if let Some(key) = get(ENV_LLM_API_KEY) {
            self.generator.api_key = Some(key);
        }
        if let Some(token) = get(ENV_TELEGRAM_BOT_TOKEN) {
            self.telegram.bot_token = token;
        }
        if let Some(chat_id) = get(ENV_TELEGRAM_CHAT_ID) {
            self.telegram.chat_id = chat_id;
        }
        if let Some(base) = get(ENV_TELEGRAM_API_BASE) {
            self.telegram.api_base = base;
        }
        if let Some(dir) = get(ENV_STATE_DIR) {
            self.state_dir = PathBuf::from(dir);
        }
        if let Some(v) = get(ENV_SIMILARITY_THRESHOLD) {
            self.similarity_threshold = parse_env(ENV_SIMILARITY_THRESHOLD, &v)?;
        }
        if let Some(v) = get(ENV_MAX_CHUNK_LEN) {
            self.max_chunk_len = parse_env(ENV_MAX_CHUNK_LEN, &v)?;
        }
        if let Some(v) = get(ENV_MAX_ATTEMPTS) {
            self.max_attempts = parse_env(ENV_MAX_ATTEMPTS, &v)?;
        }
        if let Some(v) = get(ENV_RETRY_DELAY_SECS) {
            self.retry_delay_secs = parse_env(ENV_RETRY_DELAY_SECS, &v)?;
        }
        if let Some(v) = get(ENV_NOTIFY_POLICY) {
            self.policy = parse_env(ENV_NOTIFY_POLICY, &v)?;
        }
        if let Some(v) = get(ENV_CHANGE_DETECTION) {
            self.detection = parse_env(ENV_CHANGE_DETECTION, &v)?;
        }

        Ok(self)
    }

    /// Check required values and ranges before any component is built.
    pub fn validate(&self) -> Result<()> {
        self.check_required(true)
    }

    /// Like [`validate`](Self::validate) but Telegram settings are optional.
    pub fn validate_dry_run(&self) -> Result<()> {
        self.check_required(false)
    }

    fn check_required(&self, telegram: bool) -> Result<()> {
        let mut missing = Vec::new();
        if self.generator.base_url.trim().is_empty() {
            missing.push(ENV_LLM_BASE_URL);
        }
        if self.generator.model.trim().is_empty() {
            missing.push(ENV_LLM_MODEL);
        }
        if telegram && self.telegram.bot_token.trim().is_empty() {
            missing.push(ENV_TELEGRAM_BOT_TOKEN);
        }
        if telegram && self.telegram.chat_id.trim().is_empty() {
            missing.push(ENV_TELEGRAM_CHAT_ID);
        }
        if !missing.is_empty() {
            bail!("Missing required configuration: {}", missing.join(", "));
        }

        self.validate_tunables()
    }

    /// Range checks that apply even when no endpoint is needed (`diff`, dry runs).
    pub fn validate_tunables(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            bail!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            );
        }
        if self.max_chunk_len == 0 || self.max_chunk_len > 4096 {
            bail!(
                "max_chunk_len must be within 1..=4096, got {}",
                self.max_chunk_len
            );
        }
        if self.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid value for {key} ({value:?}): {e}"))
}
