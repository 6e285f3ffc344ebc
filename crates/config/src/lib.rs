//! Configuration loading, validation, and management for Toolforge.
//!
//! Loads configuration from an optional `toolforge.toml` in the project
//! root, then applies environment-variable overrides (environment wins).
//! Secrets are redacted in `Debug` output.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use toolforge_core::error::ConfigError;

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Project root every relative tool path resolves under.
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,

    /// Grok (xAI) provider settings.
    #[serde(default)]
    pub grok: GrokConfig,

    /// Anthropic provider settings.
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Telegram bot surface settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Per-provider USD-per-1M-token rates for cost estimation.
    #[serde(default)]
    pub costs: HashMap<String, CostRate>,
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

impl AppConfig {
    /// Load from `toolforge.toml` under the current directory (when
    /// present), then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(Path::new("toolforge.toml"))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from a specific file path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Environment variables override file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("GROK_API_KEY") {
            self.grok.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("GROK_MODEL") {
            self.grok.model = v;
        }
        if let Ok(v) = std::env::var("GROK_BASE_URL") {
            self.grok.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("ANTHROPIC_API_KEY") {
            self.anthropic.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("ANTHROPIC_MODEL") {
            self.anthropic.model = v;
        }
        if let Ok(v) = std::env::var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Ok(v) = std::env::var("TELEGRAM_ALLOWED_CHAT_IDS") {
            self.telegram.allowed_chat_ids = Some(parse_id_list(&v));
        }
        if let Ok(v) = std::env::var("TELEGRAM_ADMIN_CHAT_IDS") {
            self.telegram.admin_chat_ids = parse_id_list(&v);
        }
        if let Ok(v) = std::env::var("TELEGRAM_RATE_LIMIT_SECONDS")
            && let Ok(n) = v.trim().parse()
        {
            self.telegram.rate_limit_seconds = n;
        }
        if let Ok(v) = std::env::var("TELEGRAM_APPROVAL_TTL_SECONDS")
            && let Ok(n) = v.trim().parse()
        {
            self.telegram.approval_ttl_seconds = n;
        }
        if let Ok(v) = std::env::var("TELEGRAM_SHOW_USAGE") {
            self.telegram.show_usage = matches!(v.trim(), "1" | "true" | "yes");
        }
        for provider in ["grok", "anthropic"] {
            let upper = provider.to_uppercase();
            let input = std::env::var(format!("COST_{upper}_USD_PER_1M_IN")).ok();
            let output = std::env::var(format!("COST_{upper}_USD_PER_1M_OUT")).ok();
            if input.is_some() || output.is_some() {
                let entry = self.costs.entry(provider.to_string()).or_default();
                if let Some(n) = input.and_then(|v| v.trim().parse().ok()) {
                    entry.usd_per_1m_in = n;
                }
                if let Some(n) = output.and_then(|v| v.trim().parse().ok()) {
                    entry.usd_per_1m_out = n;
                }
            }
        }
    }

    /// The Grok key is the one hard requirement for live runs.
    pub fn require_grok_key(&self) -> Result<&str, ConfigError> {
        self.grok
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingEnv("GROK_API_KEY".into()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.rate_limit_seconds > 3_600 {
            return Err(ConfigError::Validation(
                "telegram.rate_limit_seconds must be at most 3600".into(),
            ));
        }
        if self.telegram.approval_ttl_seconds == 0 {
            return Err(ConfigError::Validation(
                "telegram.approval_ttl_seconds must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Where session documents live.
    pub fn sessions_dir(&self) -> PathBuf {
        self.project_root.join("data").join("sessions")
    }

    /// The append-only JSONL event log.
    pub fn event_log_path(&self) -> PathBuf {
        self.project_root.join("logs").join("app.log")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            project_root: default_project_root(),
            grok: GrokConfig::default(),
            anthropic: AnthropicConfig::default(),
            telegram: TelegramConfig::default(),
            costs: HashMap::new(),
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("grok", &self.grok)
            .field("anthropic", &self.anthropic)
            .field("telegram", &self.telegram)
            .field("costs", &self.costs)
            .field("project_root", &self.project_root)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GrokConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_grok_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_grok_model() -> String {
    "grok-2-latest".into()
}

impl Default for GrokConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_grok_model(),
            base_url: None,
        }
    }
}

impl std::fmt::Debug for GrokConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrokConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_anthropic_model")]
    pub model: String,
}

fn default_anthropic_model() -> String {
    "claude-sonnet-4-20250514".into()
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_anthropic_model(),
        }
    }
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// Allowlist of chat ids. `None` = unconfigured (allow all);
    /// `Some(vec![])` = deny all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_chat_ids: Option<Vec<i64>>,

    /// Chats allowed to trigger write operations.
    #[serde(default)]
    pub admin_chat_ids: Vec<i64>,

    /// Seconds between non-command messages per chat.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_seconds: u64,

    /// How long a pending approval waits before counting as denied.
    #[serde(default = "default_approval_ttl")]
    pub approval_ttl_seconds: u64,

    /// Append a usage footer to bot replies.
    #[serde(default)]
    pub show_usage: bool,
}

fn default_rate_limit() -> u64 {
    3
}

fn default_approval_ttl() -> u64 {
    600
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            allowed_chat_ids: None,
            admin_chat_ids: Vec::new(),
            rate_limit_seconds: default_rate_limit(),
            approval_ttl_seconds: default_approval_ttl(),
            show_usage: false,
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &redact(&self.bot_token))
            .field("allowed_chat_ids", &self.allowed_chat_ids)
            .field("admin_chat_ids", &self.admin_chat_ids)
            .field("rate_limit_seconds", &self.rate_limit_seconds)
            .field("approval_ttl_seconds", &self.approval_ttl_seconds)
            .field("show_usage", &self.show_usage)
            .finish()
    }
}

/// USD per 1 million tokens, split by direction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CostRate {
    #[serde(default)]
    pub usd_per_1m_in: f64,

    #[serde(default)]
    pub usd_per_1m_out: f64,
}

/// Parse a comma-separated id list; junk entries are dropped.
fn parse_id_list(input: &str) -> Vec<i64> {
    input
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect()
}
