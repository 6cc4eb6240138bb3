use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::ModelClass;
use crate::{
    BINANCE_API_BASE, COINGECKO_API_BASE, LLM_API_BASE, TELEGRAM_API_BASE, TWITTER_API_BASE,
};

/// Default config file path.
pub const CONFIG_PATH: &str = "config.toml";

/// Top-level application config deserialized from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub agent: AgentConfig,
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
}

/// Persona the prompts are written for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub bio: Vec<String>,
    #[serde(default)]
    pub lore: Vec<String>,
    /// Search topics for the discovery and like clients.
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub post_directions: Vec<String>,
    #[serde(default)]
    pub post_examples: Vec<String>,
}

/// API credentials. Empty strings mean "not configured".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    /// OAuth 2.0 user-context access token for the X API.
    #[serde(default)]
    pub twitter_access_token: String,
    #[serde(default)]
    pub telegram_bot_token: String,
    #[serde(default)]
    pub llm_api_key: String,
}

/// Runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Suppress every external send and log it instead.
    #[serde(default)]
    pub dry_run: bool,
    /// Minimum seconds between topic replies in one conversation.
    #[serde(default = "default_topic_reply_interval")]
    pub topic_reply_interval_secs: u64,
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_secs: u64,
    #[serde(default = "default_like_interval")]
    pub like_interval_secs: u64,
    #[serde(default = "default_scalping_interval")]
    pub scalping_interval_secs: u64,
    #[serde(default = "default_trending_interval")]
    pub trending_interval_secs: u64,
    /// Tweets fetched per topic search.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    /// Also search for `@handle` mentions each discovery tick.
    #[serde(default)]
    pub include_mentions: bool,
    /// Like the tweet when the model declines to reply.
    #[serde(default)]
    pub like_on_ignore: bool,
    #[serde(default = "default_action_delay_min")]
    pub action_delay_min_ms: u64,
    #[serde(default = "default_action_delay_max")]
    pub action_delay_max_ms: u64,
    #[serde(default)]
    pub telegram_channel_id: String,
    /// Longest single Telegram message posted by the trending client.
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
    /// Root for the memory snapshot and cached transcripts.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_topic_reply_interval() -> u64 {
    3600
}

fn default_discovery_interval() -> u64 {
    1800
}

fn default_like_interval() -> u64 {
    1320
}

fn default_scalping_interval() -> u64 {
    2640
}

fn default_trending_interval() -> u64 {
    3960
}

fn default_search_limit() -> usize {
    4
}

fn default_action_delay_min() -> u64 {
    1000
}

fn default_action_delay_max() -> u64 {
    3000
}

fn default_max_message_len() -> usize {
    280
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            topic_reply_interval_secs: default_topic_reply_interval(),
            discovery_interval_secs: default_discovery_interval(),
            like_interval_secs: default_like_interval(),
            scalping_interval_secs: default_scalping_interval(),
            trending_interval_secs: default_trending_interval(),
            search_limit: default_search_limit(),
            include_mentions: false,
            like_on_ignore: false,
            action_delay_min_ms: default_action_delay_min(),
            action_delay_max_ms: default_action_delay_max(),
            telegram_channel_id: String::new(),
            max_message_len: default_max_message_len(),
            data_dir: default_data_dir(),
        }
    }
}

/// Model names per size class for the chat-completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_small_model")]
    pub small: String,
    #[serde(default = "default_medium_model")]
    pub medium: String,
    #[serde(default = "default_large_model")]
    pub large: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_small_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_medium_model() -> String {
    "gpt-4o".to_string()
}

fn default_large_model() -> String {
    "gpt-4o".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            small: default_small_model(),
            medium: default_medium_model(),
            large: default_large_model(),
            temperature: default_temperature(),
        }
    }
}

impl ModelConfig {
    pub fn model_for(&self, class: ModelClass) -> &str {
        match class {
            ModelClass::Small => &self.small,
            ModelClass::Medium => &self.medium,
            ModelClass::Large => &self.large,
        }
    }
}

/// Base URLs of the external services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_twitter_api")]
    pub twitter_api: String,
    #[serde(default = "default_telegram_api")]
    pub telegram_api: String,
    #[serde(default = "default_llm_api")]
    pub llm_api: String,
    #[serde(default = "default_binance_api")]
    pub binance_api: String,
    #[serde(default = "default_coingecko_api")]
    pub coingecko_api: String,
}

fn default_twitter_api() -> String {
    TWITTER_API_BASE.to_string()
}

fn default_telegram_api() -> String {
    TELEGRAM_API_BASE.to_string()
}

fn default_llm_api() -> String {
    LLM_API_BASE.to_string()
}

fn default_binance_api() -> String {
    BINANCE_API_BASE.to_string()
}

fn default_coingecko_api() -> String {
    COINGECKO_API_BASE.to_string()
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            twitter_api: default_twitter_api(),
            telegram_api: default_telegram_api(),
            llm_api: default_llm_api(),
            binance_api: default_binance_api(),
            coingecko_api: default_coingecko_api(),
        }
    }
}

impl EndpointsConfig {
    /// Reject base URLs that do not parse or are not http(s).
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("twitter_api", &self.twitter_api),
            ("telegram_api", &self.telegram_api),
            ("llm_api", &self.llm_api),
            ("binance_api", &self.binance_api),
            ("coingecko_api", &self.coingecko_api),
        ] {
            let url = Url::parse(value).with_context(|| format!("endpoints.{name} is not a URL"))?;
            if !matches!(url.scheme(), "http" | "https") {
                bail!("endpoints.{name} must be http(s), got {}", url.scheme());
            }
        }
        Ok(())
    }
}

impl SettingsConfig {
    /// Reject values the scheduler and the message splitter cannot run with.
    pub fn validate(&self) -> Result<()> {
        for (name, secs) in [
            ("discovery_interval_secs", self.discovery_interval_secs),
            ("like_interval_secs", self.like_interval_secs),
            ("scalping_interval_secs", self.scalping_interval_secs),
            ("trending_interval_secs", self.trending_interval_secs),
        ] {
            if secs == 0 {
                bail!("settings.{name} must be at least 1 second");
            }
        }
        if self.max_message_len == 0 {
            bail!("settings.max_message_len must be positive");
        }
        Ok(())
    }
}

/// Per-character prompt overrides; built-ins are used when unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplatesConfig {
    pub should_respond: Option<String>,
    pub message_handler: Option<String>,
}

impl AppConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section that has constraints beyond its types.
    pub fn validate(&self) -> Result<()> {
        self.settings.validate()?;
        self.endpoints.validate()
    }

    /// Write config to the given TOML file path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Apply environment settings on top of the file values.
    ///
    /// `lookup` is `std::env::var(..).ok()` in the binaries.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("TWITTER_DRY_RUN").or_else(|| non_empty("DRY_RUN")) {
            self.settings.dry_run = v.trim().eq_ignore_ascii_case("true");
        }
        if let Some(v) = non_empty("TWITTER_TOPIC_REPLY_INTERVAL") {
            self.settings.topic_reply_interval_secs = v
                .trim()
                .parse()
                .with_context(|| format!("TWITTER_TOPIC_REPLY_INTERVAL is not a number: {v}"))?;
        }
        if let Some(v) = non_empty("TWITTER_ACCESS_TOKEN") {
            self.account.twitter_access_token = v;
        }
        if let Some(v) = non_empty("TELEGRAM_BOT_TOKEN") {
            self.account.telegram_bot_token = v;
        }
        if let Some(v) = non_empty("TELEGRAM_CHANNEL_ID") {
            self.settings.telegram_channel_id = v;
        }
        if let Some(v) = non_empty("LLM_API_KEY").or_else(|| non_empty("OPENAI_API_KEY")) {
            self.account.llm_api_key = v;
        }
        Ok(())
    }
}
