pub mod agent;
pub mod api;
pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod ids;
pub mod llm;
pub mod poller;
pub mod prompts;
pub mod reporter;
pub mod scalping;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod telegram;
pub mod trending;
pub mod twitter;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

/// X (Twitter) API v2 base URL
pub const TWITTER_API_BASE: &str = "https://api.x.com";

/// Telegram Bot API base URL
/// Append /bot<token>/<method>
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// OpenAI-compatible chat completions base URL
pub const LLM_API_BASE: &str = "https://api.openai.com";

/// Binance spot REST API base URL (public, no auth required)
pub const BINANCE_API_BASE: &str = "https://api.binance.com";

/// CoinGecko public API base URL
pub const COINGECKO_API_BASE: &str = "https://api.coingecko.com";
