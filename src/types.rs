use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tweet returned by the search collaborator. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tweet {
    /// Numeric-string status id.
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub name: String,
    pub text: String,
    pub conversation_id: String,
    pub in_reply_to_status_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Tweet {
    /// Status id as an unsigned integer, `None` if the id is not numeric.
    pub fn numeric_id(&self) -> Option<u64> {
        self.id.parse().ok()
    }

    pub fn permanent_url(&self) -> String {
        format!("https://x.com/{}/status/{}", self.username, self.id)
    }

    /// Whether the text mentions `@handle` (case-insensitive).
    pub fn mentions(&self, handle: &str) -> bool {
        let needle = format!("@{}", handle.trim_start_matches('@')).to_lowercase();
        self.text.to_lowercase().contains(&needle)
    }
}

/// The agent's own account on the social network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub name: String,
}

/// Payload of a stored memory record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<Uuid>,
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// A record in the memory store, keyed by a deterministic UUID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub user_id: Uuid,
    pub room_id: Uuid,
    pub content: Content,
    pub created_at: DateTime<Utc>,
}

/// Conversational context linking a user to a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub user_id: Uuid,
    pub room_id: Uuid,
    pub username: String,
    pub name: String,
    pub source: String,
}

/// Engagement decision returned by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ShouldRespond {
    Respond,
    Ignore,
    Stop,
}

impl ShouldRespond {
    pub fn label(&self) -> &'static str {
        match self {
            ShouldRespond::Respond => "RESPOND",
            ShouldRespond::Ignore => "IGNORE",
            ShouldRespond::Stop => "STOP",
        }
    }

    /// Parse a model answer. Bracketed `[RESPOND]` markers win over bare words.
    pub fn parse(text: &str) -> Option<Self> {
        let upper = text.to_uppercase();
        const ALL: [ShouldRespond; 3] = [
            ShouldRespond::Respond,
            ShouldRespond::Ignore,
            ShouldRespond::Stop,
        ];

        let bracketed = ALL
            .iter()
            .filter_map(|d| upper.find(&format!("[{}]", d.label())).map(|pos| (pos, *d)))
            .min_by_key(|(pos, _)| *pos);
        if let Some((_, decision)) = bracketed {
            return Some(decision);
        }

        upper
            .split(|c: char| !c.is_ascii_alphabetic())
            .find_map(|word| ALL.iter().copied().find(|d| d.label() == word))
    }
}

impl fmt::Display for ShouldRespond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Model size class; each maps to a configured model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelClass {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Latest,
    Top,
}

/// Which scheduled client produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ClientKind {
    Discovery,
    Like,
    Scalping,
    Trending,
}

impl ClientKind {
    /// Log prefix identifying the client.
    pub fn prefix(&self) -> &'static str {
        match self {
            ClientKind::Discovery => "DISCOVERY",
            ClientKind::Like => "LIKE",
            ClientKind::Scalping => "SCALPING",
            ClientKind::Trending => "TRENDING",
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Failure category recorded in an item outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Fetch,
    Model,
    Send,
    Malformed,
    Store,
}

/// What happened to a single candidate during `process`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// A record already exists under the dedup marker.
    AlreadyHandled,
    /// Topic match inside the conversation's reply window.
    RateLimited,
    /// The model answered something other than RESPOND.
    Declined { decision: ShouldRespond, liked: bool },
    Liked,
    Replied { tweets: usize },
    /// Dry-run: the action was logged instead of sent.
    DryRun { text: Option<String> },
    /// The model produced no reply text.
    Empty,
    Failed { kind: FailureKind, message: String },
}

/// Per-item line inside a tick event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReport {
    pub tweet_id: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

/// One tick of a scheduled client, emitted as a JSON line on stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickEvent {
    pub timestamp: String,
    pub client: ClientKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub candidates: usize,
    pub items: Vec<ItemReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_water_mark: Option<String>,
    /// Channel messages actually sent by market clients; always 0 in dry-run.
    pub messages: usize,
    pub dry_run: bool,
}

/// Counters for one client, reported at shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSummary {
    pub client: Option<ClientKind>,
    pub ticks: u64,
    pub tick_errors: u64,
    pub fetch_failures: u64,
    pub candidates: u64,
    pub stale_skipped: u64,
    pub processed: u64,
    pub already_handled: u64,
    pub rate_limited: u64,
    pub declined: u64,
    pub replies_sent: u64,
    pub likes_sent: u64,
    pub channel_messages: u64,
    pub dry_run_actions: u64,
    pub item_errors: u64,
    pub high_water_mark: Option<String>,
}

/// Printed as pretty JSON when the process exits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitSummary {
    pub started_at: String,
    pub stopped_at: String,
    pub dry_run: bool,
    pub clients: Vec<ClientSummary>,
}

/// Binance 24h rolling ticker. Numeric fields arrive as decimal strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24h {
    pub symbol: String,
    pub last_price: Decimal,
    pub price_change_percent: Decimal,
    pub quote_volume: Decimal,
}

/// CoinGecko `/search/trending` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingResponse {
    #[serde(default)]
    pub coins: Vec<TrendingCoin>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingCoin {
    pub item: TrendingItem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingItem {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub market_cap_rank: Option<u32>,
    #[serde(default)]
    pub score: u32,
    pub data: Option<TrendingData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingData {
    pub price: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_24h: std::collections::HashMap<String, f64>,
    pub market_cap: Option<String>,
    pub market_cap_btc: Option<String>,
    pub total_volume: Option<String>,
    pub content: Option<TrendingContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingContent {
    pub title: Option<String>,
    pub description: Option<String>,
}
