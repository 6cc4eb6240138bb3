//! Scripted collaborator fakes shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::agent::{Agent, ResponseHook};
use crate::api::MarketData;
use crate::config::AgentConfig;
use crate::llm::TextGenerator;
use crate::store::{LocalStore, MemoryCache};
use crate::telegram::Messenger;
use crate::twitter::SocialClient;
use crate::types::{
    MemoryRecord, ModelClass, Profile, SearchMode, Ticker24h, TrendingCoin, TrendingData,
    TrendingItem, Tweet,
};

pub const AGENT_USER_ID: &str = "1000";
pub const AGENT_HANDLE: &str = "scalpbot";

/// A root tweet by `user_id`, created 2024-11-02 12:00 UTC.
pub fn make_tweet(id: &str, user_id: &str, text: &str) -> Tweet {
    Tweet {
        id: id.to_string(),
        user_id: user_id.to_string(),
        username: format!("user{user_id}"),
        name: format!("User {user_id}"),
        text: text.to_string(),
        conversation_id: id.to_string(),
        in_reply_to_status_id: None,
        created_at: Utc
            .with_ymd_and_hms(2024, 11, 2, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now),
    }
}

pub fn agent_profile() -> Profile {
    Profile {
        id: AGENT_USER_ID.into(),
        username: AGENT_HANDLE.into(),
        name: "Scalper".into(),
    }
}

pub fn persona(topics: &[&str]) -> AgentConfig {
    AgentConfig {
        name: "Scalper".into(),
        bio: vec!["Trades momentum.".into()],
        lore: vec![],
        topics: topics.iter().map(|t| t.to_string()).collect(),
        post_directions: vec![],
        post_examples: vec![],
    }
}

/// Agent over an in-memory store and cache.
pub fn make_agent(topics: &[&str], model: Arc<FakeModel>) -> Agent {
    Agent::new(
        persona(topics),
        agent_profile(),
        Arc::new(LocalStore::in_memory()),
        Arc::new(MemoryCache::new()),
        model,
    )
}

/// Social client fake: scripted search batches, recorded sends.
#[derive(Default)]
pub struct FakeSocial {
    searches: Mutex<VecDeque<Result<Vec<Tweet>, String>>>,
    lookups: Mutex<HashMap<String, Tweet>>,
    pub queries: Mutex<Vec<(String, usize)>>,
    pub posts: Mutex<Vec<(String, Option<String>)>>,
    pub likes: Mutex<Vec<String>>,
    fail_sends: AtomicBool,
    next_id: AtomicU64,
}

impl FakeSocial {
    /// Queue a search result. An empty queue answers with no tweets.
    pub fn push_search(&self, batch: Vec<Tweet>) {
        self.searches.lock().unwrap().push_back(Ok(batch));
    }

    pub fn push_search_error(&self, message: &str) {
        self.searches
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn add_lookup(&self, tweet: Tweet) {
        self.lookups.lock().unwrap().insert(tweet.id.clone(), tweet);
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    pub fn like_count(&self) -> usize {
        self.likes.lock().unwrap().len()
    }
}

#[async_trait]
impl SocialClient for FakeSocial {
    async fn search(&self, query: &str, limit: usize, _mode: SearchMode) -> Result<Vec<Tweet>> {
        self.queries
            .lock()
            .unwrap()
            .push((query.to_string(), limit));
        match self.searches.lock().unwrap().pop_front() {
            Some(Ok(batch)) => Ok(batch),
            Some(Err(e)) => Err(anyhow!(e)),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_tweet(&self, id: &str) -> Result<Tweet> {
        self.lookups
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("tweet {id} not found"))
    }

    async fn post(&self, text: &str, in_reply_to: Option<&str>) -> Result<Tweet> {
        if self.fail_sends.load(Ordering::SeqCst) {
            bail!("post rejected (403)");
        }
        self.posts
            .lock()
            .unwrap()
            .push((text.to_string(), in_reply_to.map(str::to_string)));
        let id = 9000 + self.next_id.fetch_add(1, Ordering::SeqCst);
        let profile = agent_profile();
        let mut tweet = make_tweet(&id.to_string(), &profile.id, text);
        tweet.username = profile.username;
        tweet.name = profile.name;
        if let Some(parent) = in_reply_to {
            tweet.conversation_id = match self.lookups.lock().unwrap().get(parent) {
                Some(p) => p.conversation_id.clone(),
                None => parent.to_string(),
            };
        }
        tweet.in_reply_to_status_id = in_reply_to.map(str::to_string);
        tweet.created_at = Utc::now();
        Ok(tweet)
    }

    async fn like(&self, tweet_id: &str) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            bail!("like rejected (403)");
        }
        self.likes.lock().unwrap().push(tweet_id.to_string());
        Ok(())
    }

    async fn me(&self) -> Result<Profile> {
        Ok(agent_profile())
    }
}

/// Model fake answering from a script, then failing once it runs dry.
#[derive(Default)]
pub struct FakeModel {
    answers: Mutex<VecDeque<String>>,
    pub prompts: Mutex<Vec<(String, ModelClass)>>,
}

impl FakeModel {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            prompts: Mutex::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for FakeModel {
    async fn generate(&self, context: &str, class: ModelClass) -> Result<String> {
        self.prompts
            .lock()
            .unwrap()
            .push((context.to_string(), class));
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("model unavailable"))
    }
}

#[derive(Default)]
pub struct FakeMessenger {
    pub sent: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl FakeMessenger {
    pub fn failing() -> Self {
        let m = Self::default();
        m.fail.store(true, Ordering::SeqCst);
        m
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("Telegram sendMessage failed (400): chat not found");
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Hook that remembers how many reply records it was handed.
#[derive(Default)]
pub struct RecordingHook {
    pub calls: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl ResponseHook for RecordingHook {
    fn name(&self) -> &str {
        "recording"
    }

    async fn on_response(&self, source: &MemoryRecord, replies: &[MemoryRecord]) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((source.content.text.clone(), replies.len()));
        Ok(())
    }
}

/// Market fake returning fixed tables, or failing when built with `down()`.
#[derive(Default)]
pub struct FakeMarket {
    pub tickers: Vec<Ticker24h>,
    pub coins: Vec<TrendingCoin>,
    pub down: bool,
}

impl FakeMarket {
    pub fn down() -> Self {
        Self {
            down: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl MarketData for FakeMarket {
    async fn tickers_24h(&self) -> Result<Vec<Ticker24h>> {
        if self.down {
            bail!("GET /api/v3/ticker/24hr failed (503 Service Unavailable)");
        }
        Ok(self.tickers.clone())
    }

    async fn trending(&self) -> Result<Vec<TrendingCoin>> {
        if self.down {
            bail!("GET /api/v3/search/trending failed (429 Too Many Requests)");
        }
        Ok(self.coins.clone())
    }
}

pub fn ticker(symbol: &str, price: &str, change: &str, volume: &str) -> Ticker24h {
    Ticker24h {
        symbol: symbol.to_string(),
        last_price: price.parse().unwrap(),
        price_change_percent: change.parse().unwrap(),
        quote_volume: volume.parse().unwrap(),
    }
}

pub fn trending_coin(symbol: &str, market_cap_btc: &str) -> TrendingCoin {
    TrendingCoin {
        item: TrendingItem {
            id: symbol.to_lowercase(),
            name: format!("{symbol} Coin"),
            symbol: symbol.to_string(),
            market_cap_rank: Some(120),
            score: 0,
            data: Some(TrendingData {
                price: Some(0.25),
                price_change_percentage_24h: HashMap::from([("usd".to_string(), 4.2)]),
                market_cap: Some("$250,000,000".to_string()),
                market_cap_btc: Some(market_cap_btc.to_string()),
                total_volume: Some("$12,000,000".to_string()),
                content: None,
            }),
        },
    }
}
