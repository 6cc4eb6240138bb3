use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::api::MarketData;
use crate::engine::{
    MAX_TRENDING_CAP_BTC, TRENDING_SAMPLE_SIZE, format_trending_coins, select_trending_coins,
};
use crate::executor;
use crate::ids;
use crate::llm::generate_message_response;
use crate::prompts::{compose, trending_template};
use crate::scalping::MarketSettings;
use crate::scheduler::PeriodicTask;
use crate::state::ClientStats;
use crate::telegram::Messenger;
use crate::types::{
    ClientKind, ClientSummary, Connection, Content, MemoryRecord, ModelClass, TickEvent,
};

const SOURCE: &str = "telegram-crypto-trending";

/// Posts a short analysis of small-cap trending coins each tick, and keeps
/// each analysis in the agent's trending room.
pub struct TrendingClient {
    agent: Arc<Agent>,
    market: Arc<dyn MarketData>,
    messenger: Arc<dyn Messenger>,
    settings: MarketSettings,
    stats: ClientStats,
}

impl TrendingClient {
    pub fn new(
        agent: Arc<Agent>,
        market: Arc<dyn MarketData>,
        messenger: Arc<dyn Messenger>,
        settings: MarketSettings,
    ) -> Self {
        Self {
            agent,
            market,
            messenger,
            settings,
            stats: ClientStats::default(),
        }
    }

    /// Store the sent analysis and cache the prompt transcript. Failures
    /// here never undo the send.
    async fn remember(&mut self, context: &str, response: &Content) {
        let agent = &self.agent;
        let now = Utc::now();
        let room = ids::trending_room(agent.id);

        let connection = Connection {
            user_id: agent.id,
            room_id: room,
            username: agent.profile.username.clone(),
            name: agent.persona.name.clone(),
            source: "telegram".to_string(),
        };
        let record = MemoryRecord {
            id: ids::channel_post_id(now.timestamp_millis(), agent.id),
            agent_id: agent.id,
            user_id: agent.id,
            room_id: room,
            content: Content {
                text: response.text.clone(),
                action: response.action.clone(),
                source: Some(SOURCE.to_string()),
                ..Content::default()
            },
            created_at: now,
        };
        let stored = match agent.memory.ensure_connection(&connection).await {
            Ok(()) => agent.memory.create(record).await,
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            warn!("TRENDING: failed to store analysis: {e:#}");
            self.stats.item_errors += 1;
        }

        let key = format!("telegram/crypto_trending_{}.txt", now.timestamp_millis());
        let transcript = format!("Context:\n\n{context}\n\nAgent's Analysis:\n{}", response.text);
        match agent.cache.set(&key, &transcript).await {
            Ok(()) => debug!("TRENDING: cached transcript {key}"),
            Err(e) => warn!("TRENDING: failed to cache transcript {key}: {e:#}"),
        }
    }
}

#[async_trait]
impl PeriodicTask for TrendingClient {
    fn kind(&self) -> ClientKind {
        ClientKind::Trending
    }

    fn period(&self) -> Duration {
        self.settings.period
    }

    async fn tick(&mut self) -> Result<TickEvent> {
        self.stats.ticks += 1;
        let mut event = TickEvent {
            timestamp: Utc::now().to_rfc3339(),
            client: ClientKind::Trending,
            topic: None,
            candidates: 0,
            items: Vec::new(),
            high_water_mark: None,
            messages: 0,
            dry_run: self.settings.dry_run,
        };

        let coins = match self.market.trending().await {
            Ok(c) => c,
            Err(e) => {
                warn!("TRENDING: failed to fetch trending coins: {e:#}");
                self.stats.fetch_failures += 1;
                return Ok(event);
            }
        };

        let selected = select_trending_coins(
            coins,
            MAX_TRENDING_CAP_BTC,
            TRENDING_SAMPLE_SIZE,
            &mut rand::rng(),
        );
        event.candidates = selected.len();
        self.stats.candidates += selected.len() as u64;
        if selected.is_empty() {
            info!("TRENDING: no coins under the market-cap limit");
            return Ok(event);
        }
        let symbols: Vec<String> = selected.iter().map(|c| c.item.symbol.to_uppercase()).collect();
        info!("TRENDING: analyzing {}", symbols.join(", "));
        event.topic = Some(symbols.join(","));

        let state = self
            .agent
            .prompt_state()
            .with("coinData", format_trending_coins(&selected));
        let context = compose(&trending_template(), &state);

        let response =
            match generate_message_response(self.agent.model.as_ref(), &context, ModelClass::Medium)
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!("TRENDING: {e}");
                    self.stats.item_errors += 1;
                    return Ok(event);
                }
            };
        if response.text.trim().is_empty() {
            info!("TRENDING: model returned no analysis");
            return Ok(event);
        }

        if self.settings.dry_run {
            info!("TRENDING: dry run, would have sent: {}", response.text);
            self.stats.dry_run_actions += 1;
            return Ok(event);
        }

        info!(
            "TRENDING: sending analysis to channel {}",
            self.settings.channel_id
        );
        match executor::broadcast(
            self.messenger.as_ref(),
            &self.settings.channel_id,
            &response.text,
            self.settings.max_message_len,
        )
        .await
        {
            Ok(n) => {
                event.messages = n;
                self.stats.channel_messages += n as u64;
            }
            Err(e) => {
                warn!("TRENDING: failed to send analysis: {e:#}");
                self.stats.item_errors += 1;
                return Ok(event);
            }
        }

        self.remember(&context, &response).await;
        Ok(event)
    }

    fn summary(&self) -> ClientSummary {
        self.stats.summary(ClientKind::Trending, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeMarket, FakeMessenger, FakeModel, make_agent, trending_coin};

    struct Harness {
        client: TrendingClient,
        agent: Arc<Agent>,
        model: Arc<FakeModel>,
        messenger: Arc<FakeMessenger>,
    }

    fn harness(
        answers: &[&str],
        market: FakeMarket,
        messenger: FakeMessenger,
        dry_run: bool,
    ) -> Harness {
        let model = Arc::new(FakeModel::new(answers.iter().copied()));
        let messenger = Arc::new(messenger);
        let agent = Arc::new(make_agent(&[], model.clone()));
        let client = TrendingClient::new(
            agent.clone(),
            Arc::new(market),
            messenger.clone(),
            MarketSettings {
                period: Duration::from_secs(3960),
                dry_run,
                channel_id: "-100123".into(),
                max_message_len: 280,
            },
        );
        Harness {
            client,
            agent,
            model,
            messenger,
        }
    }

    fn market() -> FakeMarket {
        FakeMarket {
            coins: vec![
                trending_coin("PEPE", "12000.5"),
                trending_coin("BIG", "95000"),
                trending_coin("WIF", "1,250"),
            ],
            ..FakeMarket::default()
        }
    }

    #[tokio::test]
    async fn sends_and_remembers_analysis() {
        let mut h = harness(
            &[concat!(
                "```json\n",
                "{\"text\": \"pepe and wif lead small caps today\", \"action\": \"NONE\"}\n",
                "```"
            )],
            market(),
            FakeMessenger::default(),
            false,
        );

        let event = h.client.tick().await.unwrap();

        assert_eq!(event.candidates, 2);
        assert_eq!(event.messages, 1);
        assert_eq!(h.messenger.texts(), vec!["pepe and wif lead small caps today"]);

        let prompt = h.model.prompts.lock().unwrap()[0].0.clone();
        assert!(prompt.contains("PEPE"));
        assert!(prompt.contains("WIF"));
        assert!(!prompt.contains("BIG Coin"));

        let room = ids::trending_room(h.agent.id);
        let records = h.agent.memory.list_by_room(room).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content.source.as_deref(), Some(SOURCE));
        assert_eq!(records[0].user_id, h.agent.id);
        assert_eq!(records[0].content.action, None);
    }

    #[tokio::test]
    async fn long_analysis_is_split() {
        let text = format!("{}\n{}", "a".repeat(250), "b".repeat(100));
        let answer = serde_json::json!({ "text": text }).to_string();
        let mut h = harness(&[answer.as_str()], market(), FakeMessenger::default(), false);

        let event = h.client.tick().await.unwrap();
        assert_eq!(event.messages, 2);
        assert!(h.messenger.texts().iter().all(|t| t.chars().count() <= 280));
    }

    #[tokio::test]
    async fn dry_run_neither_sends_nor_stores() {
        let mut h = harness(&["small caps are moving"], market(), FakeMessenger::default(), true);
        let event = h.client.tick().await.unwrap();
        assert!(event.dry_run);
        assert_eq!(event.messages, 0);
        assert!(h.messenger.texts().is_empty());
        let records = h
            .agent
            .memory
            .list_by_room(ids::trending_room(h.agent.id))
            .await
            .unwrap();
        assert!(records.is_empty());
        assert_eq!(h.client.summary().dry_run_actions, 1);
    }

    #[tokio::test]
    async fn nothing_under_cap_skips_model() {
        let market = FakeMarket {
            coins: vec![trending_coin("BIG", "95000")],
            ..FakeMarket::default()
        };
        let mut h = harness(&["unused"], market, FakeMessenger::default(), false);
        let event = h.client.tick().await.unwrap();
        assert_eq!(event.candidates, 0);
        assert_eq!(h.model.calls(), 0);
    }

    #[tokio::test]
    async fn send_failure_skips_memory() {
        let mut h = harness(&["small caps are moving"], market(), FakeMessenger::failing(), false);
        h.client.tick().await.unwrap();
        let records = h
            .agent
            .memory
            .list_by_room(ids::trending_room(h.agent.id))
            .await
            .unwrap();
        assert!(records.is_empty());
        assert_eq!(h.client.summary().item_errors, 1);
    }

    #[tokio::test]
    async fn fetch_failure_is_counted() {
        let mut h = harness(&["unused"], FakeMarket::down(), FakeMessenger::default(), false);
        h.client.tick().await.unwrap();
        assert_eq!(h.client.summary().fetch_failures, 1);
        assert_eq!(h.model.calls(), 0);
    }
}
