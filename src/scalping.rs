use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rand::seq::IndexedRandom;
use tracing::{info, warn};

use crate::agent::Agent;
use crate::api::MarketData;
use crate::config::SettingsConfig;
use crate::engine::{
    RELATED_TOKENS, SCALPING_POOL_SIZE, clean_generated_post, compact_volume, describe_ticker,
    select_scalping_tokens,
};
use crate::executor;
use crate::llm::generate_message_response;
use crate::prompts::{compose, scalping_template};
use crate::scheduler::PeriodicTask;
use crate::state::ClientStats;
use crate::telegram::Messenger;
use crate::types::{ClientKind, ClientSummary, ModelClass, TickEvent};

/// Settings shared by the two channel-posting clients.
#[derive(Debug, Clone)]
pub struct MarketSettings {
    pub period: Duration,
    pub dry_run: bool,
    pub channel_id: String,
    pub max_message_len: usize,
}

impl MarketSettings {
    pub fn from_config(settings: &SettingsConfig, kind: ClientKind) -> Self {
        let period_secs = match kind {
            ClientKind::Trending => settings.trending_interval_secs,
            _ => settings.scalping_interval_secs,
        };
        Self {
            period: Duration::from_secs(period_secs),
            dry_run: settings.dry_run,
            channel_id: settings.telegram_channel_id.clone(),
            max_message_len: settings.max_message_len,
        }
    }
}

/// Posts a short trading idea for one high-volume token each tick.
pub struct ScalpingClient {
    agent: Arc<Agent>,
    market: Arc<dyn MarketData>,
    messenger: Arc<dyn Messenger>,
    settings: MarketSettings,
    stats: ClientStats,
}

impl ScalpingClient {
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
}

#[async_trait]
impl PeriodicTask for ScalpingClient {
    fn kind(&self) -> ClientKind {
        ClientKind::Scalping
    }

    fn period(&self) -> Duration {
        self.settings.period
    }

    async fn tick(&mut self) -> Result<TickEvent> {
        self.stats.ticks += 1;
        let mut event = TickEvent {
            timestamp: Utc::now().to_rfc3339(),
            client: ClientKind::Scalping,
            topic: None,
            candidates: 0,
            items: Vec::new(),
            high_water_mark: None,
            messages: 0,
            dry_run: self.settings.dry_run,
        };

        let tickers = match self.market.tickers_24h().await {
            Ok(t) => t,
            Err(e) => {
                warn!("SCALPING: failed to fetch tickers: {e:#}");
                self.stats.fetch_failures += 1;
                return Ok(event);
            }
        };

        let pool = select_scalping_tokens(tickers, RELATED_TOKENS, SCALPING_POOL_SIZE);
        event.candidates = pool.len();
        self.stats.candidates += pool.len() as u64;
        let picked = pool.choose(&mut rand::rng()).cloned();
        let Some(token) = picked else {
            info!("SCALPING: no eligible tokens this tick");
            return Ok(event);
        };
        info!(
            "SCALPING: picked {} from {} candidate(s)",
            token.symbol,
            pool.len()
        );
        event.topic = Some(token.symbol.clone());

        let state = self
            .agent
            .prompt_state()
            .with("messageText", describe_ticker(&token))
            .with("tokenSymbol", token.symbol.as_str())
            .with("tokenPrice", token.last_price.normalize().to_string())
            .with("tokenChange", token.price_change_percent.normalize().to_string())
            .with("tokenVolume", compact_volume(token.quote_volume));
        let context = compose(&scalping_template(), &state);

        let response =
            match generate_message_response(self.agent.model.as_ref(), &context, ModelClass::Medium)
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!("SCALPING: {e}");
                    self.stats.item_errors += 1;
                    return Ok(event);
                }
            };
        let idea = clean_generated_post(&response.text);
        if idea.is_empty() {
            info!("SCALPING: model returned an empty idea");
            return Ok(event);
        }

        if self.settings.dry_run {
            info!("SCALPING: dry run, would have sent: {idea}");
            self.stats.dry_run_actions += 1;
            return Ok(event);
        }

        info!(
            "SCALPING: sending idea to channel {}",
            self.settings.channel_id
        );
        match executor::broadcast(
            self.messenger.as_ref(),
            &self.settings.channel_id,
            &idea,
            self.settings.max_message_len,
        )
        .await
        {
            Ok(n) => {
                event.messages = n;
                self.stats.channel_messages += n as u64;
            }
            Err(e) => {
                warn!("SCALPING: failed to send idea: {e:#}");
                self.stats.item_errors += 1;
            }
        }

        Ok(event)
    }

    fn summary(&self) -> ClientSummary {
        self.stats.summary(ClientKind::Scalping, None)
    }
}
