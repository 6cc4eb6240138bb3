//! Poll-Dedup-Respond loop shared by the discovery and like clients.
//!
//! Each tick picks a random topic, searches for a handful of recent posts,
//! drops duplicates, the agent's own posts and anything at or below the
//! high-water mark, then processes the rest oldest first. Processing is
//! idempotent per post through the dedup marker in the memory store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use rand::seq::{IndexedRandom, SliceRandom};
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::config::SettingsConfig;
use crate::engine::{
    format_conversation, format_tweet, is_rate_limited, select_candidates, strip_wrapping_quotes,
};
use crate::error::LoopError;
use crate::executor::{self, MAX_POST_LEN};
use crate::ids;
use crate::llm::{generate_message_response, generate_should_respond};
use crate::prompts::{
    compose, format_recent_interactions, message_handler_template, should_respond_template,
};
use crate::scheduler::PeriodicTask;
use crate::state::{ClientStats, HighWaterMark};
use crate::twitter::{MAX_THREAD_DEPTH, SocialClient, build_conversation_thread};
use crate::types::{
    ClientKind, ClientSummary, Connection, Content, ItemOutcome, ItemReport, MemoryRecord,
    ModelClass, SearchMode, ShouldRespond, TickEvent, Tweet,
};

/// Posts kept from each like-mode batch after shuffling.
const LIKE_BATCH_SIZE: usize = 2;

/// Posts fetched by the `@handle` mention search.
const MENTION_SEARCH_LIMIT: usize = 20;

/// Room records shown to the model as recent interactions.
const RECENT_INTERACTIONS: usize = 10;

const SOURCE: &str = "twitter";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicMode {
    /// Decide with the model and reply.
    Discovery,
    /// Like every new post, no model involved.
    Like,
}

impl TopicMode {
    pub fn kind(&self) -> ClientKind {
        match self {
            TopicMode::Discovery => ClientKind::Discovery,
            TopicMode::Like => ClientKind::Like,
        }
    }

    fn cache_name(&self) -> &'static str {
        match self {
            TopicMode::Discovery => "discovery",
            TopicMode::Like => "like",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub period: Duration,
    pub search_limit: usize,
    pub topic_reply_interval: TimeDelta,
    pub dry_run: bool,
    pub include_mentions: bool,
    pub like_on_ignore: bool,
    pub action_delay_min_ms: u64,
    pub action_delay_max_ms: u64,
}

impl PollSettings {
    pub fn from_config(settings: &SettingsConfig, mode: TopicMode) -> Self {
        let period_secs = match mode {
            TopicMode::Discovery => settings.discovery_interval_secs,
            TopicMode::Like => settings.like_interval_secs,
        };
        Self {
            period: Duration::from_secs(period_secs),
            search_limit: settings.search_limit,
            topic_reply_interval: reply_interval(settings.topic_reply_interval_secs),
            dry_run: settings.dry_run,
            include_mentions: settings.include_mentions,
            like_on_ignore: settings.like_on_ignore,
            action_delay_min_ms: settings.action_delay_min_ms,
            action_delay_max_ms: settings.action_delay_max_ms,
        }
    }
}

/// Reply window as a `TimeDelta`, saturating for values chrono cannot hold.
fn reply_interval(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

pub struct TopicClient {
    mode: TopicMode,
    agent: Arc<Agent>,
    social: Arc<dyn SocialClient>,
    settings: PollSettings,
    /// Loaded from the cache on the first tick.
    mark: Option<HighWaterMark>,
    stats: ClientStats,
}

impl TopicClient {
    pub fn new(
        mode: TopicMode,
        agent: Arc<Agent>,
        social: Arc<dyn SocialClient>,
        settings: PollSettings,
    ) -> Self {
        Self {
            mode,
            agent,
            social,
            settings,
            mark: None,
            stats: ClientStats::default(),
        }
    }

    fn prefix(&self) -> &'static str {
        self.mode.kind().prefix()
    }

    /// Cache key of this client's high-water mark.
    pub fn mark_key(&self) -> String {
        format!(
            "twitter/{}/{}_latest_checked_tweet_id",
            self.agent.profile.username,
            self.mode.cache_name()
        )
    }

    async fn load_mark(&self) -> HighWaterMark {
        match self.agent.cache.get(&self.mark_key()).await {
            Ok(raw) => {
                let mark = HighWaterMark::decode(raw.as_deref());
                debug!("{}: resuming from mark {:?}", self.prefix(), mark.get());
                mark
            }
            Err(e) => {
                warn!("{}: failed to read high-water mark: {e:#}", self.prefix());
                HighWaterMark::default()
            }
        }
    }

    /// Fetch this tick's batch. Any failed search ends the tick.
    async fn fetch_batch(&self, topic: Option<&str>) -> Result<Vec<Tweet>, LoopError> {
        let mut batch = Vec::new();

        if self.settings.include_mentions {
            let query = format!("@{}", self.agent.profile.username);
            let mentions = self
                .social
                .search(&query, MENTION_SEARCH_LIMIT, SearchMode::Latest)
                .await
                .map_err(LoopError::Fetch)?;
            info!("{}: found {} mention(s)", self.prefix(), mentions.len());
            batch.extend(mentions);
        }

        if let Some(topic) = topic {
            info!("{}: searching for topic {topic:?}", self.prefix());
            let found = self
                .social
                .search(topic, self.settings.search_limit, SearchMode::Latest)
                .await
                .map_err(LoopError::Fetch)?;
            info!("{}: found {} topic post(s)", self.prefix(), found.len());
            batch.extend(found);
        }

        Ok(batch)
    }

    /// Process one candidate; failures become an outcome, never an error.
    pub async fn process(&self, tweet: &Tweet) -> ItemOutcome {
        match self.try_process(tweet).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("{}: error processing {}: {e}", self.prefix(), tweet.id);
                ItemOutcome::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        }
    }

    async fn try_process(&self, tweet: &Tweet) -> Result<ItemOutcome, LoopError> {
        let agent = &self.agent;
        let marker = ids::dedup_marker(&tweet.id, agent.id);

        if agent
            .memory
            .get_by_id(marker)
            .await
            .map_err(LoopError::Store)?
            .is_some()
        {
            info!("{}: already handled {}, skipping", self.prefix(), tweet.id);
            return Ok(ItemOutcome::AlreadyHandled);
        }

        let room = ids::room_id(&tweet.conversation_id, agent.id);
        let room_records = agent
            .memory
            .list_by_room(room)
            .await
            .map_err(LoopError::Store)?;

        if !tweet.mentions(&agent.profile.username) {
            let last_reply = room_records
                .iter()
                .find(|r| r.user_id == agent.id)
                .map(|r| r.created_at);
            if is_rate_limited(Utc::now(), last_reply, self.settings.topic_reply_interval) {
                info!(
                    "{}: skipping {} due to topic reply rate limit",
                    self.prefix(),
                    tweet.id
                );
                return Ok(ItemOutcome::RateLimited);
            }
        }

        info!("{}: processing {}", self.prefix(), tweet.permanent_url());

        let author = agent.user_uuid(&tweet.user_id);
        agent
            .memory
            .ensure_connection(&Connection {
                user_id: author,
                room_id: room,
                username: tweet.username.clone(),
                name: tweet.name.clone(),
                source: SOURCE.to_string(),
            })
            .await
            .map_err(LoopError::Store)?;
        let thread = build_conversation_thread(tweet, self.social.as_ref(), MAX_THREAD_DEPTH).await;

        let source = MemoryRecord {
            id: marker,
            agent_id: agent.id,
            user_id: author,
            room_id: room,
            content: Content {
                text: tweet.text.clone(),
                source: Some(SOURCE.to_string()),
                url: Some(tweet.permanent_url()),
                in_reply_to: tweet
                    .in_reply_to_status_id
                    .as_deref()
                    .map(|parent| ids::dedup_marker(parent, agent.id)),
                ..Content::default()
            },
            created_at: tweet.created_at,
        };
        agent
            .memory
            .create(source.clone())
            .await
            .map_err(LoopError::Store)?;

        match self.mode {
            TopicMode::Like => self.like(tweet).await,
            TopicMode::Discovery => self.respond(tweet, &source, &thread, &room_records).await,
        }
    }

    async fn like(&self, tweet: &Tweet) -> Result<ItemOutcome, LoopError> {
        if self.settings.dry_run {
            info!("{}: dry run, would have liked {}", self.prefix(), tweet.id);
            return Ok(ItemOutcome::DryRun { text: None });
        }
        self.social.like(&tweet.id).await.map_err(LoopError::Send)?;
        info!("{}: liked {}", self.prefix(), tweet.id);
        Ok(ItemOutcome::Liked)
    }

    async fn respond(
        &self,
        tweet: &Tweet,
        source: &MemoryRecord,
        thread: &[Tweet],
        room_records: &[MemoryRecord],
    ) -> Result<ItemOutcome, LoopError> {
        let agent = &self.agent;
        let state = agent
            .prompt_state()
            .with("currentPost", format_tweet(tweet))
            .with("formattedConversation", format_conversation(thread))
            .with(
                "recentPostInteractions",
                format_recent_interactions(
                    room_records,
                    agent.id,
                    &agent.persona.name,
                    RECENT_INTERACTIONS,
                ),
            );

        let decision_context = compose(&should_respond_template(&agent.templates), &state);
        let decision =
            generate_should_respond(agent.model.as_ref(), &decision_context, ModelClass::Medium)
                .await?;
        info!("{}: decision for {}: {decision}", self.prefix(), tweet.id);

        if decision != ShouldRespond::Respond {
            let liked = self.settings.like_on_ignore && self.like_instead(tweet).await;
            return Ok(ItemOutcome::Declined { decision, liked });
        }

        let context = compose(&message_handler_template(&agent.templates), &state);
        debug!("{}: response prompt:\n{context}", self.prefix());
        let mut response =
            generate_message_response(agent.model.as_ref(), &context, ModelClass::Medium).await?;
        response.text = strip_wrapping_quotes(&response.text).trim().to_string();
        response.in_reply_to = Some(source.id);

        if response.text.is_empty() {
            info!("{}: empty response for {}", self.prefix(), tweet.id);
            return Ok(ItemOutcome::Empty);
        }

        if self.settings.dry_run {
            info!(
                "{}: dry run, would have replied to {} with: {}",
                self.prefix(),
                tweet.id,
                response.text
            );
            return Ok(ItemOutcome::DryRun {
                text: Some(response.text),
            });
        }

        let sent = executor::send_reply_thread(
            self.social.as_ref(),
            &response.text,
            &tweet.id,
            MAX_POST_LEN,
        )
        .await
        .map_err(LoopError::Send)?;

        let records = executor::reply_records(agent.id, source.room_id, &sent, &response);
        for record in &records {
            agent
                .memory
                .create(record.clone())
                .await
                .map_err(LoopError::Store)?;
        }

        for hook in &agent.hooks {
            if let Err(e) = hook.on_response(source, &records).await {
                warn!("{}: hook {} failed: {e:#}", self.prefix(), hook.name());
            }
        }

        let transcript = format!(
            "Context:\n\n{context}\n\nSelected Post: {} - {}: {}\nAgent's Output:\n{}",
            tweet.id, tweet.username, tweet.text, response.text
        );
        let key = format!("twitter/tweet_generation_{}.txt", tweet.id);
        if let Err(e) = agent.cache.set(&key, &transcript).await {
            warn!("{}: failed to cache transcript {key}: {e:#}", self.prefix());
        }

        info!(
            "{}: replied to {} with {} post(s)",
            self.prefix(),
            tweet.id,
            sent.len()
        );
        executor::pause(
            self.settings.action_delay_min_ms,
            self.settings.action_delay_max_ms,
        )
        .await;

        Ok(ItemOutcome::Replied { tweets: sent.len() })
    }

    /// Like a declined post. Returns whether a like was actually sent.
    async fn like_instead(&self, tweet: &Tweet) -> bool {
        if self.settings.dry_run {
            info!(
                "{}: dry run, would have liked {} instead",
                self.prefix(),
                tweet.id
            );
            return false;
        }
        match self.social.like(&tweet.id).await {
            Ok(()) => {
                info!("{}: liked {} instead of replying", self.prefix(), tweet.id);
                true
            }
            Err(e) => {
                warn!("{}: failed to like {}: {e:#}", self.prefix(), tweet.id);
                false
            }
        }
    }
}

#[async_trait]
impl PeriodicTask for TopicClient {
    fn kind(&self) -> ClientKind {
        self.mode.kind()
    }

    fn period(&self) -> Duration {
        self.settings.period
    }

    async fn tick(&mut self) -> Result<TickEvent> {
        self.stats.ticks += 1;
        let mut mark = match self.mark {
            Some(mark) => mark,
            None => self.load_mark().await,
        };
        self.mark = Some(mark);

        let topic = self.agent.persona.topics.choose(&mut rand::rng()).cloned();
        if topic.is_none() {
            debug!("{}: no topics configured", self.prefix());
        }

        let mut event = TickEvent {
            timestamp: Utc::now().to_rfc3339(),
            client: self.mode.kind(),
            topic: topic.clone(),
            candidates: 0,
            items: Vec::new(),
            high_water_mark: mark.encode(),
            messages: 0,
            dry_run: self.settings.dry_run,
        };

        let mut batch = match self.fetch_batch(topic.as_deref()).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!("{}: {e}", self.prefix());
                self.stats.fetch_failures += 1;
                return Ok(event);
            }
        };

        if self.mode == TopicMode::Like {
            batch.shuffle(&mut rand::rng());
            batch.truncate(LIKE_BATCH_SIZE);
        }

        let candidates = select_candidates(batch, &self.agent.profile.id);
        info!("{}: {} candidate(s)", self.prefix(), candidates.len());
        event.candidates = candidates.len();
        self.stats.candidates += candidates.len() as u64;

        for tweet in candidates {
            let Some(id) = tweet.numeric_id() else {
                continue;
            };
            if !mark.admits(id) {
                self.stats.stale_skipped += 1;
                continue;
            }
            let outcome = self.process(&tweet).await;
            mark.advance(id);
            self.stats.record_outcome(&outcome);
            event.items.push(ItemReport {
                tweet_id: tweet.id,
                outcome,
            });
        }

        self.mark = Some(mark);
        event.high_water_mark = mark.encode();
        if let Some(encoded) = mark.encode() {
            if let Err(e) = self.agent.cache.set(&self.mark_key(), &encoded).await {
                warn!("{}: failed to persist high-water mark: {e:#}", self.prefix());
                self.stats.tick_errors += 1;
            }
        }

        info!("{}: finished tick", self.prefix());
        Ok(event)
    }

    fn summary(&self) -> ClientSummary {
        self.stats.summary(self.mode.kind(), self.mark.as_ref())
    }
}
