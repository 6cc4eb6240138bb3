use crate::types::{ClientKind, ClientSummary, ItemOutcome};

/// Largest tweet id a topic client has processed. Never decreases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HighWaterMark(Option<u64>);

impl HighWaterMark {
    pub fn new(mark: Option<u64>) -> Self {
        Self(mark)
    }

    pub fn get(&self) -> Option<u64> {
        self.0
    }

    /// Whether `id` is newer than anything processed so far.
    pub fn admits(&self, id: u64) -> bool {
        self.0.is_none_or(|mark| id > mark)
    }

    /// Move the mark to `id` if that is an advance.
    pub fn advance(&mut self, id: u64) {
        self.0 = Some(self.0.map_or(id, |mark| mark.max(id)));
    }

    /// Encoding used in the cache.
    pub fn encode(&self) -> Option<String> {
        self.0.map(|m| m.to_string())
    }

    /// Parse a cached value; anything unparseable counts as no mark.
    pub fn decode(raw: Option<&str>) -> Self {
        Self(raw.and_then(|s| s.trim().parse().ok()))
    }
}

/// Running counters for one scheduled client.
#[derive(Debug, Clone, Default)]
pub struct ClientStats {
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
}

impl ClientStats {
    /// Fold one item outcome into the counters.
    pub fn record_outcome(&mut self, outcome: &ItemOutcome) {
        self.processed += 1;
        match outcome {
            ItemOutcome::AlreadyHandled => self.already_handled += 1,
            ItemOutcome::RateLimited => self.rate_limited += 1,
            ItemOutcome::Declined { liked, .. } => {
                self.declined += 1;
                if *liked {
                    self.likes_sent += 1;
                }
            }
            ItemOutcome::Liked => self.likes_sent += 1,
            ItemOutcome::Replied { tweets } => self.replies_sent += *tweets as u64,
            ItemOutcome::DryRun { .. } => self.dry_run_actions += 1,
            ItemOutcome::Empty => {}
            ItemOutcome::Failed { .. } => self.item_errors += 1,
        }
    }

    pub fn summary(&self, client: ClientKind, mark: Option<&HighWaterMark>) -> ClientSummary {
        ClientSummary {
            client: Some(client),
            ticks: self.ticks,
            tick_errors: self.tick_errors,
            fetch_failures: self.fetch_failures,
            candidates: self.candidates,
            stale_skipped: self.stale_skipped,
            processed: self.processed,
            already_handled: self.already_handled,
            rate_limited: self.rate_limited,
            declined: self.declined,
            replies_sent: self.replies_sent,
            likes_sent: self.likes_sent,
            channel_messages: self.channel_messages,
            dry_run_actions: self.dry_run_actions,
            item_errors: self.item_errors,
            high_water_mark: mark.and_then(HighWaterMark::encode),
        }
    }
}
