use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::split_message;
use crate::ids;
use crate::telegram::Messenger;
use crate::twitter::SocialClient;
use crate::types::{Content, MemoryRecord, Tweet};

/// Delay between consecutive posts of one reply thread.
const INTER_POST_DELAY: Duration = Duration::from_millis(500);

/// Longest single post on the social network.
pub const MAX_POST_LEN: usize = 280;

/// Action stored on every reply record except the last of a thread.
pub const CONTINUE_ACTION: &str = "CONTINUE";

/// Post `text` as a reply to `in_reply_to`, splitting it into a chain of
/// posts where each chunk replies to the previous one.
///
/// A failure on the first post is an error. A failure later in the chain
/// is logged and the posts that did go out are returned.
pub async fn send_reply_thread(
    social: &dyn SocialClient,
    text: &str,
    in_reply_to: &str,
    max_len: usize,
) -> Result<Vec<Tweet>> {
    let chunks = split_message(text, max_len);
    let mut sent: Vec<Tweet> = Vec::with_capacity(chunks.len());

    for (idx, chunk) in chunks.iter().enumerate() {
        let parent = sent.last().map_or(in_reply_to, |t| t.id.as_str());
        match social.post(chunk, Some(parent)).await {
            Ok(tweet) => sent.push(tweet),
            Err(e) if sent.is_empty() => return Err(e),
            Err(e) => {
                warn!(
                    "Reply chain to {in_reply_to} stopped after {} of {} posts: {e:#}",
                    sent.len(),
                    chunks.len()
                );
                break;
            }
        }

        if idx + 1 < chunks.len() {
            tokio::time::sleep(INTER_POST_DELAY).await;
        }
    }

    Ok(sent)
}

/// One memory record per sent post. Every record but the last carries the
/// `CONTINUE` action; the last carries the generated response's action.
pub fn reply_records(
    agent_id: Uuid,
    room_id: Uuid,
    sent: &[Tweet],
    response: &Content,
) -> Vec<MemoryRecord> {
    let last = sent.len().saturating_sub(1);
    sent.iter()
        .enumerate()
        .map(|(idx, tweet)| MemoryRecord {
            id: ids::dedup_marker(&tweet.id, agent_id),
            agent_id,
            user_id: agent_id,
            room_id,
            content: Content {
                text: tweet.text.clone(),
                action: if idx == last {
                    response.action.clone()
                } else {
                    Some(CONTINUE_ACTION.to_string())
                },
                source: Some("twitter".to_string()),
                url: Some(tweet.permanent_url()),
                in_reply_to: response.in_reply_to,
            },
            created_at: tweet.created_at,
        })
        .collect()
}

/// Send `text` to a channel in chunks of at most `max_len` characters.
/// Returns the number of messages sent.
pub async fn broadcast(
    messenger: &dyn Messenger,
    channel_id: &str,
    text: &str,
    max_len: usize,
) -> Result<usize> {
    let chunks = split_message(text, max_len);
    for chunk in &chunks {
        messenger.send_message(channel_id, chunk).await?;
    }
    info!("Sent {} message(s) to channel {channel_id}", chunks.len());
    Ok(chunks.len())
}

/// Sleep for a random duration in `[min_ms, max_ms]`.
pub async fn pause(min_ms: u64, max_ms: u64) {
    let (lo, hi) = (min_ms.min(max_ms), min_ms.max(max_ms));
    if hi == 0 {
        return;
    }
    let ms = rand::rng().random_range(lo..=hi);
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
