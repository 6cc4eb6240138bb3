//! Deterministic UUIDs for memory-store keys.
//!
//! Every key is a v5 UUID over a readable seed, so the same tweet seen by the
//! same agent always maps to the same record.

use uuid::Uuid;

fn from_seed(seed: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes())
}

/// Agent identity derived from the persona name.
pub fn agent_uuid(name: &str) -> Uuid {
    from_seed(&format!("agent:{name}"))
}

/// Dedup marker for an item: existence of a record here means "handled".
pub fn dedup_marker(item_id: &str, agent_id: Uuid) -> Uuid {
    from_seed(&format!("{item_id}-{agent_id}"))
}

/// Room for a conversation thread, scoped to the agent.
pub fn room_id(conversation_id: &str, agent_id: Uuid) -> Uuid {
    from_seed(&format!("room:{conversation_id}-{agent_id}"))
}

pub fn user_uuid(user_id: &str) -> Uuid {
    from_seed(&format!("user:{user_id}"))
}

/// Record id of a channel post sent at `timestamp_ms`.
pub fn channel_post_id(timestamp_ms: i64, agent_id: Uuid) -> Uuid {
    from_seed(&format!("telegram-{timestamp_ms}-{agent_id}"))
}

/// Room holding the trending client's channel posts.
pub fn trending_room(agent_id: Uuid) -> Uuid {
    from_seed(&format!("trending-room-{agent_id}"))
}
