//! Prompt templates and `{{key}}` composition.
//!
//! Templates are plain strings with `{{key}}` slots. A [`PromptState`] is
//! built from the persona once per call and extended with the per-item
//! values (`currentPost`, `formattedConversation`, `coinData`, ...).

use std::collections::HashMap;

use uuid::Uuid;

use crate::config::{AgentConfig, TemplatesConfig};
use crate::types::MemoryRecord;

/// Appended to templates whose answer is parsed as a decision.
pub const SHOULD_RESPOND_FOOTER: &str = "\
Answer with exactly one of [RESPOND], [IGNORE] or [STOP].
If {{agentName}} has nothing useful to add, choose [IGNORE].";

/// Appended to templates whose answer is parsed as a message.
pub const MESSAGE_FOOTER: &str = "\
Reply with a JSON block in this format:
```json
{ \"user\": \"{{agentName}}\", \"text\": \"<message>\", \"action\": \"<action or NONE>\" }
```";

pub const SHOULD_RESPOND_TEMPLATE: &str = "\
# Decide whether {{agentName}} (@{{twitterUserName}}) should reply to this post

{{agentName}} replies to posts where they can add something to the conversation
and reach new readers.

RESPOND when the post touches {{agentName}}'s interests and a reply adds value.
IGNORE when the post is off-topic, crowded, or a reply would be filler.
STOP when the conversation is over or the author asked to be left alone.

{{topics}}

Current post:
{{currentPost}}

Thread:
{{formattedConversation}}
";

pub const MESSAGE_HANDLER_TEMPLATE: &str = "\
# About {{agentName}} (@{{twitterUserName}})
{{bio}}
{{lore}}
{{topics}}

{{characterPostExamples}}

{{postDirections}}

Recent interactions of {{agentName}} in this conversation:
{{recentPostInteractions}}

# Write a reply as {{agentName}} (@{{twitterUserName}}), using the thread as context.
Current post:
{{currentPost}}

Thread:
{{formattedConversation}}
";

pub const SCALPING_TEMPLATE: &str = "\
# Write a short trading idea post in the voice of {{agentName}} (@{{twitterUserName}})

{{messageText}}

Token:
- Symbol: {{tokenSymbol}}
- Price: {{tokenPrice}}
- 24h change: {{tokenChange}}%
- 24h volume: {{tokenVolume}}

Rules:
- at most 200 characters
- one timeframe only: 1h, 4h, 1d, 1w or 1m
- no emojis, hashtags, greetings or questions
- no price targets or numbers
- one sentence per line
- say why the token looks interesting, casually
";

pub const TRENDING_TEMPLATE: &str = "\
# Analyze these trending coins for {{agentName}}'s channel

{{coinData}}

Guidelines:
- no introduction
- focus on notable price moves and volume
- mention sentiment or project news only when relevant
- keep it short
";

/// Values substituted into a template.
#[derive(Debug, Clone, Default)]
pub struct PromptState {
    values: HashMap<String, String>,
}

impl PromptState {
    /// Persona slots shared by every template.
    pub fn for_persona(persona: &AgentConfig, handle: &str) -> Self {
        let name = &persona.name;
        let mut state = Self::default();
        state.set("agentName", name.as_str());
        state.set("twitterUserName", handle);
        state.set("bio", persona.bio.join(" "));
        state.set("lore", persona.lore.join("\n"));
        if !persona.topics.is_empty() {
            state.set(
                "topics",
                format!("{name} is interested in {}", persona.topics.join(", ")),
            );
        }
        if !persona.post_directions.is_empty() {
            state.set(
                "postDirections",
                format!(
                    "# Post directions for {name}\n{}",
                    bullet_list(&persona.post_directions)
                ),
            );
        }
        if !persona.post_examples.is_empty() {
            state.set(
                "characterPostExamples",
                format!(
                    "# Example posts by {name}\n{}",
                    persona.post_examples.join("\n")
                ),
            );
        }
        state
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

fn bullet_list(lines: &[String]) -> String {
    lines
        .iter()
        .map(|l| format!("- {l}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_key(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Replace every `{{key}}` with its value. Unknown keys become empty;
/// anything between braces that is not a key is left untouched.
pub fn compose(template: &str, state: &PromptState) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) if is_key(after[..end].trim()) => {
                out.push_str(state.get(after[..end].trim()).unwrap_or_default());
                rest = &after[end + 2..];
            }
            _ => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Should-respond template with its footer, honoring a configured override.
pub fn should_respond_template(templates: &TemplatesConfig) -> String {
    let body = templates
        .should_respond
        .as_deref()
        .unwrap_or(SHOULD_RESPOND_TEMPLATE);
    format!("{body}\n{SHOULD_RESPOND_FOOTER}")
}

/// Message-handler template with its footer, honoring a configured override.
pub fn message_handler_template(templates: &TemplatesConfig) -> String {
    let body = templates
        .message_handler
        .as_deref()
        .unwrap_or(MESSAGE_HANDLER_TEMPLATE);
    format!("{body}\n{MESSAGE_FOOTER}")
}

pub fn scalping_template() -> String {
    format!("{SCALPING_TEMPLATE}\n{MESSAGE_FOOTER}")
}

pub fn trending_template() -> String {
    format!("{TRENDING_TEMPLATE}\n{MESSAGE_FOOTER}")
}

/// Render room records (newest first, as the store returns them) oldest
/// first, naming the agent's own lines.
pub fn format_recent_interactions(
    records: &[MemoryRecord],
    agent_id: Uuid,
    agent_name: &str,
    limit: usize,
) -> String {
    records
        .iter()
        .take(limit)
        .rev()
        .map(|r| {
            let who = if r.user_id == agent_id { agent_name } else { "user" };
            format!("{who}: {}", r.content.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
