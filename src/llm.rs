use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::LoopError;
use crate::types::{Content, ModelClass, ShouldRespond};

/// Model-generation collaborator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, context: &str, class: ModelClass) -> Result<String>;
}

/// Client for any OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiCompatClient {
    client: Client,
    base: String,
    /// Pre-computed `"Bearer <key>"` header value.
    auth_header: Option<String>,
    models: ModelConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 1],
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiCompatClient {
    pub fn new(base: &str, api_key: Option<&str>, models: ModelConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base: base.trim_end_matches('/').to_string(),
            auth_header: api_key
                .filter(|k| !k.is_empty())
                .map(|k| format!("Bearer {k}")),
            models,
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatClient {
    async fn generate(&self, context: &str, class: ModelClass) -> Result<String> {
        let model = self.models.model_for(class);
        let body = ChatRequest {
            model,
            messages: [Message {
                role: "user",
                content: context,
            }],
            temperature: self.models.temperature,
        };

        let mut req = self
            .client
            .post(format!("{}/v1/chat/completions", self.base))
            .json(&body);
        if let Some(auth) = &self.auth_header {
            req = req.header(reqwest::header::AUTHORIZATION, auth);
        }

        let resp = req.send().await.context("chat completion request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let err = resp
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            bail!("chat completion failed ({status}): {err}");
        }

        let parsed: ChatResponse = resp.json().await.context("chat completion: bad body")?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("chat completion returned no content")?;
        debug!("Model {model} returned {} chars", text.len());
        Ok(text)
    }
}

/// Ask the model whether to engage with a post.
pub async fn generate_should_respond(
    model: &dyn TextGenerator,
    context: &str,
    class: ModelClass,
) -> Result<ShouldRespond, LoopError> {
    let raw = model
        .generate(context, class)
        .await
        .map_err(LoopError::Model)?;
    ShouldRespond::parse(&raw)
        .ok_or_else(|| LoopError::Malformed(format!("no decision in {:?}", truncate(&raw, 80))))
}

/// Ask the model for a reply and parse it into `Content`.
pub async fn generate_message_response(
    model: &dyn TextGenerator,
    context: &str,
    class: ModelClass,
) -> Result<Content, LoopError> {
    let raw = model
        .generate(context, class)
        .await
        .map_err(LoopError::Model)?;
    Ok(parse_message_response(&raw))
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    text: String,
    action: Option<String>,
}

/// Extract `{"text": .., "action": ..}` from a fenced JSON block.
///
/// Falls back to treating the whole answer as the text.
pub fn parse_message_response(raw: &str) -> Content {
    let block = extract_json_block(raw).and_then(|j| serde_json::from_str::<ResponseBlock>(j).ok());
    match block {
        Some(b) => Content {
            text: b.text.trim().to_string(),
            action: b.action.filter(|a| !a.is_empty() && a != "NONE"),
            ..Content::default()
        },
        None => Content::text(raw.trim()),
    }
}

fn extract_json_block(raw: &str) -> Option<&str> {
    if let Some(start) = raw.find("```json") {
        let rest = &raw[start + "```json".len()..];
        let end = rest.find("```")?;
        return Some(rest[..end].trim());
    }
    let trimmed = raw.trim();
    (trimmed.starts_with('{') && trimmed.ends_with('}')).then_some(trimmed)
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
