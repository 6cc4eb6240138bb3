use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

/// Messaging-bot collaborator used by the market clients.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<()>;
}

/// Telegram Bot API client.
pub struct TelegramBot {
    client: Client,
    base: String,
    token: String,
}

impl TelegramBot {
    pub fn new(base: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            base: base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base, self.token)
    }
}

#[async_trait]
impl Messenger for TelegramBot {
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<()> {
        let body = json!({
            "chat_id": channel_id,
            "text": text,
        });

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .context("Telegram sendMessage request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            bail!("Telegram sendMessage failed ({status}): {err}");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_embeds_token() {
        let bot = TelegramBot::new("https://api.telegram.org/", "123:abc");
        assert_eq!(
            bot.api_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }
}
