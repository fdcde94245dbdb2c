use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::NotifyChannel;
use crate::secrets::{self, SecretManager};
use crate::utils::error::{NotifyError, SecretError};

#[derive(Debug, Clone, Deserialize)]
struct DiscordCredentials {
    token: String,
    channel: String,
}

/// Posts messages to a Discord channel through the bot API.
pub struct DiscordChannel {
    client: Client,
    token: String,
    channel_id: String,
}

impl DiscordChannel {
    pub async fn from_secrets(manager: &dyn SecretManager) -> Result<Self, SecretError> {
        let credentials: DiscordCredentials = secrets::get_json(manager, "discord").await?;
        Ok(Self {
            client: Client::new(),
            token: credentials.token,
            channel_id: credentials.channel,
        })
    }
}

#[async_trait]
impl NotifyChannel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn deliver(&self, message: &str) -> Result<(), NotifyError> {
        let url = format!(
            "https://discord.com/api/channels/{}/messages",
            self.channel_id
        );
        let reply = self
            .client
            .post(&url)
            .header("User-Agent", "DiscordBot")
            .header("Authorization", format!("Bot {}", self.token))
            .json(&json!({ "content": message }))
            .send()
            .await?;

        if !reply.status().is_success() {
            return Err(NotifyError::Rejected(reply.status().as_u16()));
        }
        Ok(())
    }
}
