use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::NotifyChannel;
use crate::secrets::{self, SecretManager};
use crate::utils::error::{NotifyError, SecretError};

const PUSHOVER_URL: &str = "https://api.pushover.net/1/messages.json";

#[derive(Debug, Clone, Deserialize)]
struct PushoverCredentials {
    user: String,
    token: String,
}

/// Posts messages through the Pushover message API.
pub struct PushoverChannel {
    client: Client,
    user: String,
    token: String,
}

impl PushoverChannel {
    pub async fn from_secrets(manager: &dyn SecretManager) -> Result<Self, SecretError> {
        let credentials: PushoverCredentials = secrets::get_json(manager, "pushover").await?;
        Ok(Self {
            client: Client::new(),
            user: credentials.user,
            token: credentials.token,
        })
    }
}

#[async_trait]
impl NotifyChannel for PushoverChannel {
    fn name(&self) -> &str {
        "pushover"
    }

    async fn deliver(&self, message: &str) -> Result<(), NotifyError> {
        let form = [
            ("token", self.token.as_str()),
            ("user", self.user.as_str()),
            ("message", message),
            ("priority", "1"),
        ];
        let reply = self.client.post(PUSHOVER_URL).form(&form).send().await?;

        if !reply.status().is_success() {
            return Err(NotifyError::Rejected(reply.status().as_u16()));
        }
        Ok(())
    }
}
