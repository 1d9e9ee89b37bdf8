//! Minimal Telegram Bot API client

use crate::config::TelegramSettings;
use crate::error::NotifierError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Envelope every Bot API method responds with
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

pub struct TelegramClient {
    client: reqwest::Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramClient {
    pub fn new(settings: &TelegramSettings) -> Result<Self, NotifierError> {
        // long polls must outlive the server-side wait
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.command_poll_timeout_secs + 10))
            .build()?;

        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            chat_id: settings.chat_id.clone(),
        })
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, NotifierError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let envelope: ApiResponse<T> = response.json().await?;
        if !status.is_success() || !envelope.ok {
            return Err(NotifierError::Delivery {
                message: format!(
                    "{} failed with status {}: {}",
                    method,
                    status.as_u16(),
                    envelope.description.unwrap_or_default()
                ),
            });
        }

        envelope.result.ok_or_else(|| NotifierError::Delivery {
            message: format!("{} returned no result", method),
        })
    }

    pub async fn send_message(&self, text: &str) -> Result<(), NotifierError> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                json!({ "chat_id": self.chat_id, "text": text }),
            )
            .await?;
        Ok(())
    }

    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, NotifierError> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }
}
