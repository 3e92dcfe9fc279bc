//! Minimal Telegram Bot API client and the Update types the webhook reads.

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::TelegramUser;

const API_BASE: &str = "https://api.telegram.org";

/// Bot API client. A disabled client drops every call.
#[derive(Debug, Clone)]
pub struct TelegramApi {
    http: reqwest::Client,
    base_url: Option<String>,
}

impl TelegramApi {
    pub fn new(bot_token: &str) -> Self {
        if bot_token.is_empty() {
            return Self::disabled();
        }
        Self {
            http: reqwest::Client::new(),
            base_url: Some(format!("{}/bot{}", API_BASE, bot_token)),
        }
    }

    pub fn disabled() -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.base_url.is_some()
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> anyhow::Result<()> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = serde_json::to_value(keyboard)?;
        }
        self.call("sendMessage", body).await
    }

    pub async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> anyhow::Result<()> {
        let mut body = serde_json::json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = text.into();
        }
        self.call("answerCallbackQuery", body).await
    }

    /// Send in the background; failures are logged, never returned.
    pub fn spawn_message(&self, chat_id: i64, text: String) {
        if !self.is_enabled() {
            return;
        }
        let api = self.clone();
        tokio::spawn(async move {
            if let Err(e) = api.send_message(chat_id, &text, None).await {
                tracing::warn!(chat_id, "Telegram sendMessage failed: {:#}", e);
            }
        });
    }

    /// Plain-text send without HTML parsing (used by the log layer).
    pub(crate) async fn send_raw(&self, body: serde_json::Value) -> anyhow::Result<()> {
        self.call("sendMessage", body).await
    }

    async fn call(&self, method: &str, body: serde_json::Value) -> anyhow::Result<()> {
        let Some(base) = &self.base_url else {
            tracing::debug!(method, "Telegram API disabled, dropping call");
            return Ok(());
        };

        let resp: ApiReply = self
            .http
            .post(format!("{}/{}", base, method))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("{} request failed", method))?
            .json()
            .await
            .with_context(|| format!("{} returned invalid JSON", method))?;

        if !resp.ok {
            anyhow::bail!(
                "{} rejected: {}",
                method,
                resp.description.unwrap_or_else(|| "no description".into())
            );
        }
        Ok(())
    }
}

/// Escape text for `parse_mode: HTML`.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    description: Option<String>,
}

// ── Reply markup ──

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn single(button: InlineButton) -> Self {
        Self {
            inline_keyboard: vec![vec![button]],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_app: Option<WebAppInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
}

impl InlineButton {
    pub fn web_app(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            web_app: Some(WebAppInfo { url: url.into() }),
            callback_data: None,
        }
    }

    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            web_app: None,
            callback_data: Some(data.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebAppInfo {
    pub url: String,
}

// ── Incoming updates ──

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<TelegramUser>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TelegramUser,
    pub data: Option<String>,
    pub message: Option<Message>,
}
