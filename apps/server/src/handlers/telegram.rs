//! POST /api/telegram-webhook: bot commands for the Mini App.
//!
//! Always answers 200 so Telegram never retries an update.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use std::sync::Arc;

use crate::{
    telegram::{escape_html, InlineButton, InlineKeyboard, Update},
    AppState,
};

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";
const OPEN_APP_LABEL: &str = "\u{1f485} Открыть запись";
const HELP_LABEL: &str = "Справка";

/// Bot command recognised in a text message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    App,
    Help,
    Other,
}

impl Command {
    /// First word of the text, without `@botname` suffix or arguments.
    fn parse(text: &str) -> Self {
        let word = text.split_whitespace().next().unwrap_or("");
        let word = word.split('@').next().unwrap_or("");
        match word.to_ascii_lowercase().as_str() {
            "/start" => Command::Start,
            "/app" => Command::App,
            "/help" => Command::Help,
            _ => Command::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
}

/// Reply for a text message. `webapp_url` is `None` when no Mini App is configured.
pub fn reply_for(text: &str, first_name: Option<&str>, webapp_url: Option<&str>) -> Reply {
    let open_app =
        webapp_url.map(|url| InlineKeyboard::single(InlineButton::web_app(OPEN_APP_LABEL, url)));

    match Command::parse(text) {
        Command::Start => {
            let greeting = match first_name {
                Some(name) => format!("Здравствуйте, {}!", escape_html(name)),
                None => "Здравствуйте!".to_string(),
            };
            Reply {
                text: format!(
                    "{} \u{1f338}\n\n\
                     Добро пожаловать в наш салон красоты. \
                     Выберите мастера, услугу и удобное время прямо в приложении.",
                    greeting
                ),
                keyboard: open_app,
            }
        }
        Command::App => Reply {
            text: "Откройте приложение, чтобы записаться:".into(),
            keyboard: open_app,
        },
        Command::Help => Reply {
            text: "Команды:\n\
                   /start : приветствие\n\
                   /app : открыть приложение для записи\n\
                   /help : эта справка"
                .into(),
            keyboard: None,
        },
        Command::Other => Reply {
            text: "Чтобы записаться, отправьте /app. Список команд: /help".into(),
            keyboard: Some(InlineKeyboard::single(InlineButton::callback(
                HELP_LABEL, "/help",
            ))),
        },
    }
}

pub async fn telegram_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(secret) = &state.config.webhook_secret {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(secret.as_str()) {
            tracing::warn!("webhook update with wrong secret token ignored");
            return StatusCode::OK;
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            tracing::warn!("malformed Telegram update: {}", e);
            return StatusCode::OK;
        }
    };

    if let Err(e) = handle_update(&state, update).await {
        tracing::warn!("Telegram update handling failed: {:#}", e);
    }
    StatusCode::OK
}

async fn handle_update(state: &AppState, update: Update) -> anyhow::Result<()> {
    let webapp_url = state
        .config
        .has_webapp_url()
        .then_some(state.config.webapp_url.as_str());

    if let Some(callback) = update.callback_query {
        tracing::debug!(update_id = update.update_id, from = callback.from.id, "callback query");
        state.telegram.answer_callback_query(&callback.id, None).await?;
        if let (Some(data), Some(message)) = (callback.data.as_deref(), callback.message) {
            let reply = reply_for(data, Some(&callback.from.first_name), webapp_url);
            state
                .telegram
                .send_message(message.chat.id, &reply.text, reply.keyboard.as_ref())
                .await?;
        }
        return Ok(());
    }

    let Some(message) = update.message else {
        return Ok(());
    };
    let Some(text) = message.text.as_deref() else {
        return Ok(());
    };

    let first_name = message.from.as_ref().map(|u| u.first_name.as_str());
    let reply = reply_for(text, first_name, webapp_url);
    tracing::debug!(
        update_id = update.update_id,
        chat_id = message.chat.id,
        message_id = message.message_id,
        command = ?Command::parse(text),
        "bot message"
    );
    state
        .telegram
        .send_message(message.chat.id, &reply.text, reply.keyboard.as_ref())
        .await
}
