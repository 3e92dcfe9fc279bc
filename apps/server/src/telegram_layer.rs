//! Tracing layer that forwards ERROR events to the salon owner's Telegram chat.
//!
//! - At most one message per `MIN_INTERVAL` (10 s)
//! - Identical messages are suppressed for `DEDUP_WINDOW` (60 s)
//! - Sends are spawned onto the Tokio runtime

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::telegram::{escape_html, TelegramApi};

const MIN_INTERVAL: Duration = Duration::from_secs(10);
const DEDUP_WINDOW: Duration = Duration::from_secs(60);

// ── Throttle ──

/// Rate limit + dedup state for outgoing alerts.
#[derive(Debug)]
struct Throttle {
    last_sent: Instant,
    /// (hash, sent_at) of recently sent messages.
    recent: Vec<(u64, Instant)>,
}

impl Throttle {
    fn new(now: Instant) -> Self {
        Self {
            // allow the first message immediately
            last_sent: now - MIN_INTERVAL,
            recent: Vec::new(),
        }
    }

    /// Whether a message with `hash` may be sent at `now`; records it if so.
    fn admit(&mut self, hash: u64, now: Instant) -> bool {
        self.recent
            .retain(|(_, ts)| now.duration_since(*ts) < DEDUP_WINDOW);

        let is_dup = self.recent.iter().any(|(h, _)| *h == hash);
        let too_soon = now.duration_since(self.last_sent) < MIN_INTERVAL;
        if is_dup || too_soon {
            return false;
        }
        self.last_sent = now;
        self.recent.push((hash, now));
        true
    }
}

fn hash_message(message: &str) -> u64 {
    let mut h = DefaultHasher::new();
    message.hash(&mut h);
    h.finish()
}

// ── Layer ──

pub struct TelegramLayer {
    api: TelegramApi,
    chat_id: i64,
    throttle: Mutex<Throttle>,
}

impl TelegramLayer {
    pub fn new(api: TelegramApi, chat_id: i64) -> Self {
        Self {
            api,
            chat_id,
            throttle: Mutex::new(Throttle::new(Instant::now())),
        }
    }
}

impl<S: Subscriber> Layer<S> for TelegramLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::ERROR {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let message = visitor.message();

        let admitted = match self.throttle.lock() {
            Ok(mut throttle) => throttle.admit(hash_message(&message), Instant::now()),
            Err(_) => false,
        };
        if !admitted {
            return;
        }

        let meta = event.metadata();
        let text = format_alert(
            &message,
            meta.target(),
            meta.file().unwrap_or("?"),
            meta.line(),
        );

        // Events can fire outside the runtime (e.g. during startup).
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let api = self.api.clone();
        let chat_id = self.chat_id;
        handle.spawn(async move {
            // Never log from here: an error would feed back into this layer.
            let _ = api
                .send_raw(serde_json::json!({
                    "chat_id": chat_id,
                    "text": text,
                    "parse_mode": "HTML"
                }))
                .await;
        });
    }
}

fn format_alert(message: &str, target: &str, file: &str, line: Option<u32>) -> String {
    let line = line.map(|l| l.to_string()).unwrap_or_else(|| "?".into());
    let now_utc = chrono::Utc::now().format("%H:%M:%S UTC");
    format!(
        "\u{1f6a8} <b>Salon server error</b>\n\
         ━━━━━━━━━━━━━━━\n\
         <code>{}</code>\n\
         ━━━━━━━━━━━━━━━\n\
         \u{1f4cd} {} ({}:{})\n\
         \u{1f550} {}",
        escape_html(message),
        target,
        file,
        line,
        now_utc
    )
}

// ── Field visitor ──

/// Collects the `message` field plus any structured fields of an event.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl MessageVisitor {
    fn message(&self) -> String {
        if self.fields.is_empty() {
            return self.message.clone();
        }
        let extras: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        if self.message.is_empty() {
            extras.join(", ")
        } else {
            format!("{} ({})", self.message, extras.join(", "))
        }
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let val = format!("{:?}", value);
        if field.name() == "message" {
            self.message = val;
        } else {
            self.fields.push((field.name().to_string(), val));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }
}

// ── Tests ──
