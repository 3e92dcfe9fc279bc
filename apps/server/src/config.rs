use anyhow::Context;
use chrono::{FixedOffset, NaiveDateTime, Offset, Utc};
use std::time::Duration;

use crate::rate_limit::{RateLimitConfig, Tier};

/// Placeholder Mini App URL used when `WEBAPP_URL` is not set.
pub const DEFAULT_WEBAPP_URL: &str = "https://example.com";

/// Server configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bot_token: String,
    pub admin_tg_id: i64,
    pub host: String,
    pub port: u16,
    pub webapp_url: String,
    /// `production` disables the unauthenticated test user.
    pub app_env: String,
    /// Salon wall-clock offset from UTC, in hours.
    pub utc_offset_hours: i32,
    /// Optional `secret_token` registered with `setWebhook`.
    pub webhook_secret: Option<String>,
    pub rate_limits: Vec<(Tier, RateLimitConfig)>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:salon.db?mode=rwc".into());
        let bot_token = std::env::var("BOT_TOKEN").context("BOT_TOKEN must be set")?;
        let admin_tg_id = std::env::var("ADMIN_TG_ID")
            .context("ADMIN_TG_ID must be set")?
            .parse()
            .context("ADMIN_TG_ID must be a number")?;
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port = match std::env::var("PORT") {
            Ok(p) => p.parse().context("PORT must be a number")?,
            Err(_) => 3000,
        };
        let webapp_url = std::env::var("WEBAPP_URL").unwrap_or_else(|_| DEFAULT_WEBAPP_URL.into());
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".into());
        let utc_offset_hours = match std::env::var("SALON_UTC_OFFSET_HOURS") {
            Ok(v) => v.parse().context("SALON_UTC_OFFSET_HOURS must be a number")?,
            Err(_) => 3,
        };
        if !(-12..=14).contains(&utc_offset_hours) {
            anyhow::bail!("SALON_UTC_OFFSET_HOURS out of range: {}", utc_offset_hours);
        }
        let webhook_secret = std::env::var("TELEGRAM_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.is_empty());

        Ok(Self {
            database_url,
            bot_token,
            admin_tg_id,
            host,
            port,
            webapp_url,
            app_env,
            utc_offset_hours,
            webhook_secret,
            rate_limits: default_rate_limits(),
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn has_webapp_url(&self) -> bool {
        self.webapp_url != DEFAULT_WEBAPP_URL
    }

    /// Salon time zone as a fixed offset.
    pub fn salon_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }

    /// Current salon wall-clock time.
    pub fn now_local(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.salon_offset()).naive_local()
    }
}

fn default_rate_limits() -> Vec<(Tier, RateLimitConfig)> {
    vec![
        (
            Tier::Public,
            RateLimitConfig {
                max_requests: 60,
                window: Duration::from_secs(60),
            },
        ),
        (
            Tier::Auth,
            RateLimitConfig {
                max_requests: 30,
                window: Duration::from_secs(60),
            },
        ),
        (
            Tier::Booking,
            RateLimitConfig {
                max_requests: 5,
                window: Duration::from_secs(300),
            },
        ),
        (
            Tier::Admin,
            RateLimitConfig {
                max_requests: 120,
                window: Duration::from_secs(60),
            },
        ),
    ]
}
