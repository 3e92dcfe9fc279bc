//! Shared fixtures for unit and router tests.

use axum::{body::Body, http::Request, Router};
use chrono::NaiveDateTime;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;

use crate::{
    auth,
    booking::BookingLocks,
    config::Config,
    db::{self, appointments::NewAppointment},
    models::{CreateMasterRequest, CreateServiceRequest, ScheduleDay, TelegramUser},
    rate_limit::{RateLimitConfig, RateLimiter, Tier},
    telegram::TelegramApi,
    AppState,
};

pub const BOT_TOKEN: &str = "123456:TEST-TOKEN";
pub const SERVICE_PRICE: i64 = 150_000;

/// Empty single-connection in-memory database.
///
/// Every SQLite memory connection is its own database, so the pool must
/// never open a second one.
pub async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

pub async fn migrated_pool() -> SqlitePool {
    let pool = memory_pool().await;
    db::run_migrations(&pool).await.unwrap();
    pool
}

pub fn telegram_user(id: i64, first_name: &str) -> TelegramUser {
    TelegramUser {
        id,
        first_name: first_name.into(),
        last_name: None,
        username: Some(format!("user{}", id)),
    }
}

pub async fn add_service(pool: &SqlitePool, name: &str, duration: i64) -> i64 {
    db::services::insert(
        pool,
        &CreateServiceRequest {
            name: name.into(),
            description: None,
            price: SERVICE_PRICE,
            duration,
            category: Some("nails".into()),
            is_active: None,
        },
    )
    .await
    .unwrap()
}

pub async fn add_master(pool: &SqlitePool, name: &str, service_ids: &[i64]) -> i64 {
    db::masters::insert(
        pool,
        &CreateMasterRequest {
            name: name.into(),
            specialization: Some("Мастер маникюра".into()),
            description: None,
            experience: Some(3),
            photo_url: None,
            is_active: None,
            service_ids: service_ids.to_vec(),
        },
    )
    .await
    .unwrap()
}

/// One master offering one 60-minute service, working Mondays 09:00-18:00,
/// plus one client.
pub struct Fixture {
    pub user_id: i64,
    pub master_id: i64,
    pub service_id: i64,
    pub service_price: i64,
}

impl Fixture {
    pub async fn new(pool: &SqlitePool) -> Self {
        let service_id = add_service(pool, "Маникюр", 60).await;
        let master_id = add_master(pool, "Анна", &[service_id]).await;
        db::schedules::replace(
            pool,
            master_id,
            &[ScheduleDay {
                day_of_week: 1,
                start_time: "09:00".into(),
                end_time: "18:00".into(),
                is_working: true,
            }],
        )
        .await
        .unwrap();
        let user = db::users::upsert_from_telegram(pool, &telegram_user(1001, "Olga"))
            .await
            .unwrap();

        Self {
            user_id: user.id,
            master_id,
            service_id,
            service_price: SERVICE_PRICE,
        }
    }

    /// Insert a PENDING appointment for the fixture client.
    pub async fn book(&self, pool: &SqlitePool, at: NaiveDateTime) -> i64 {
        db::appointments::insert(
            pool,
            &NewAppointment {
                user_id: self.user_id,
                master_id: self.master_id,
                service_id: self.service_id,
                appointment_date: at,
                duration: 60,
                total_price: self.service_price,
                notes: None,
            },
        )
        .await
        .unwrap()
    }
}

/// URL-encoded initData signed the way Telegram signs it.
pub fn init_data(bot_token: &str, user_id: i64, first_name: &str, auth_date: i64) -> String {
    let user = serde_json::json!({ "id": user_id, "first_name": first_name }).to_string();
    let auth_date = auth_date.to_string();
    let check = format!("auth_date={}\nuser={}", auth_date, user);
    let hash = auth::sign_data_check_string(&check, bot_token);

    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("user", &user)
        .append_pair("auth_date", &auth_date)
        .append_pair("hash", &hash)
        .finish()
}

/// `Authorization` header value for a freshly signed user.
pub fn tma_header(user_id: i64, first_name: &str) -> String {
    format!(
        "tma {}",
        init_data(BOT_TOKEN, user_id, first_name, chrono::Utc::now().timestamp())
    )
}

/// Development config where the unauthenticated test user is the owner.
pub fn config() -> Config {
    let generous = RateLimitConfig {
        max_requests: 10_000,
        window: Duration::from_secs(60),
    };
    Config {
        database_url: "sqlite::memory:".into(),
        bot_token: BOT_TOKEN.into(),
        admin_tg_id: auth::TEST_USER_ID,
        host: "127.0.0.1".into(),
        port: 0,
        webapp_url: "https://salon.test".into(),
        app_env: "development".into(),
        utc_offset_hours: 3,
        webhook_secret: None,
        rate_limits: [Tier::Public, Tier::Auth, Tier::Booking, Tier::Admin]
            .into_iter()
            .map(|tier| (tier, generous.clone()))
            .collect(),
    }
}

pub fn state(pool: SqlitePool, config: Config) -> Arc<AppState> {
    Arc::new(AppState {
        db: pool,
        config,
        telegram: TelegramApi::disabled(),
        booking_locks: BookingLocks::new(),
        started_at: Instant::now(),
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    let limiter = RateLimiter::from_config(&state.config.rate_limits);
    crate::app(state, limiter)
}

/// Send one request and decode the JSON envelope.
pub async fn send(app: &Router, req: Request<Body>) -> (axum::http::StatusCode, serde_json::Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn json(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
