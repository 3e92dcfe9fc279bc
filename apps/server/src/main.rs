mod auth;
mod booking;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod notify;
mod rate_limit;
mod slots;
mod telegram;
mod telegram_layer;
#[cfg(test)]
mod test_support;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use booking::BookingLocks;
use config::Config;
use rate_limit::{rate_limit, RateLimiter, Tier};
use telegram::TelegramApi;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub telegram: TelegramApi,
    pub booking_locks: BookingLocks,
    pub started_at: Instant,
}

/// Rate limit and booking lock cleanup interval (seconds).
const CLEANUP_INTERVAL_SECS: u64 = 300;

/// Vite dev server, allowed alongside `WEBAPP_URL`.
const DEV_ORIGIN: &str = "http://localhost:5173";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Config first so the Telegram layer can use the bot token.
    let config = Config::from_env()?;
    let telegram = TelegramApi::new(&config.bot_token);

    // ── Tracing: console + optional Telegram error notifications ──
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer());
    if telegram.is_enabled() {
        registry
            .with(telegram_layer::TelegramLayer::new(
                telegram.clone(),
                config.admin_tg_id,
            ))
            .init();
    } else {
        registry.init();
        tracing::warn!("BOT_TOKEN is empty, Telegram messages are disabled");
    }

    if !config.is_production() {
        tracing::warn!(
            "APP_ENV={} : requests without auth run as test user {}",
            config.app_env,
            auth::TEST_USER_ID
        );
    }

    // ── Database ──
    let pool = db::connect(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    db::seed_catalog(&pool).await?;
    db::ensure_owner_admin(&pool, config.admin_tg_id).await?;

    let rate_limiter = RateLimiter::from_config(&config.rate_limits);
    let cors = cors_layer(&config)?;
    let addr = format!("{}:{}", config.host, config.port);

    let state = Arc::new(AppState {
        db: pool,
        config,
        telegram,
        booking_locks: BookingLocks::new(),
        started_at: Instant::now(),
    });

    // ── Background task: drop stale rate limit entries and idle booking locks ──
    let cleanup_limiter = rate_limiter.clone();
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup();
            cleanup_state.booking_locks.prune();
        }
    });

    let app = app(state, rate_limiter)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    tracing::info!("Salon server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Whitelist `WEBAPP_URL` when configured, otherwise allow any origin.
fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if !config.has_webapp_url() {
        return Ok(cors.allow_origin(Any));
    }
    let origins = vec![
        config
            .webapp_url
            .trim_end_matches('/')
            .parse()
            .map_err(|_| anyhow::anyhow!("WEBAPP_URL is not a valid origin"))?,
        axum::http::HeaderValue::from_static(DEV_ORIGIN),
    ];
    Ok(cors.allow_origin(AllowOrigin::list(origins)))
}

/// All API routes, grouped by rate limit tier.
fn app(state: Arc<AppState>, limiter: RateLimiter) -> Router {
    let tier = |tier: Tier| from_fn_with_state((limiter.clone(), tier), rate_limit);

    // 1. No limit: health check + Telegram webhook
    let no_limit_routes = Router::new()
        .route("/api/health", get(handlers::health::health))
        .route(
            "/api/telegram-webhook",
            post(handlers::telegram::telegram_webhook),
        );

    // 2. Public catalog and slot lookups
    let public_routes = Router::new()
        .route("/api/masters", get(handlers::masters::list_masters))
        .route("/api/masters/{id}", get(handlers::masters::get_master))
        .route(
            "/api/masters/{id}/reviews",
            get(handlers::reviews::list_master_reviews),
        )
        .route(
            "/api/masters/{id}/available-slots",
            get(handlers::schedule::master_available_slots),
        )
        .route("/api/services", get(handlers::services::list_services))
        .route("/api/services/{id}", get(handlers::services::get_service))
        .route(
            "/api/schedule/available-slots",
            get(handlers::schedule::available_slots),
        )
        .layer(tier(Tier::Public));

    // 3. Appointment creation: strictest limit
    let booking_routes = Router::new()
        .route(
            "/api/appointments",
            post(handlers::appointments::create_appointment),
        )
        .layer(tier(Tier::Booking));

    // 4. Authenticated client endpoints
    let auth_routes = Router::new()
        .route(
            "/api/user",
            get(handlers::users::get_user).put(handlers::users::update_user),
        )
        .route(
            "/api/appointments",
            get(handlers::appointments::list_appointments),
        )
        .route(
            "/api/appointments/{id}",
            get(handlers::appointments::get_appointment)
                .delete(handlers::appointments::cancel_appointment),
        )
        .route(
            "/api/appointments/{id}/cancel",
            post(handlers::appointments::cancel_appointment),
        )
        .route("/api/reviews", post(handlers::reviews::create_review))
        .route(
            "/api/notifications",
            get(handlers::notifications::list_notifications),
        )
        .route(
            "/api/notifications/{id}/read",
            post(handlers::notifications::mark_read),
        )
        .layer(tier(Tier::Auth));

    // 5. Admin endpoints
    let admin_routes = Router::new()
        .route("/api/admin/dashboard", get(handlers::admin::dashboard))
        .route(
            "/api/admin/masters",
            get(handlers::admin::list_masters).post(handlers::admin::create_master),
        )
        .route(
            "/api/admin/masters/{id}",
            put(handlers::admin::update_master).delete(handlers::admin::delete_master),
        )
        .route(
            "/api/admin/masters/{id}/services",
            put(handlers::admin::set_master_services),
        )
        .route(
            "/api/admin/masters/{id}/schedule",
            put(handlers::admin::set_master_schedule),
        )
        .route(
            "/api/admin/services",
            get(handlers::admin::list_services).post(handlers::admin::create_service),
        )
        .route(
            "/api/admin/services/{id}",
            put(handlers::admin::update_service).delete(handlers::admin::delete_service),
        )
        .route(
            "/api/admin/appointments",
            get(handlers::admin::list_appointments),
        )
        .route(
            "/api/admin/appointments/{id}/status",
            put(handlers::admin::update_appointment_status),
        )
        .layer(tier(Tier::Admin));

    Router::new()
        .merge(no_limit_routes)
        .merge(public_routes)
        .merge(booking_routes)
        .merge(auth_routes)
        .merge(admin_routes)
        .with_state(state)
}
