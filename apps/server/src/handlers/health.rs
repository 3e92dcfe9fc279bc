use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub db_ok: bool,
    pub telegram_enabled: bool,
}

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let db_ok = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();

    Json(HealthResponse {
        status: if db_ok { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        db_ok,
        telegram_enabled: state.telegram.is_enabled(),
    })
}

#[cfg(test)]
mod tests {
    use crate::test_support::{self, get, send};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_health_reports_db() {
        let pool = test_support::migrated_pool().await;
        let app = test_support::router(test_support::state(pool, test_support::config()));

        let (status, body) = send(&app, get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["dbOk"], true);
        assert_eq!(body["telegramEnabled"], false);
    }
}
