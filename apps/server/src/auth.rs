use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{
    db,
    error::{AppError, AppResult},
    models::{TelegramUser, User},
    AppState,
};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of initData before it's considered expired (24 hours).
const MAX_AUTH_AGE_SECS: i64 = 86400;

/// Telegram id of the user assumed outside production when no auth is sent.
pub const TEST_USER_ID: i64 = 123456789;

/// Validates Telegram Mini App initData and extracts user info.
/// See: https://core.telegram.org/bots/webapps#validating-data-received-via-the-mini-app
pub fn validate_init_data(init_data: &str, bot_token: &str, now: i64) -> Option<TelegramUser> {
    let params: BTreeMap<String, String> = url::form_urlencoded::parse(init_data.as_bytes())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let hash = hex::decode(params.get("hash")?).ok()?;

    let auth_date: i64 = params.get("auth_date")?.parse().ok()?;
    if now - auth_date > MAX_AUTH_AGE_SECS {
        tracing::warn!(auth_date, age = now - auth_date, "initData expired");
        return None;
    }

    // Sorted key=value lines, excluding hash
    let data_check_string = params
        .iter()
        .filter(|(k, _)| k.as_str() != "hash")
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("\n");

    let mut mac = HmacSha256::new_from_slice(&secret_key(bot_token)).ok()?;
    mac.update(data_check_string.as_bytes());
    if mac.verify_slice(&hash).is_err() {
        tracing::warn!("initData hash mismatch");
        return None;
    }

    serde_json::from_str::<TelegramUser>(params.get("user")?).ok()
}

/// secret_key = HMAC-SHA256(key = "WebAppData", msg = bot_token)
fn secret_key(bot_token: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(b"WebAppData").expect("HMAC can take key of any size");
    mac.update(bot_token.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Hex signature Telegram would attach to `data_check_string`.
#[cfg(test)]
pub fn sign_data_check_string(data_check_string: &str, bot_token: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(&secret_key(bot_token)).expect("HMAC can take key of any size");
    mac.update(data_check_string.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Resolve the Telegram user for a request.
///
/// Header format: `tma <initData>`. Outside production a missing header
/// yields the fixed test user.
fn telegram_user(parts: &Parts, state: &AppState) -> AppResult<TelegramUser> {
    let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
        if state.config.is_production() {
            return Err(AppError::Unauthorized);
        }
        tracing::debug!("no Authorization header, using test user");
        return Ok(TelegramUser {
            id: TEST_USER_ID,
            first_name: "Test".into(),
            last_name: Some("User".into()),
            username: Some("test_user".into()),
        });
    };

    let init_data = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("tma "))
        .ok_or(AppError::Unauthorized)?;

    validate_init_data(
        init_data,
        &state.config.bot_token,
        chrono::Utc::now().timestamp(),
    )
    .ok_or(AppError::Unauthorized)
}

/// Whether the Telegram user is the configured owner or listed in `admins`.
pub async fn is_admin(state: &AppState, telegram_id: i64) -> AppResult<bool> {
    if telegram_id == state.config.admin_tg_id {
        return Ok(true);
    }
    Ok(db::admins::find_by_telegram_id(&state.db, telegram_id)
        .await?
        .is_some())
}

/// Authenticated client, upserted into `users`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let tg = telegram_user(parts, state)?;
        let user = db::users::upsert_from_telegram(&state.db, &tg).await?;
        Ok(CurrentUser(user))
    }
}

/// Authenticated admin.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !is_admin(state, user.telegram_id).await? {
            tracing::warn!(telegram_id = user.telegram_id, "admin access denied");
            return Err(AppError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}
