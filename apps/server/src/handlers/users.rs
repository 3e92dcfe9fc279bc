use axum::{extract::State, Json};
use std::sync::Arc;

use crate::{
    auth::{self, CurrentUser},
    db,
    error::{AppError, AppResult, Entity, Invalid},
    models::{ApiResponse, UpdateUserRequest, UserProfile},
    AppState,
};

use super::{required_text, ApiJson};

/// GET /api/user
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<ApiResponse<UserProfile>>> {
    let is_admin = auth::is_admin(&state, user.telegram_id).await?;
    Ok(Json(ApiResponse::success(UserProfile { user, is_admin })))
}

/// PUT /api/user: first/last name and phone; absent fields are kept.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<UpdateUserRequest>,
) -> AppResult<Json<ApiResponse<UserProfile>>> {
    let first_name = body
        .first_name
        .as_deref()
        .map(|n| required_text(n, "firstName"))
        .transpose()?;
    let last_name = body.last_name.as_deref().map(str::trim);
    let phone = body.phone.as_deref().map(str::trim);
    if let Some(phone) = phone {
        if !is_valid_phone(phone) {
            return Err(Invalid::Format("phone").into());
        }
    }

    let updated = db::users::update_profile(&state.db, user.id, first_name, last_name, phone)
        .await?
        .ok_or(AppError::NotFound(Entity::User))?;
    let is_admin = auth::is_admin(&state, updated.telegram_id).await?;
    Ok(Json(ApiResponse::success(UserProfile {
        user: updated,
        is_admin,
    })))
}

/// Digits with optional leading `+` and common separators, 10-15 digits.
fn is_valid_phone(phone: &str) -> bool {
    let rest = phone.strip_prefix('+').unwrap_or(phone);
    if !rest
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')'))
    {
        return false;
    }
    let digits = rest.chars().filter(char::is_ascii_digit).count();
    (10..=15).contains(&digits)
}
