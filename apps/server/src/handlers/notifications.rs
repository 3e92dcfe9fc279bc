use axum::{extract::State, Json};
use std::sync::Arc;

use crate::{
    auth::CurrentUser,
    db,
    error::{AppError, AppResult, Entity},
    models::{ApiResponse, Notification, PageQuery, PageRequest},
    AppState,
};

use super::{ApiPath, ApiQuery};

/// GET /api/notifications
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> AppResult<Json<ApiResponse<Vec<Notification>>>> {
    let page = PageRequest::new(query.page, query.limit);
    let (items, total) = db::notifications::list_for_user(&state.db, user.id, page).await?;
    Ok(Json(ApiResponse::paginated(items, page.with_total(total))))
}

/// POST /api/notifications/{id}/read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    if !db::notifications::mark_read(&state.db, user.id, id).await? {
        return Err(AppError::NotFound(Entity::Notification));
    }
    Ok(Json(ApiResponse::success(
        serde_json::json!({ "id": id, "isRead": true }),
    )))
}
