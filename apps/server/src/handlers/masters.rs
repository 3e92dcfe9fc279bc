use axum::{extract::State, Json};
use std::sync::Arc;

use crate::{
    db,
    error::{AppError, AppResult, Entity},
    models::{ApiResponse, Master, MasterWithDetails, MastersQuery, PageRequest},
    AppState,
};

use super::{ApiPath, ApiQuery};

/// GET /api/masters: active masters, optionally filtered by `serviceId`.
pub async fn list_masters(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<MastersQuery>,
) -> AppResult<Json<ApiResponse<Vec<Master>>>> {
    let page = PageRequest::new(query.page, query.limit);
    let (masters, total) = db::masters::list_active(&state.db, query.service_id, page).await?;
    Ok(Json(ApiResponse::paginated(masters, page.with_total(total))))
}

/// GET /api/masters/{id}: master with services and weekly schedule.
pub async fn get_master(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<ApiResponse<MasterWithDetails>>> {
    let master = db::masters::find_by_id(&state.db, id)
        .await?
        .filter(|m| m.is_active)
        .ok_or(AppError::NotFound(Entity::Master))?;
    Ok(Json(ApiResponse::success(with_details(&state, master).await?)))
}

pub(crate) async fn with_details(state: &AppState, master: Master) -> AppResult<MasterWithDetails> {
    let services = db::services::list_for_master(&state.db, master.id).await?;
    let schedule = db::schedules::list_for_master(&state.db, master.id).await?;
    Ok(MasterWithDetails {
        master,
        services,
        schedule,
    })
}
