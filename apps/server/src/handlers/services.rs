use axum::{extract::State, Json};
use std::sync::Arc;

use crate::{
    db,
    error::{AppError, AppResult, Entity},
    models::{ApiResponse, PageRequest, Service, ServiceWithMasters, ServicesQuery},
    AppState,
};

use super::{ApiPath, ApiQuery};

/// GET /api/services: active services, optionally one `category`.
pub async fn list_services(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ServicesQuery>,
) -> AppResult<Json<ApiResponse<Vec<Service>>>> {
    let page = PageRequest::new(query.page, query.limit);
    let category = query
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    let (services, total) = db::services::list_active(&state.db, category, page).await?;
    Ok(Json(ApiResponse::paginated(services, page.with_total(total))))
}

/// GET /api/services/{id}: service with the active masters offering it.
pub async fn get_service(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<ApiResponse<ServiceWithMasters>>> {
    let service = db::services::find_by_id(&state.db, id)
        .await?
        .filter(|s| s.is_active)
        .ok_or(AppError::NotFound(Entity::Service))?;
    let masters = db::masters::list_for_service(&state.db, service.id).await?;
    Ok(Json(ApiResponse::success(ServiceWithMasters {
        service,
        masters,
    })))
}
