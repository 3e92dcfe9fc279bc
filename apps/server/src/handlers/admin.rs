use axum::{extract::State, http::StatusCode, Json};
use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    auth::AdminUser,
    db::{self, appointments::AdminFilter},
    error::{AppError, AppResult, Entity, Invalid},
    models::*,
    notify,
    slots::{parse_hhmm, MAX_DURATION_MIN},
    AppState,
};

use super::{
    appointments::parse_status, masters::with_details, parse_date, required_text, ApiJson,
    ApiPath, ApiQuery,
};

const RECENT_APPOINTMENTS: i64 = 10;

// ── Dashboard ──

/// GET /api/admin/dashboard
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<DashboardStats>>> {
    let counters = db::appointments::counters(&state.db, state.config.now_local()).await?;
    let stats = DashboardStats {
        today_appointments: counters.today,
        pending_appointments: counters.pending,
        upcoming_confirmed: counters.upcoming_confirmed,
        total_users: db::users::count(&state.db).await?,
        active_masters: db::masters::count_active(&state.db).await?,
        active_services: db::services::count_active(&state.db).await?,
        month_revenue: counters.month_revenue,
        recent_appointments: db::appointments::recent(&state.db, RECENT_APPOINTMENTS).await?,
    };
    Ok(Json(ApiResponse::success(stats)))
}

// ── Masters ──

/// GET /api/admin/masters: every master, inactive included.
pub async fn list_masters(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<Vec<MasterWithDetails>>>> {
    let mut out = Vec::new();
    for master in db::masters::list_all(&state.db).await? {
        out.push(with_details(&state, master).await?);
    }
    Ok(Json(ApiResponse::success(out)))
}

/// POST /api/admin/masters
pub async fn create_master(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiJson(body): ApiJson<CreateMasterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<MasterWithDetails>>)> {
    required_text(&body.name, "name")?;
    if body.experience.is_some_and(|e| e < 0) {
        return Err(Invalid::Format("experience").into());
    }
    ensure_services_exist(&state, &body.service_ids).await?;

    let id = db::masters::insert(&state.db, &body).await?;
    tracing::info!(master_id = id, name = %body.name.trim(), "master created");

    let master = find_master(&state, id).await?;
    let details = with_details(&state, master).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(details))))
}

/// PUT /api/admin/masters/{id}
pub async fn update_master(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateMasterRequest>,
) -> AppResult<Json<ApiResponse<MasterWithDetails>>> {
    if let Some(name) = &body.name {
        required_text(name, "name")?;
    }
    if body.experience.is_some_and(|e| e < 0) {
        return Err(Invalid::Format("experience").into());
    }
    if !db::masters::update(&state.db, id, &body).await? {
        return Err(AppError::NotFound(Entity::Master));
    }

    let master = find_master(&state, id).await?;
    Ok(Json(ApiResponse::success(
        with_details(&state, master).await?,
    )))
}

/// DELETE /api/admin/masters/{id}
pub async fn delete_master(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    find_master(&state, id).await?;
    let active = db::appointments::count_active_for_master(&state.db, id).await?;
    if active > 0 {
        return Err(AppError::HasActiveAppointments(Entity::Master));
    }
    if !db::masters::delete(&state.db, id).await? {
        return Err(AppError::NotFound(Entity::Master));
    }
    tracing::info!(master_id = id, "master deleted");
    Ok(Json(ApiResponse::success(serde_json::json!({ "id": id }))))
}

/// PUT /api/admin/masters/{id}/services: replace the offered services.
pub async fn set_master_services(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<SetMasterServicesRequest>,
) -> AppResult<Json<ApiResponse<Vec<Service>>>> {
    find_master(&state, id).await?;
    ensure_services_exist(&state, &body.service_ids).await?;
    db::masters::set_services(&state.db, id, &body.service_ids).await?;
    let services = db::services::list_for_master(&state.db, id).await?;
    Ok(Json(ApiResponse::success(services)))
}

/// PUT /api/admin/masters/{id}/schedule: replace the weekly schedule.
pub async fn set_master_schedule(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<SetScheduleRequest>,
) -> AppResult<Json<ApiResponse<Vec<MasterSchedule>>>> {
    find_master(&state, id).await?;
    validate_schedule(&body.days)?;
    db::schedules::replace(&state.db, id, &body.days).await?;
    tracing::info!(master_id = id, days = body.days.len(), "schedule replaced");
    let schedule = db::schedules::list_for_master(&state.db, id).await?;
    Ok(Json(ApiResponse::success(schedule)))
}

fn validate_schedule(days: &[ScheduleDay]) -> AppResult<()> {
    let mut seen = HashSet::new();
    for day in days {
        if !(0..=6).contains(&day.day_of_week) || !seen.insert(day.day_of_week) {
            return Err(Invalid::Format("dayOfWeek").into());
        }
        let start = parse_hhmm(&day.start_time).ok_or(Invalid::Format("startTime"))?;
        let end = parse_hhmm(&day.end_time).ok_or(Invalid::Format("endTime"))?;
        if day.is_working && start >= end {
            return Err(Invalid::Format("endTime").into());
        }
    }
    Ok(())
}

async fn find_master(state: &AppState, id: i64) -> AppResult<Master> {
    db::masters::find_by_id(&state.db, id)
        .await?
        .ok_or(AppError::NotFound(Entity::Master))
}

async fn ensure_services_exist(state: &AppState, ids: &[i64]) -> AppResult<()> {
    for id in ids {
        if db::services::find_by_id(&state.db, *id).await?.is_none() {
            return Err(AppError::NotFound(Entity::Service));
        }
    }
    Ok(())
}

// ── Services ──

/// GET /api/admin/services: every service, inactive included.
pub async fn list_services(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<Vec<Service>>>> {
    let services = db::services::list_all(&state.db).await?;
    Ok(Json(ApiResponse::success(services)))
}

/// POST /api/admin/services
pub async fn create_service(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiJson(body): ApiJson<CreateServiceRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Service>>)> {
    required_text(&body.name, "name")?;
    validate_price_duration(Some(body.price), Some(body.duration))?;

    let id = db::services::insert(&state.db, &body).await?;
    tracing::info!(service_id = id, name = %body.name.trim(), "service created");

    let service = find_service(&state, id).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(service))))
}

/// PUT /api/admin/services/{id}
pub async fn update_service(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateServiceRequest>,
) -> AppResult<Json<ApiResponse<Service>>> {
    if let Some(name) = &body.name {
        required_text(name, "name")?;
    }
    validate_price_duration(body.price, body.duration)?;
    if !db::services::update(&state.db, id, &body).await? {
        return Err(AppError::NotFound(Entity::Service));
    }
    Ok(Json(ApiResponse::success(find_service(&state, id).await?)))
}

/// DELETE /api/admin/services/{id}
pub async fn delete_service(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    find_service(&state, id).await?;
    let active = db::appointments::count_active_for_service(&state.db, id).await?;
    if active > 0 {
        return Err(AppError::HasActiveAppointments(Entity::Service));
    }
    if !db::services::delete(&state.db, id).await? {
        return Err(AppError::NotFound(Entity::Service));
    }
    tracing::info!(service_id = id, "service deleted");
    Ok(Json(ApiResponse::success(serde_json::json!({ "id": id }))))
}

fn validate_price_duration(price: Option<i64>, duration: Option<i64>) -> AppResult<()> {
    if price.is_some_and(|p| p < 0) {
        return Err(Invalid::Format("price").into());
    }
    if duration.is_some_and(|d| d <= 0 || d > MAX_DURATION_MIN) {
        return Err(Invalid::Format("duration").into());
    }
    Ok(())
}

async fn find_service(state: &AppState, id: i64) -> AppResult<Service> {
    db::services::find_by_id(&state.db, id)
        .await?
        .ok_or(AppError::NotFound(Entity::Service))
}

// ── Appointments ──

/// GET /api/admin/appointments?status=&date=&masterId=
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<AdminAppointmentsQuery>,
) -> AppResult<Json<ApiResponse<Vec<AppointmentDetail>>>> {
    let date = match query.date.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(parse_date(Some(raw), "date")?),
    };
    let filter = AdminFilter {
        status: parse_status(query.status.as_deref())?,
        date,
        master_id: query.master_id,
    };
    let page = PageRequest::new(query.page, query.limit);
    let (items, total) = db::appointments::list_admin(&state.db, filter, page).await?;
    Ok(Json(ApiResponse::paginated(items, page.with_total(total))))
}

/// PUT /api/admin/appointments/{id}/status
pub async fn update_appointment_status(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateStatusRequest>,
) -> AppResult<Json<ApiResponse<AppointmentDetail>>> {
    let next = AppointmentStatus::parse(body.status.trim()).ok_or(Invalid::Format("status"))?;
    let current = db::appointments::find(&state.db, id)
        .await?
        .ok_or(AppError::NotFound(Entity::Appointment))?;
    if !current.status.can_transition_to(next) {
        return Err(Invalid::StatusTransition {
            from: current.status.as_str().into(),
            to: next.as_str().into(),
        }
        .into());
    }

    if !db::appointments::update_status(&state.db, id, current.status, next).await? {
        let actual = db::appointments::find(&state.db, id)
            .await?
            .ok_or(AppError::NotFound(Entity::Appointment))?;
        return Err(Invalid::StatusTransition {
            from: actual.status.as_str().into(),
            to: next.as_str().into(),
        }
        .into());
    }
    tracing::info!(
        appointment_id = id,
        from = current.status.as_str(),
        to = next.as_str(),
        admin = admin.telegram_id,
        "appointment status changed"
    );

    let detail = db::appointments::find_detail(&state.db, id)
        .await?
        .ok_or(AppError::NotFound(Entity::Appointment))?;
    if let Err(e) = notify::status_changed(&state, &detail).await {
        tracing::error!(appointment_id = id, "status notification failed: {}", e);
    }
    Ok(Json(ApiResponse::success(detail)))
}
