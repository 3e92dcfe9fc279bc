use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::{
    auth::CurrentUser,
    booking::{self, BookingRequest},
    db,
    error::{AppError, AppResult, Entity, Invalid},
    models::{
        ApiResponse, AppointmentDetail, AppointmentStatus, AppointmentsQuery,
        CreateAppointmentRequest, PageRequest,
    },
    notify, AppState,
};

use super::{ApiJson, ApiPath, ApiQuery};

/// GET /api/appointments: the current user's appointments.
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<AppointmentsQuery>,
) -> AppResult<Json<ApiResponse<Vec<AppointmentDetail>>>> {
    let status = parse_status(query.status.as_deref())?;
    let page = PageRequest::new(query.page, query.limit);
    let (items, total) = db::appointments::list_for_user(&state.db, user.id, status, page).await?;
    Ok(Json(ApiResponse::paginated(items, page.with_total(total))))
}

/// POST /api/appointments
pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<CreateAppointmentRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<AppointmentDetail>>)> {
    let master_id = body.master_id.ok_or(Invalid::Missing("masterId"))?;
    let service_id = body.service_id.ok_or(Invalid::Missing("serviceId"))?;
    let raw_date = body
        .appointment_date
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .ok_or(Invalid::Missing("appointmentDate"))?;
    let appointment_date = booking::parse_appointment_date(raw_date, state.config.salon_offset())
        .ok_or(Invalid::Format("appointmentDate"))?;

    let id = booking::create_appointment(
        &state.db,
        &state.booking_locks,
        BookingRequest {
            user_id: user.id,
            master_id,
            service_id,
            appointment_date,
            notes: body.notes,
        },
        state.config.now_local(),
    )
    .await?;

    let detail = db::appointments::find_detail(&state.db, id)
        .await?
        .ok_or(AppError::NotFound(Entity::Appointment))?;
    if let Err(e) = notify::appointment_created(&state, &detail).await {
        tracing::error!(appointment_id = id, "booking notification failed: {}", e);
    }

    Ok((StatusCode::CREATED, Json(ApiResponse::success(detail))))
}

/// GET /api/appointments/{id}: only the owner may see it.
pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<ApiResponse<AppointmentDetail>>> {
    let detail = own_appointment(&state, user.id, id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

/// DELETE /api/appointments/{id} and POST /api/appointments/{id}/cancel
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<ApiResponse<AppointmentDetail>>> {
    let current = own_appointment(&state, user.id, id).await?;
    if !current.status.is_active() {
        return Err(Invalid::NotCancellable.into());
    }

    let cancelled = db::appointments::update_status(
        &state.db,
        id,
        current.status,
        AppointmentStatus::Cancelled,
    )
    .await?;
    if !cancelled {
        // Changed by an admin since it was read.
        return Err(Invalid::NotCancellable.into());
    }
    tracing::info!(appointment_id = id, user_id = user.id, "appointment cancelled by client");

    let detail = own_appointment(&state, user.id, id).await?;
    if let Err(e) = notify::appointment_cancelled(&state, &detail).await {
        tracing::error!(appointment_id = id, "cancellation notification failed: {}", e);
    }
    Ok(Json(ApiResponse::success(detail)))
}

async fn own_appointment(state: &AppState, user_id: i64, id: i64) -> AppResult<AppointmentDetail> {
    db::appointments::find_detail(&state.db, id)
        .await?
        .filter(|a| a.user_id == user_id)
        .ok_or(AppError::NotFound(Entity::Appointment))
}

/// Optional `status` filter; unknown values are a 400.
pub(crate) fn parse_status(raw: Option<&str>) -> AppResult<Option<AppointmentStatus>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => AppointmentStatus::parse(s)
            .map(Some)
            .ok_or(AppError::Validation(Invalid::Format("status"))),
    }
}
