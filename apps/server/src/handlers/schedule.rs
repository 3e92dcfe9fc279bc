use axum::{extract::State, Json};
use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;

use crate::{
    db,
    error::{AppError, AppResult, Entity, Invalid},
    models::{ApiResponse, AvailableSlotsQuery},
    slots::{self, Interval, Slot, WorkingHours, MAX_DURATION_MIN},
    AppState,
};

use super::{parse_date, parse_id, ApiPath, ApiQuery};

/// GET /api/schedule/available-slots?masterId=&serviceId=&date=YYYY-MM-DD
pub async fn available_slots(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<AvailableSlotsQuery>,
) -> AppResult<Json<ApiResponse<Vec<Slot>>>> {
    let master_id = parse_id(query.master_id.as_deref(), "masterId")?;
    let service_id = parse_id(query.service_id.as_deref(), "serviceId")?;
    let date = parse_date(query.date.as_deref(), "date")?;
    let slots = free_slots(&state, master_id, service_id, date).await?;
    Ok(Json(ApiResponse::success(slots)))
}

/// GET /api/masters/{id}/available-slots?serviceId=&date=
pub async fn master_available_slots(
    State(state): State<Arc<AppState>>,
    ApiPath(master_id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<AvailableSlotsQuery>,
) -> AppResult<Json<ApiResponse<Vec<Slot>>>> {
    let service_id = parse_id(query.service_id.as_deref(), "serviceId")?;
    let date = parse_date(query.date.as_deref(), "date")?;
    let slots = free_slots(&state, master_id, service_id, date).await?;
    Ok(Json(ApiResponse::success(slots)))
}

async fn free_slots(
    state: &AppState,
    master_id: i64,
    service_id: i64,
    date: NaiveDate,
) -> AppResult<Vec<Slot>> {
    let master = db::masters::find_by_id(&state.db, master_id)
        .await?
        .ok_or(AppError::NotFound(Entity::Master))?;
    let service = db::services::find_by_id(&state.db, service_id)
        .await?
        .ok_or(AppError::NotFound(Entity::Service))?;
    if !master.is_active {
        return Err(Invalid::MasterInactive.into());
    }
    if !service.is_active {
        return Err(Invalid::ServiceInactive.into());
    }
    if !db::masters::offers_service(&state.db, master.id, service.id).await? {
        return Err(Invalid::ServiceNotOffered.into());
    }

    let now = state.config.now_local();
    if date < now.date() {
        return Ok(Vec::new());
    }

    let schedule =
        db::schedules::find_for_day(&state.db, master.id, slots::weekday_index(date)).await?;
    let Some(hours) = schedule.as_ref().and_then(WorkingHours::from_schedule) else {
        return Ok(Vec::new());
    };

    let day = Interval::starting_at(date.and_time(NaiveTime::MIN), MAX_DURATION_MIN);
    let booked = db::appointments::active_for_master_within(
        &state.db,
        master.id,
        slots::overlap_search_window(&day),
    )
    .await?;
    let not_before = (date == now.date()).then_some(now);
    let free = slots::generate_slots(
        date,
        hours,
        service.duration,
        &slots::occupied(&booked),
        not_before,
    );

    tracing::debug!(
        master_id = master.id,
        service_id = service.id,
        %date,
        count = free.len(),
        "available slots computed"
    );
    Ok(free)
}

#[cfg(test)]
mod tests {
    use crate::test_support::{self, get, send};
    use axum::http::StatusCode;
    use chrono::NaiveDate;

    // 2099-03-02 is a Monday, 2099-03-03 a Tuesday.
    const MONDAY: &str = "2099-03-02";
    const TUESDAY: &str = "2099-03-03";

    fn slots_uri(fx: &test_support::Fixture, date: &str) -> String {
        format!(
            "/api/schedule/available-slots?masterId={}&serviceId={}&date={}",
            fx.master_id, fx.service_id, date
        )
    }

    fn starts(body: &serde_json::Value) -> Vec<String> {
        body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["startTime"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_day_without_schedule_is_empty() {
        let pool = test_support::migrated_pool().await;
        let fx = test_support::Fixture::new(&pool).await;
        let app = test_support::router(test_support::state(pool, test_support::config()));

        let (status, body) = send(&app, get(&slots_uri(&fx, TUESDAY))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_confirmed_appointment_blocks_overlapping_slots() {
        let pool = test_support::migrated_pool().await;
        let fx = test_support::Fixture::new(&pool).await;
        let at = NaiveDate::from_ymd_opt(2099, 3, 2)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let id = fx.book(&pool, at).await;
        crate::db::appointments::update_status(
            &pool,
            id,
            crate::models::AppointmentStatus::Pending,
            crate::models::AppointmentStatus::Confirmed,
        )
        .await
        .unwrap();
        let app = test_support::router(test_support::state(pool, test_support::config()));

        let (status, body) = send(&app, get(&slots_uri(&fx, MONDAY))).await;
        assert_eq!(status, StatusCode::OK);
        let s = starts(&body);
        assert_eq!(s.first().map(String::as_str), Some("09:00"));
        assert_eq!(s.last().map(String::as_str), Some("17:00"));
        assert!(!s.contains(&"09:30".to_string()));
        assert!(!s.contains(&"10:00".to_string()));
        assert!(!s.contains(&"10:30".to_string()));
        assert!(s.contains(&"11:00".to_string()));
        assert_eq!(body["data"][0]["endTime"], "10:00");
        assert_eq!(body["data"][0]["duration"], 60);
    }

    #[tokio::test]
    async fn test_alias_route_matches() {
        let pool = test_support::migrated_pool().await;
        let fx = test_support::Fixture::new(&pool).await;
        let app = test_support::router(test_support::state(pool, test_support::config()));

        let uri = format!(
            "/api/masters/{}/available-slots?serviceId={}&date={}",
            fx.master_id, fx.service_id, MONDAY
        );
        let (status, body) = send(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 17);
    }

    #[tokio::test]
    async fn test_bad_params() {
        let pool = test_support::migrated_pool().await;
        let fx = test_support::Fixture::new(&pool).await;
        let app = test_support::router(test_support::state(pool, test_support::config()));

        let (status, body) = send(&app, get("/api/schedule/available-slots?serviceId=1&date=2099-03-02")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Не заполнено обязательное поле: masterId");

        let uri = format!(
            "/api/schedule/available-slots?masterId={}&serviceId={}&date=tomorrow",
            fx.master_id, fx.service_id
        );
        let (status, _) = send(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let uri = format!(
            "/api/schedule/available-slots?masterId=999&serviceId={}&date={}",
            fx.service_id, MONDAY
        );
        let (status, _) = send(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_past_day_is_empty() {
        let pool = test_support::migrated_pool().await;
        let fx = test_support::Fixture::new(&pool).await;
        let app = test_support::router(test_support::state(pool, test_support::config()));

        // 2000-01-03 was a Monday.
        let (status, body) = send(&app, get(&slots_uri(&fx, "2000-01-03"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_previous_evening_booking_blocks_after_midnight() {
        let pool = test_support::migrated_pool().await;
        let fx = test_support::Fixture::new(&pool).await;
        let days = [(1, "09:00", "23:59"), (2, "00:00", "03:00")].map(|(d, start, end)| {
            crate::models::ScheduleDay {
                day_of_week: d,
                start_time: start.into(),
                end_time: end.into(),
                is_working: true,
            }
        });
        crate::db::schedules::replace(&pool, fx.master_id, &days)
            .await
            .unwrap();
        let late = NaiveDate::from_ymd_opt(2099, 3, 2)
            .unwrap()
            .and_hms_opt(23, 30, 0)
            .unwrap();
        fx.book(&pool, late).await;
        let app = test_support::router(test_support::state(pool, test_support::config()));

        let (status, body) = send(&app, get(&slots_uri(&fx, TUESDAY))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(starts(&body), vec!["00:30", "01:00", "01:30", "02:00"]);
    }
}
