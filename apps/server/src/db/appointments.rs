use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use sqlx::{SqliteExecutor, SqlitePool};

use crate::models::{Appointment, AppointmentDetail, AppointmentStatus, PageRequest};
use crate::slots::Interval;

const APPOINTMENT_COLUMNS: &str = "id, user_id, master_id, service_id, appointment_date, duration,
     status, total_price, notes, created_at, updated_at";

const DETAIL_SELECT: &str = "SELECT a.id, a.user_id, a.master_id, m.name AS master_name,
            a.service_id, s.name AS service_name, a.appointment_date, a.duration,
            a.status, a.total_price, a.notes,
            u.telegram_id AS client_telegram_id, u.first_name AS client_first_name,
            u.username AS client_username, u.phone AS client_phone, a.created_at
     FROM appointments a
     JOIN masters m ON m.id = a.master_id
     JOIN services s ON s.id = a.service_id
     JOIN users u ON u.id = a.user_id";

/// Fields of a new appointment.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub user_id: i64,
    pub master_id: i64,
    pub service_id: i64,
    pub appointment_date: NaiveDateTime,
    pub duration: i64,
    pub total_price: i64,
    pub notes: Option<String>,
}

fn day_bounds(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_time(NaiveTime::MIN);
    (start, start + TimeDelta::days(1))
}

/// PENDING/CONFIRMED appointments of a master starting inside `window`.
///
/// Callers widen the window with `slots::overlap_search_window` so bookings
/// that began earlier (the previous evening included) are seen.
pub async fn active_for_master_within<'e>(
    executor: impl SqliteExecutor<'e>,
    master_id: i64,
    window: Interval,
) -> sqlx::Result<Vec<Appointment>> {
    sqlx::query_as::<_, Appointment>(&format!(
        "SELECT {} FROM appointments
         WHERE master_id = ? AND status IN ('PENDING', 'CONFIRMED')
           AND appointment_date >= ? AND appointment_date < ?
         ORDER BY appointment_date ASC",
        APPOINTMENT_COLUMNS
    ))
    .bind(master_id)
    .bind(window.start)
    .bind(window.end)
    .fetch_all(executor)
    .await
}

pub async fn insert<'e>(executor: impl SqliteExecutor<'e>, new: &NewAppointment) -> sqlx::Result<i64> {
    let id = sqlx::query(
        "INSERT INTO appointments
            (user_id, master_id, service_id, appointment_date, duration, status, total_price, notes)
         VALUES (?, ?, ?, ?, ?, 'PENDING', ?, ?)",
    )
    .bind(new.user_id)
    .bind(new.master_id)
    .bind(new.service_id)
    .bind(new.appointment_date)
    .bind(new.duration)
    .bind(new.total_price)
    .bind(&new.notes)
    .execute(executor)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn find(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<Appointment>> {
    sqlx::query_as::<_, Appointment>(&format!(
        "SELECT {} FROM appointments WHERE id = ?",
        APPOINTMENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn find_detail(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<AppointmentDetail>> {
    sqlx::query_as::<_, AppointmentDetail>(&format!("{} WHERE a.id = ?", DETAIL_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// A user's appointments, newest first.
pub async fn list_for_user(
    pool: &SqlitePool,
    user_id: i64,
    status: Option<AppointmentStatus>,
    page: PageRequest,
) -> sqlx::Result<(Vec<AppointmentDetail>, i64)> {
    let filter = "a.user_id = ?1 AND (?2 IS NULL OR a.status = ?2)";

    let items = sqlx::query_as::<_, AppointmentDetail>(&format!(
        "{} WHERE {} ORDER BY a.appointment_date DESC LIMIT ?3 OFFSET ?4",
        DETAIL_SELECT, filter
    ))
    .bind(user_id)
    .bind(status)
    .bind(i64::from(page.limit))
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let total: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM appointments a WHERE {}", filter))
            .bind(user_id)
            .bind(status)
            .fetch_one(pool)
            .await?;

    Ok((items, total))
}

/// Filters for the admin appointment list.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdminFilter {
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
    pub master_id: Option<i64>,
}

pub async fn list_admin(
    pool: &SqlitePool,
    filter: AdminFilter,
    page: PageRequest,
) -> sqlx::Result<(Vec<AppointmentDetail>, i64)> {
    let bounds = filter.date.map(day_bounds);
    let from = bounds.map(|(f, _)| f);
    let to = bounds.map(|(_, t)| t);
    let clause = "(?1 IS NULL OR a.status = ?1)
         AND (?2 IS NULL OR (a.appointment_date >= ?2 AND a.appointment_date < ?3))
         AND (?4 IS NULL OR a.master_id = ?4)";

    let items = sqlx::query_as::<_, AppointmentDetail>(&format!(
        "{} WHERE {} ORDER BY a.appointment_date ASC LIMIT ?5 OFFSET ?6",
        DETAIL_SELECT, clause
    ))
    .bind(filter.status)
    .bind(from)
    .bind(to)
    .bind(filter.master_id)
    .bind(i64::from(page.limit))
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let total: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM appointments a WHERE {}", clause))
            .bind(filter.status)
            .bind(from)
            .bind(to)
            .bind(filter.master_id)
            .fetch_one(pool)
            .await?;

    Ok((items, total))
}

/// Most recently created appointments (dashboard feed).
pub async fn recent(pool: &SqlitePool, limit: i64) -> sqlx::Result<Vec<AppointmentDetail>> {
    sqlx::query_as::<_, AppointmentDetail>(&format!(
        "{} ORDER BY a.created_at DESC, a.id DESC LIMIT ?",
        DETAIL_SELECT
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Move an appointment from `from` to `to`.
///
/// Returns `false` when the row is gone or its status is no longer `from`.
pub async fn update_status(
    pool: &SqlitePool,
    id: i64,
    from: AppointmentStatus,
    to: AppointmentStatus,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "UPDATE appointments SET status = ?, updated_at = datetime('now')
         WHERE id = ? AND status = ?",
    )
    .bind(to)
    .bind(id)
    .bind(from)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count_active_for_master(pool: &SqlitePool, master_id: i64) -> sqlx::Result<i64> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM appointments
         WHERE master_id = ? AND status IN ('PENDING', 'CONFIRMED')",
    )
    .bind(master_id)
    .fetch_one(pool)
    .await
}

pub async fn count_active_for_service(pool: &SqlitePool, service_id: i64) -> sqlx::Result<i64> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM appointments
         WHERE service_id = ? AND status IN ('PENDING', 'CONFIRMED')",
    )
    .bind(service_id)
    .fetch_one(pool)
    .await
}

/// Latest COMPLETED appointment of the user with the master, if any.
pub async fn last_completed_with_master(
    pool: &SqlitePool,
    user_id: i64,
    master_id: i64,
) -> sqlx::Result<Option<i64>> {
    sqlx::query_scalar(
        "SELECT id FROM appointments
         WHERE user_id = ? AND master_id = ? AND status = 'COMPLETED'
         ORDER BY appointment_date DESC LIMIT 1",
    )
    .bind(user_id)
    .bind(master_id)
    .fetch_optional(pool)
    .await
}

/// Latest COMPLETED appointment with the master that has no review yet.
pub async fn unreviewed_completed_with_master(
    pool: &SqlitePool,
    user_id: i64,
    master_id: i64,
) -> sqlx::Result<Option<i64>> {
    sqlx::query_scalar(
        "SELECT a.id FROM appointments a
         WHERE a.user_id = ? AND a.master_id = ? AND a.status = 'COMPLETED'
           AND NOT EXISTS (SELECT 1 FROM reviews r WHERE r.appointment_id = a.id)
         ORDER BY a.appointment_date DESC LIMIT 1",
    )
    .bind(user_id)
    .bind(master_id)
    .fetch_optional(pool)
    .await
}

/// Appointment counters for the admin dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub today: i64,
    pub pending: i64,
    pub upcoming_confirmed: i64,
    pub month_revenue: i64,
}

pub async fn counters(pool: &SqlitePool, now: NaiveDateTime) -> sqlx::Result<Counters> {
    let (today_from, today_to) = day_bounds(now.date());
    let month_start = now
        .date()
        .with_day(1)
        .unwrap_or(now.date())
        .and_time(NaiveTime::MIN);
    let next_month = month_start
        .date()
        .checked_add_months(chrono::Months::new(1))
        .unwrap_or(now.date())
        .and_time(NaiveTime::MIN);

    let today: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM appointments
         WHERE appointment_date >= ? AND appointment_date < ? AND status != 'CANCELLED'",
    )
    .bind(today_from)
    .bind(today_to)
    .fetch_one(pool)
    .await?;

    let pending: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM appointments WHERE status = 'PENDING'")
            .fetch_one(pool)
            .await?;

    let upcoming_confirmed: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM appointments WHERE status = 'CONFIRMED' AND appointment_date >= ?",
    )
    .bind(now)
    .fetch_one(pool)
    .await?;

    let month_revenue: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(total_price), 0) FROM appointments
         WHERE status = 'COMPLETED' AND appointment_date >= ? AND appointment_date < ?",
    )
    .bind(month_start)
    .bind(next_month)
    .fetch_one(pool)
    .await?;

    Ok(Counters {
        today,
        pending,
        upcoming_confirmed,
        month_revenue,
    })
}
