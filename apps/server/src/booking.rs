//! Appointment creation as one atomic step.
//!
//! Requests for the same master are serialised by an in-process mutex, and
//! the conflict check plus insert run in a single transaction.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use dashmap::DashMap;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::db::{self, appointments::NewAppointment};
use crate::error::{AppError, AppResult, Entity, Invalid};
use crate::slots::{self, Interval, WorkingHours};

/// Per-master booking locks. Appointments may cross midnight, so the key has
/// no date.
#[derive(Debug, Default)]
pub struct BookingLocks {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl BookingLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, master_id: i64) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the map shard is not held across the await.
        let mutex = self
            .locks
            .entry(master_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drop locks nobody is holding or waiting on.
    pub fn prune(&self) {
        self.locks.retain(|_, m| Arc::strong_count(m) > 1);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.len()
    }
}

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub user_id: i64,
    pub master_id: i64,
    pub service_id: i64,
    pub appointment_date: NaiveDateTime,
    pub notes: Option<String>,
}

/// Validate and insert a PENDING appointment, returning its id.
pub async fn create_appointment(
    pool: &SqlitePool,
    locks: &BookingLocks,
    req: BookingRequest,
    now: NaiveDateTime,
) -> AppResult<i64> {
    if req.appointment_date <= now {
        return Err(Invalid::DateInPast.into());
    }

    let master = db::masters::find_by_id(pool, req.master_id)
        .await?
        .ok_or(AppError::NotFound(Entity::Master))?;
    if !master.is_active {
        return Err(Invalid::MasterInactive.into());
    }

    let service = db::services::find_by_id(pool, req.service_id)
        .await?
        .ok_or(AppError::NotFound(Entity::Service))?;
    if !service.is_active {
        return Err(Invalid::ServiceInactive.into());
    }

    if !db::masters::offers_service(pool, master.id, service.id).await? {
        return Err(Invalid::ServiceNotOffered.into());
    }

    let requested = Interval::starting_at(req.appointment_date, service.duration);
    let day = req.appointment_date.date();
    let schedule =
        db::schedules::find_for_day(pool, master.id, slots::weekday_index(day)).await?;
    let within_hours = schedule
        .as_ref()
        .and_then(WorkingHours::from_schedule)
        .is_some_and(|hours| hours.contains(day, &requested));
    if !within_hours {
        return Err(Invalid::OutsideWorkingHours.into());
    }

    let _guard = locks.lock(master.id).await;
    let mut tx = pool.begin().await?;

    let existing = db::appointments::active_for_master_within(
        &mut *tx,
        master.id,
        slots::overlap_search_window(&requested),
    )
    .await?;
    if slots::overlaps_any(&requested, &slots::occupied(&existing)) {
        tracing::info!(
            master_id = master.id,
            at = %req.appointment_date,
            "booking rejected: slot taken"
        );
        return Err(AppError::SlotTaken);
    }

    let id = db::appointments::insert(
        &mut *tx,
        &NewAppointment {
            user_id: req.user_id,
            master_id: master.id,
            service_id: service.id,
            appointment_date: req.appointment_date,
            duration: service.duration,
            total_price: service.price,
            notes: req.notes.filter(|n| !n.trim().is_empty()),
        },
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        appointment_id = id,
        master_id = master.id,
        service_id = service.id,
        at = %req.appointment_date,
        "appointment created"
    );
    Ok(id)
}

/// Parse a client-supplied appointment time into salon wall-clock time.
///
/// RFC 3339 values with an offset are converted; naive values are taken as
/// salon-local.
pub fn parse_appointment_date(value: &str, salon: FixedOffset) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&salon).naive_local());
    }
    [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn request(fx: &test_support::Fixture, when: &str) -> BookingRequest {
        BookingRequest {
            user_id: fx.user_id,
            master_id: fx.master_id,
            service_id: fx.service_id,
            appointment_date: at(when),
            notes: None,
        }
    }

    fn now() -> NaiveDateTime {
        at("2099-03-01 12:00")
    }

    #[tokio::test]
    async fn test_creates_pending_with_service_price() {
        let pool = test_support::migrated_pool().await;
        let fx = test_support::Fixture::new(&pool).await;
        let locks = BookingLocks::new();

        let id = create_appointment(&pool, &locks, request(&fx, "2099-03-02 10:00"), now())
            .await
            .unwrap();
        let a = db::appointments::find(&pool, id).await.unwrap().unwrap();
        assert_eq!(a.status, crate::models::AppointmentStatus::Pending);
        assert_eq!(a.total_price, fx.service_price);
        assert_eq!(a.duration, 60);
    }

    #[tokio::test]
    async fn test_rejects_past_date() {
        let pool = test_support::migrated_pool().await;
        let fx = test_support::Fixture::new(&pool).await;
        let err = create_appointment(
            &pool,
            &BookingLocks::new(),
            request(&fx, "2099-03-01 11:00"),
            now(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(Invalid::DateInPast)));
    }

    #[tokio::test]
    async fn test_rejects_service_not_offered() {
        let pool = test_support::migrated_pool().await;
        let fx = test_support::Fixture::new(&pool).await;
        let other = test_support::add_service(&pool, "Окрашивание", 120).await;
        let mut req = request(&fx, "2099-03-02 10:00");
        req.service_id = other;

        let err = create_appointment(&pool, &BookingLocks::new(), req, now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(Invalid::ServiceNotOffered)));
    }

    #[tokio::test]
    async fn test_rejects_unknown_master() {
        let pool = test_support::migrated_pool().await;
        let fx = test_support::Fixture::new(&pool).await;
        let mut req = request(&fx, "2099-03-02 10:00");
        req.master_id = 9999;

        let err = create_appointment(&pool, &BookingLocks::new(), req, now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(Entity::Master)));
    }

    #[tokio::test]
    async fn test_rejects_overlap_by_duration() {
        let pool = test_support::migrated_pool().await;
        let fx = test_support::Fixture::new(&pool).await;
        let locks = BookingLocks::new();
        create_appointment(&pool, &locks, request(&fx, "2099-03-02 10:00"), now())
            .await
            .unwrap();

        let err = create_appointment(&pool, &locks, request(&fx, "2099-03-02 10:30"), now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotTaken));

        // Back-to-back is fine.
        create_appointment(&pool, &locks, request(&fx, "2099-03-02 11:00"), now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_requests_book_once() {
        let pool = test_support::migrated_pool().await;
        let fx = test_support::Fixture::new(&pool).await;
        let locks = Arc::new(BookingLocks::new());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let pool = pool.clone();
            let locks = locks.clone();
            let req = request(&fx, "2099-03-02 15:00");
            handles.push(tokio::spawn(async move {
                create_appointment(&pool, &locks, req, now()).await
            }));
        }

        let mut ok = 0;
        let mut taken = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(AppError::SlotTaken) => taken += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(taken, 3);
    }

    #[tokio::test]
    async fn test_prune_drops_idle_locks() {
        let locks = BookingLocks::new();
        {
            let _held = locks.lock(1).await;
            locks.prune();
            assert_eq!(locks.len(), 1);
        }
        locks.prune();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_rejects_outside_working_hours() {
        let pool = test_support::migrated_pool().await;
        let fx = test_support::Fixture::new(&pool).await;
        let locks = BookingLocks::new();

        // Monday 09:00-18:00 only; Tuesday is a day off.
        for when in ["2099-03-02 03:00", "2099-03-02 17:30", "2099-03-03 10:00"] {
            let err = create_appointment(&pool, &locks, request(&fx, when), now())
                .await
                .unwrap_err();
            assert!(
                matches!(err, AppError::Validation(Invalid::OutsideWorkingHours)),
                "{when}: {err:?}"
            );
        }
        create_appointment(&pool, &locks, request(&fx, "2099-03-02 17:00"), now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rejects_overlap_with_previous_evening() {
        let pool = test_support::migrated_pool().await;
        let fx = test_support::Fixture::new(&pool).await;
        let days = [(1, "09:00", "23:59"), (2, "00:00", "12:00")].map(|(d, start, end)| {
            crate::models::ScheduleDay {
                day_of_week: d,
                start_time: start.into(),
                end_time: end.into(),
                is_working: true,
            }
        });
        db::schedules::replace(&pool, fx.master_id, &days)
            .await
            .unwrap();
        // 23:30-00:30, stored directly as a late booking would be.
        fx.book(&pool, at("2099-03-02 23:30")).await;
        let locks = BookingLocks::new();

        let err = create_appointment(&pool, &locks, request(&fx, "2099-03-03 00:00"), now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotTaken));

        create_appointment(&pool, &locks, request(&fx, "2099-03-03 00:30"), now())
            .await
            .unwrap();
    }

    #[test]
    fn test_parse_appointment_date_formats() {
        let msk = FixedOffset::east_opt(3 * 3600).unwrap();
        let expected = at("2099-03-02 10:00");
        assert_eq!(
            parse_appointment_date("2099-03-02T07:00:00.000Z", msk),
            Some(expected)
        );
        assert_eq!(
            parse_appointment_date("2099-03-02T10:00:00+03:00", msk),
            Some(expected)
        );
        assert_eq!(parse_appointment_date("2099-03-02T10:00", msk), Some(expected));
        assert_eq!(parse_appointment_date("2099-03-02 10:00", msk), Some(expected));
        assert_eq!(parse_appointment_date("tomorrow", msk), None);
    }
}
