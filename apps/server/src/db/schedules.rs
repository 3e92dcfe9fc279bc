use sqlx::SqlitePool;

use crate::models::{MasterSchedule, ScheduleDay};

pub async fn list_for_master(pool: &SqlitePool, master_id: i64) -> sqlx::Result<Vec<MasterSchedule>> {
    sqlx::query_as::<_, MasterSchedule>(
        "SELECT id, master_id, day_of_week, start_time, end_time, is_working
         FROM master_schedules WHERE master_id = ? ORDER BY day_of_week ASC",
    )
    .bind(master_id)
    .fetch_all(pool)
    .await
}

pub async fn find_for_day(
    pool: &SqlitePool,
    master_id: i64,
    day_of_week: i64,
) -> sqlx::Result<Option<MasterSchedule>> {
    sqlx::query_as::<_, MasterSchedule>(
        "SELECT id, master_id, day_of_week, start_time, end_time, is_working
         FROM master_schedules WHERE master_id = ? AND day_of_week = ?",
    )
    .bind(master_id)
    .bind(day_of_week)
    .fetch_optional(pool)
    .await
}

/// Replace the master's weekly schedule. Days must already be validated.
pub async fn replace(pool: &SqlitePool, master_id: i64, days: &[ScheduleDay]) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM master_schedules WHERE master_id = ?")
        .bind(master_id)
        .execute(&mut *tx)
        .await?;
    for day in days {
        sqlx::query(
            "INSERT INTO master_schedules (master_id, day_of_week, start_time, end_time, is_working)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(master_id)
        .bind(day.day_of_week)
        .bind(&day.start_time)
        .bind(&day.end_time)
        .bind(day.is_working)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}
