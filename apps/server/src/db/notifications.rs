use sqlx::SqlitePool;

use crate::models::{Notification, PageRequest};

/// Notification kinds stored in `notifications.kind`.
pub const KIND_CREATED: &str = "APPOINTMENT_CREATED";
pub const KIND_STATUS: &str = "APPOINTMENT_STATUS";
pub const KIND_CANCELLED: &str = "APPOINTMENT_CANCELLED";

pub async fn insert(
    pool: &SqlitePool,
    user_id: i64,
    appointment_id: Option<i64>,
    kind: &str,
    message: &str,
) -> sqlx::Result<i64> {
    let id = sqlx::query(
        "INSERT INTO notifications (user_id, appointment_id, kind, message) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(appointment_id)
    .bind(kind)
    .bind(message)
    .execute(pool)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn list_for_user(
    pool: &SqlitePool,
    user_id: i64,
    page: PageRequest,
) -> sqlx::Result<(Vec<Notification>, i64)> {
    let items = sqlx::query_as::<_, Notification>(
        "SELECT id, user_id, appointment_id, kind, message, is_read, created_at
         FROM notifications WHERE user_id = ?
         ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
    )
    .bind(user_id)
    .bind(i64::from(page.limit))
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    Ok((items, total))
}

/// Mark one of the user's notifications read; false if it is not theirs.
pub async fn mark_read(pool: &SqlitePool, user_id: i64, id: i64) -> sqlx::Result<bool> {
    let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
