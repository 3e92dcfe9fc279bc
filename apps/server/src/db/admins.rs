use sqlx::SqlitePool;

use crate::models::{Admin, AdminRole};

pub async fn find_by_telegram_id(pool: &SqlitePool, telegram_id: i64) -> sqlx::Result<Option<Admin>> {
    sqlx::query_as::<_, Admin>(
        "SELECT id, telegram_id, role, created_at FROM admins WHERE telegram_id = ?",
    )
    .bind(telegram_id)
    .fetch_optional(pool)
    .await
}

pub async fn insert(pool: &SqlitePool, telegram_id: i64, role: AdminRole) -> sqlx::Result<i64> {
    let id = sqlx::query("INSERT INTO admins (telegram_id, role) VALUES (?, ?)")
        .bind(telegram_id)
        .bind(role)
        .execute(pool)
        .await?
        .last_insert_rowid();
    Ok(id)
}
