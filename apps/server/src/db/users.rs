use sqlx::SqlitePool;

use crate::models::{TelegramUser, User};

const USER_COLUMNS: &str =
    "id, telegram_id, first_name, last_name, username, phone, created_at";

/// Insert the Telegram user or refresh their Telegram-provided fields.
pub async fn upsert_from_telegram(pool: &SqlitePool, tg: &TelegramUser) -> sqlx::Result<User> {
    sqlx::query(
        "INSERT INTO users (telegram_id, first_name, last_name, username)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(telegram_id) DO UPDATE SET username = excluded.username",
    )
    .bind(tg.id)
    .bind(&tg.first_name)
    .bind(&tg.last_name)
    .bind(&tg.username)
    .execute(pool)
    .await?;

    find_by_telegram_id(pool, tg.id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

pub async fn find_by_telegram_id(pool: &SqlitePool, telegram_id: i64) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE telegram_id = ?",
        USER_COLUMNS
    ))
    .bind(telegram_id)
    .fetch_optional(pool)
    .await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn update_profile(
    pool: &SqlitePool,
    id: i64,
    first_name: Option<&str>,
    last_name: Option<&str>,
    phone: Option<&str>,
) -> sqlx::Result<Option<User>> {
    sqlx::query(
        "UPDATE users SET
            first_name = COALESCE(?, first_name),
            last_name = COALESCE(?, last_name),
            phone = COALESCE(?, phone)
         WHERE id = ?",
    )
    .bind(first_name)
    .bind(last_name)
    .bind(phone)
    .bind(id)
    .execute(pool)
    .await?;

    find_by_id(pool, id).await
}

pub async fn count(pool: &SqlitePool) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await
}
