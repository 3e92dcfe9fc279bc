use sqlx::SqlitePool;

use crate::models::Review;

pub async fn list_for_master(pool: &SqlitePool, master_id: i64) -> sqlx::Result<Vec<Review>> {
    sqlx::query_as::<_, Review>(
        "SELECT r.id, r.user_id, r.master_id, r.appointment_id, r.rating, r.comment,
                u.first_name AS author_name, r.created_at
         FROM reviews r
         JOIN users u ON u.id = r.user_id
         WHERE r.master_id = ?
         ORDER BY r.created_at DESC, r.id DESC",
    )
    .bind(master_id)
    .fetch_all(pool)
    .await
}

pub async fn insert(
    pool: &SqlitePool,
    user_id: i64,
    master_id: i64,
    appointment_id: Option<i64>,
    rating: i64,
    comment: Option<&str>,
) -> sqlx::Result<i64> {
    let id = sqlx::query(
        "INSERT INTO reviews (user_id, master_id, appointment_id, rating, comment)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(master_id)
    .bind(appointment_id)
    .bind(rating)
    .bind(comment)
    .execute(pool)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn find(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<Review>> {
    sqlx::query_as::<_, Review>(
        "SELECT r.id, r.user_id, r.master_id, r.appointment_id, r.rating, r.comment,
                u.first_name AS author_name, r.created_at
         FROM reviews r
         JOIN users u ON u.id = r.user_id
         WHERE r.id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}
