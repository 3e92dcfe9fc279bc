use sqlx::SqlitePool;

use crate::models::{CreateMasterRequest, Master, PageRequest, UpdateMasterRequest};

const MASTER_COLUMNS: &str =
    "m.id, m.name, m.specialization, m.description, m.experience, m.rating, m.photo_url, m.is_active, m.created_at";

/// Active masters, optionally only those offering `service_id`.
pub async fn list_active(
    pool: &SqlitePool,
    service_id: Option<i64>,
    page: PageRequest,
) -> sqlx::Result<(Vec<Master>, i64)> {
    let filter = "m.is_active = 1
         AND (?1 IS NULL OR EXISTS (
             SELECT 1 FROM master_services ms WHERE ms.master_id = m.id AND ms.service_id = ?1))";

    let masters = sqlx::query_as::<_, Master>(&format!(
        "SELECT {} FROM masters m WHERE {} ORDER BY m.rating DESC, m.id ASC LIMIT ?2 OFFSET ?3",
        MASTER_COLUMNS, filter
    ))
    .bind(service_id)
    .bind(i64::from(page.limit))
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM masters m WHERE {}", filter))
        .bind(service_id)
        .fetch_one(pool)
        .await?;

    Ok((masters, total))
}

/// Every master, including inactive ones (admin view).
pub async fn list_all(pool: &SqlitePool) -> sqlx::Result<Vec<Master>> {
    sqlx::query_as::<_, Master>(&format!(
        "SELECT {} FROM masters m ORDER BY m.id ASC",
        MASTER_COLUMNS
    ))
    .fetch_all(pool)
    .await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<Master>> {
    sqlx::query_as::<_, Master>(&format!(
        "SELECT {} FROM masters m WHERE m.id = ?",
        MASTER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Active masters offering a service.
pub async fn list_for_service(pool: &SqlitePool, service_id: i64) -> sqlx::Result<Vec<Master>> {
    sqlx::query_as::<_, Master>(&format!(
        "SELECT {} FROM masters m
         JOIN master_services ms ON ms.master_id = m.id
         WHERE ms.service_id = ? AND m.is_active = 1
         ORDER BY m.rating DESC, m.id ASC",
        MASTER_COLUMNS
    ))
    .bind(service_id)
    .fetch_all(pool)
    .await
}

/// Insert a master together with the services it offers.
pub async fn insert(pool: &SqlitePool, req: &CreateMasterRequest) -> sqlx::Result<i64> {
    let mut tx = pool.begin().await?;
    let id = sqlx::query(
        "INSERT INTO masters (name, specialization, description, experience, photo_url, is_active)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(req.name.trim())
    .bind(req.specialization.as_deref().unwrap_or(""))
    .bind(req.description.as_deref().unwrap_or(""))
    .bind(req.experience.unwrap_or(0))
    .bind(&req.photo_url)
    .bind(req.is_active.unwrap_or(true))
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for service_id in &req.service_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO master_services (master_id, service_id) VALUES (?, ?)",
        )
        .bind(id)
        .bind(service_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(id)
}

/// Apply the fields present in `req`; returns false if the master does not exist.
pub async fn update(pool: &SqlitePool, id: i64, req: &UpdateMasterRequest) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "UPDATE masters SET
            name = COALESCE(?, name),
            specialization = COALESCE(?, specialization),
            description = COALESCE(?, description),
            experience = COALESCE(?, experience),
            photo_url = COALESCE(?, photo_url),
            is_active = COALESCE(?, is_active)
         WHERE id = ?",
    )
    .bind(req.name.as_deref().map(str::trim))
    .bind(&req.specialization)
    .bind(&req.description)
    .bind(req.experience)
    .bind(&req.photo_url)
    .bind(req.is_active)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove a row. Rows still referenced by past appointments are
/// deactivated instead so history keeps its foreign keys.
pub async fn delete(pool: &SqlitePool, id: i64) -> sqlx::Result<bool> {
    let mut tx = pool.begin().await?;
    let referenced: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM appointments WHERE master_id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
    let sql = if referenced {
        "UPDATE masters SET is_active = 0 WHERE id = ?"
    } else {
        "DELETE FROM masters WHERE id = ?"
    };
    let result = sqlx::query(sql).bind(id).execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

/// Whether the master offers the service (MasterService row exists).
pub async fn offers_service(pool: &SqlitePool, master_id: i64, service_id: i64) -> sqlx::Result<bool> {
    sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM master_services WHERE master_id = ? AND service_id = ?",
    )
    .bind(master_id)
    .bind(service_id)
    .fetch_one(pool)
    .await
}

/// Replace the master's service set.
pub async fn set_services(pool: &SqlitePool, master_id: i64, service_ids: &[i64]) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM master_services WHERE master_id = ?")
        .bind(master_id)
        .execute(&mut *tx)
        .await?;
    for service_id in service_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO master_services (master_id, service_id) VALUES (?, ?)",
        )
        .bind(master_id)
        .bind(service_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

pub async fn count_active(pool: &SqlitePool) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM masters WHERE is_active = 1")
        .fetch_one(pool)
        .await
}

/// Recompute the cached rating as the mean of the master's reviews.
pub async fn refresh_rating(pool: &SqlitePool, master_id: i64) -> sqlx::Result<f64> {
    let rating: f64 = sqlx::query_scalar(
        "SELECT COALESCE(ROUND(AVG(rating), 2), 0.0) FROM reviews WHERE master_id = ?",
    )
    .bind(master_id)
    .fetch_one(pool)
    .await?;

    sqlx::query("UPDATE masters SET rating = ? WHERE id = ?")
        .bind(rating)
        .bind(master_id)
        .execute(pool)
        .await?;
    Ok(rating)
}
