use sqlx::SqlitePool;

use crate::models::{CreateServiceRequest, PageRequest, Service, UpdateServiceRequest};

const SERVICE_COLUMNS: &str =
    "s.id, s.name, s.description, s.price, s.duration, s.category, s.is_active, s.created_at";

/// Active services, optionally restricted to one category.
pub async fn list_active(
    pool: &SqlitePool,
    category: Option<&str>,
    page: PageRequest,
) -> sqlx::Result<(Vec<Service>, i64)> {
    let filter = "s.is_active = 1 AND (?1 IS NULL OR s.category = ?1)";

    let services = sqlx::query_as::<_, Service>(&format!(
        "SELECT {} FROM services s WHERE {} ORDER BY s.category ASC, s.price ASC LIMIT ?2 OFFSET ?3",
        SERVICE_COLUMNS, filter
    ))
    .bind(category)
    .bind(i64::from(page.limit))
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let total: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM services s WHERE {}", filter))
            .bind(category)
            .fetch_one(pool)
            .await?;

    Ok((services, total))
}

pub async fn list_all(pool: &SqlitePool) -> sqlx::Result<Vec<Service>> {
    sqlx::query_as::<_, Service>(&format!(
        "SELECT {} FROM services s ORDER BY s.category ASC, s.id ASC",
        SERVICE_COLUMNS
    ))
    .fetch_all(pool)
    .await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<Service>> {
    sqlx::query_as::<_, Service>(&format!(
        "SELECT {} FROM services s WHERE s.id = ?",
        SERVICE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Services offered by a master (active and inactive).
pub async fn list_for_master(pool: &SqlitePool, master_id: i64) -> sqlx::Result<Vec<Service>> {
    sqlx::query_as::<_, Service>(&format!(
        "SELECT {} FROM services s
         JOIN master_services ms ON ms.service_id = s.id
         WHERE ms.master_id = ?
         ORDER BY s.category ASC, s.price ASC",
        SERVICE_COLUMNS
    ))
    .bind(master_id)
    .fetch_all(pool)
    .await
}

pub async fn insert(pool: &SqlitePool, req: &CreateServiceRequest) -> sqlx::Result<i64> {
    let id = sqlx::query(
        "INSERT INTO services (name, description, price, duration, category, is_active)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(req.name.trim())
    .bind(req.description.as_deref().unwrap_or(""))
    .bind(req.price)
    .bind(req.duration)
    .bind(req.category.as_deref().unwrap_or(""))
    .bind(req.is_active.unwrap_or(true))
    .execute(pool)
    .await?
    .last_insert_rowid();
    Ok(id)
}

/// Apply the fields present in `req`; returns false if the service does not exist.
pub async fn update(pool: &SqlitePool, id: i64, req: &UpdateServiceRequest) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "UPDATE services SET
            name = COALESCE(?, name),
            description = COALESCE(?, description),
            price = COALESCE(?, price),
            duration = COALESCE(?, duration),
            category = COALESCE(?, category),
            is_active = COALESCE(?, is_active)
         WHERE id = ?",
    )
    .bind(req.name.as_deref().map(str::trim))
    .bind(&req.description)
    .bind(req.price)
    .bind(req.duration)
    .bind(&req.category)
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
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM appointments WHERE service_id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
    let sql = if referenced {
        "UPDATE services SET is_active = 0 WHERE id = ?"
    } else {
        "DELETE FROM services WHERE id = ?"
    };
    let result = sqlx::query(sql).bind(id).execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count_active(pool: &SqlitePool) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM services WHERE is_active = 1")
        .fetch_one(pool)
        .await
}
