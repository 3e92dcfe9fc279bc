pub mod admins;
pub mod appointments;
pub mod masters;
pub mod notifications;
pub mod reviews;
pub mod schedules;
pub mod services;
pub mod users;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// Schema migrations, applied in order and tracked in `_migrations`.
const MIGRATIONS: &[(&str, &str)] = &[
    ("001_init", include_str!("../../migrations/001_init.sql")),
    (
        "003_review_per_visit",
        include_str!("../../migrations/003_review_per_visit.sql"),
    ),
];

/// Demo catalog, applied once on a fresh database by the server binary.
const SEED: (&str, &str) = (
    "002_seed_catalog",
    include_str!("../../migrations/002_seed_catalog.sql"),
);

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    // WAL journal; a no-op for in-memory databases
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    for (name, sql) in MIGRATIONS {
        apply_once(pool, name, sql).await?;
    }

    tracing::info!("Database migrations up to date");
    Ok(())
}

/// Insert the demo catalog unless the database already has services.
pub async fn seed_catalog(pool: &SqlitePool) -> anyhow::Result<()> {
    let has_services: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM services")
        .fetch_one(pool)
        .await?;
    if has_services {
        return Ok(());
    }
    let (name, sql) = SEED;
    apply_once(pool, name, sql).await
}

/// Ensure the configured owner is present in the admins table.
pub async fn ensure_owner_admin(pool: &SqlitePool, telegram_id: i64) -> anyhow::Result<()> {
    if admins::find_by_telegram_id(pool, telegram_id).await?.is_none() {
        admins::insert(pool, telegram_id, crate::models::AdminRole::SuperAdmin).await?;
        tracing::info!("Registered owner {} as SUPER_ADMIN", telegram_id);
    }
    Ok(())
}

async fn apply_once(pool: &SqlitePool, name: &str, sql: &str) -> anyhow::Result<()> {
    let applied: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?")
            .bind(name)
            .fetch_one(pool)
            .await?;
    if applied {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for statement in sql.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(&mut *tx).await?;
        }
    }
    sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
        .bind(name)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!("Applied migration: {}", name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = test_support::memory_pool().await;
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_seed_only_on_empty_catalog() {
        let pool = test_support::migrated_pool().await;
        seed_catalog(&pool).await.unwrap();
        seed_catalog(&pool).await.unwrap();

        let services: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM services")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(services, 5);
        let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM master_services")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(links, 5);
    }

    #[tokio::test]
    async fn test_owner_admin_registered_once() {
        let pool = test_support::migrated_pool().await;
        ensure_owner_admin(&pool, 42).await.unwrap();
        ensure_owner_admin(&pool, 42).await.unwrap();

        let admin = admins::find_by_telegram_id(&pool, 42).await.unwrap().unwrap();
        assert_eq!(admin.role, crate::models::AdminRole::SuperAdmin);
    }

    #[tokio::test]
    async fn test_second_review_of_same_visit_rejected_by_schema() {
        let pool = test_support::migrated_pool().await;
        let fx = test_support::Fixture::new(&pool).await;
        let when = chrono::NaiveDate::from_ymd_opt(2099, 3, 2)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let visit = fx.book(&pool, when).await;

        reviews::insert(&pool, fx.user_id, fx.master_id, Some(visit), 5, None)
            .await
            .unwrap();
        let err = reviews::insert(&pool, fx.user_id, fx.master_id, Some(visit), 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, sqlx::Error::Database(ref e) if e.is_unique_violation()));
    }
}
