use sea_orm::DatabaseConnection;
use sqlx::migrate::Migrator;

/// SQL migrations embedded from `crates/backend/migrations`
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Apply pending migrations on the pool behind `conn`
pub async fn run_migrations(conn: &DatabaseConnection) -> anyhow::Result<()> {
    let pool = conn.get_sqlite_connection_pool();
    MIGRATOR.run(pool).await?;
    tracing::info!("Database migrations applied successfully");
    Ok(())
}
