/// Database migration runner
///
/// Migrations live in `aptdesk-shared/migrations/` and are embedded into the
/// binary at compile time, so the server can bring a fresh database up to date
/// at startup without any files on disk.
use sqlx::postgres::PgPool;
use tracing::{info, warn};

/// Runs all pending migrations
///
/// # Errors
///
/// Returns an error if a migration file is malformed or fails to execute;
/// the failing migration is rolled back.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    info!("Running database migrations");

    match sqlx::migrate!("./migrations").run(pool).await {
        Ok(()) => {
            info!("Database schema is up to date");
            Ok(())
        }
        Err(e) => {
            warn!("Migration failed: {}", e);
            Err(e)
        }
    }
}
