/// Database utilities
///
/// Connection pooling and schema migrations for PostgreSQL via sqlx.
pub mod migrations;
pub mod pool;

pub use migrations::run_migrations;
pub use pool::{create_pool, health_check, DatabaseConfig};
