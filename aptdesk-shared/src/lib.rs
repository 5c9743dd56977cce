/// AptDesk shared library
///
/// Common code used by the API server:
/// - Database pool and migrations
/// - Domain models (users, complaints, notifications, action logs)
/// - Authentication (argon2 password hashing, JWT, axum middleware)
pub mod auth;
pub mod db;
pub mod models;

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
