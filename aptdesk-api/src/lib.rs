/// AptDesk API server library
///
/// Exposes the router, configuration, and error types so integration tests
/// can drive the application without a running binary.
pub mod app;
pub mod config;
pub mod error;
pub mod routes;
pub mod seed;
