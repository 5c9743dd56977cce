/// Route handlers
///
/// Handlers own role checks and orchestration (validate, mutate, notify,
/// audit); data access lives in `aptdesk_shared::models`.
pub mod analytics;
pub mod audit;
pub mod auth;
pub mod complaints;
pub mod health;
pub mod notifications;

use axum::http::{header, HeaderMap};

/// Client metadata recorded into the audit log
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip_address: String,
    pub user_agent: String,
}

/// Extracts client IP and user agent from request headers
///
/// The service runs behind a reverse proxy, so the client address comes from
/// `X-Forwarded-For` (first hop) when present.
pub fn request_meta(headers: &HeaderMap) -> RequestMeta {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_default();

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_default();

    RequestMeta {
        ip_address,
        user_agent,
    }
}
