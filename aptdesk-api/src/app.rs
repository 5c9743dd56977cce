/// Application state and router builder
///
/// # Router layout
///
/// ```text
/// /
/// ├── /health                                # Liveness + DB check (public)
/// └── /api/
///     ├── /auth/
///     │   ├── POST /login                    # Public
///     │   ├── POST /refresh                  # Public
///     │   ├── POST /create-user              # Admin
///     │   ├── GET  /technicians              # Authenticated
///     │   └── GET  /users                    # Admin
///     ├── /complaints/
///     │   ├── POST /                         # Tenant
///     │   ├── GET  /                         # Role-filtered
///     │   ├── PUT  /assign/:id               # Manager/admin
///     │   ├── PUT  /status/:id               # Role-gated transitions
///     │   ├── PUT  /priority/:id             # Manager/admin
///     │   └── DELETE /:id                    # Admin
///     ├── /notifications/
///     │   ├── GET /                          # Current user
///     │   └── PUT /:id/read                  # Owner or admin
///     ├── /audit/...                         # Staff (complaint view also owner/assignee)
///     └── /admin/analytics                   # Admin
/// ```
///
/// # Middleware stack
///
/// Applied in order: request tracing, CORS, 10 MB body limit (base64 images),
/// then JWT auth on everything under `/api` except login/refresh.
use crate::config::Config;
use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{delete, get, post, put},
    Router,
};
use aptdesk_shared::auth::middleware::{jwt_auth_middleware, AuthError};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Request body cap; complaints may carry base64 images up to 8 MB
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared application state
///
/// Cloned per request via axum's `State` extractor; `Arc` keeps it cheap.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates new application state
    pub fn new(db: PgPool, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete axum router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    // Login and refresh are the only unauthenticated API routes
    let auth_public = Router::new()
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh));

    let auth_protected = Router::new()
        .route("/create-user", post(routes::auth::create_user))
        .route("/technicians", get(routes::auth::list_technicians))
        .route("/users", get(routes::auth::list_users))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let complaint_routes = Router::new()
        .route("/", post(routes::complaints::create_complaint))
        .route("/", get(routes::complaints::list_complaints))
        .route("/assign/:id", put(routes::complaints::assign_complaint))
        .route("/status/:id", put(routes::complaints::update_status))
        .route("/priority/:id", put(routes::complaints::update_priority))
        .route("/:id", delete(routes::complaints::delete_complaint))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let notification_routes = Router::new()
        .route("/", get(routes::notifications::list_notifications))
        .route("/:id/read", put(routes::notifications::mark_read))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let audit_routes = Router::new()
        .route("/", get(routes::audit::list_recent))
        .route("/user/:user_id", get(routes::audit::list_by_user))
        .route("/action/:action", get(routes::audit::list_by_action))
        .route(
            "/complaint/:complaint_id",
            get(routes::audit::list_by_complaint),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let admin_routes = Router::new()
        .route("/analytics", get(routes::analytics::analytics))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let api_routes = Router::new()
        .nest("/auth", auth_public.merge(auth_protected))
        .nest("/complaints", complaint_routes)
        .nest("/notifications", notification_routes)
        .nest("/audit", audit_routes)
        .nest("/admin", admin_routes);

    let cors = if state.config.api.cors_origins.contains(&"*".to_string()) {
        // Development mode
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/api", api_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// JWT authentication middleware layer
///
/// Validates the bearer token and injects an `AuthContext` into request
/// extensions for handlers to consume.
async fn jwt_auth_layer(
    state: axum::extract::State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    jwt_auth_middleware(state.jwt_secret().to_string(), req, next).await
}
