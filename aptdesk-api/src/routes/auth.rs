/// Authentication and user management endpoints
///
/// # Endpoints
///
/// ```text
/// POST /api/auth/login          # Public
/// POST /api/auth/refresh        # Public
/// POST /api/auth/create-user    # Admin
/// GET  /api/auth/technicians    # Authenticated (assignment dropdown)
/// GET  /api/auth/users          # Admin
/// ```
use crate::{
    app::AppState,
    error::{ApiError, ApiJson, ApiResult},
    routes::request_meta,
};
use aptdesk_shared::{
    auth::{
        jwt::{self, Claims, TokenType},
        middleware::AuthContext,
        password,
    },
    models::{
        action_log::{ActionLog, RecordAction},
        user::{CreateUser, User, UserRole},
        AuditAction,
    },
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,

    #[validate(length(min = 1, message = "must not be empty"))]
    pub password: String,
}

/// Identity block returned by login
#[derive(Debug, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserInfo,
}

/// Token refresh request
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Token refresh response
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

/// New user request (admin only)
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 255, message = "must be 1-255 characters"))]
    pub name: String,

    #[validate(email(message = "must be a valid email address"))]
    pub email: String,

    pub password: String,

    pub role: UserRole,
}

/// POST /api/auth/login
///
/// Exchanges credentials for access and refresh tokens. Deactivated accounts
/// are refused even with the right password. The error message never reveals
/// whether the email exists.
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    payload.validate()?;

    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".to_string()))?;

    if !password::verify_password(&payload.password, &user.password_hash)? {
        return Err(ApiError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    }

    if !user.is_active {
        return Err(ApiError::Forbidden("Account is deactivated".to_string()));
    }

    let access_token = jwt::create_token(
        &Claims::new(user.id, user.role, TokenType::Access),
        state.jwt_secret(),
    )?;
    let refresh_token = jwt::create_token(
        &Claims::new(user.id, user.role, TokenType::Refresh),
        state.jwt_secret(),
    )?;

    User::update_last_login(&state.db, user.id).await?;

    tracing::info!(user_id = %user.id, role = %user.role, "User logged in");

    Ok(Json(LoginResponse {
        access_token,
        refresh_token,
        user: UserInfo {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
        },
    }))
}

/// POST /api/auth/refresh
///
/// Exchanges a valid refresh token for a new access token.
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let access_token = jwt::refresh_access_token(&payload.refresh_token, state.jwt_secret())?;

    Ok(Json(RefreshResponse { access_token }))
}

/// POST /api/auth/create-user
///
/// Admin only. Creates a tenant, technician, or manager account; admin
/// accounts only come from the startup bootstrap. Duplicate emails are 409.
pub async fn create_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    if auth.role != UserRole::Admin {
        return Err(ApiError::Forbidden(
            "Only admins can create users".to_string(),
        ));
    }

    payload.validate()?;

    if !payload.role.is_assignable() {
        return Err(ApiError::BadRequest(
            "Role must be tenant, technician, or manager".to_string(),
        ));
    }

    password::validate_password_strength(&payload.password).map_err(ApiError::BadRequest)?;

    let password_hash = password::hash_password(&payload.password)?;

    let user = User::create(
        &state.db,
        CreateUser {
            name: payload.name,
            email: payload.email.trim().to_lowercase(),
            password_hash,
            role: payload.role,
        },
    )
    .await?;

    let meta = request_meta(&headers);
    ActionLog::record(
        &state.db,
        RecordAction {
            action: AuditAction::UserCreated,
            complaint_id: None,
            related_token: String::new(),
            performed_by: auth.user_id,
            performed_by_role: auth.role.to_string(),
            assigned_to: None,
            previous_status: None,
            new_status: None,
            note: format!("Created {} account for {}", user.role, user.email),
            ip_address: meta.ip_address,
            user_agent: meta.user_agent,
        },
    )
    .await;

    tracing::info!(user_id = %user.id, role = %user.role, "User created");

    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/auth/technicians
///
/// Active technicians only; feeds the assignment dropdown.
pub async fn list_technicians(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<User>>> {
    let technicians = User::list_by_role(&state.db, UserRole::Technician, true).await?;

    Ok(Json(technicians))
}

/// GET /api/auth/users
///
/// Admin only. All users, newest first; password hashes never serialize.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<User>>> {
    if auth.role != UserRole::Admin {
        return Err(ApiError::Forbidden(
            "Only admins can list users".to_string(),
        ));
    }

    let users = User::list(&state.db).await?;

    Ok(Json(users))
}
