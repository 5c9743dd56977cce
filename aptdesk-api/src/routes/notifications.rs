/// Notification endpoints
///
/// # Endpoints
///
/// ```text
/// GET /api/notifications           # Current user's, newest first
/// PUT /api/notifications/:id/read  # Owner or admin
/// ```
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use aptdesk_shared::{
    auth::middleware::AuthContext,
    models::{notification::Notification, user::UserRole},
};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

/// Hard cap on the notification listing
const LIST_LIMIT: i64 = 200;

/// GET /api/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<Notification>>> {
    let notifications = Notification::list_for_user(&state.db, auth.user_id, LIST_LIMIT).await?;

    Ok(Json(notifications))
}

/// PUT /api/notifications/:id/read
///
/// Marks a notification read. Only the recipient (or an admin) may do so.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Notification>> {
    let notification = Notification::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Notification not found".to_string()))?;

    if notification.user_id != auth.user_id && auth.role != UserRole::Admin {
        return Err(ApiError::Forbidden(
            "Not your notification".to_string(),
        ));
    }

    let updated = Notification::mark_read(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Notification not found".to_string()))?;

    Ok(Json(updated))
}
