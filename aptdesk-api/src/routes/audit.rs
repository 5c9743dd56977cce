/// Audit log endpoints
///
/// # Endpoints
///
/// ```text
/// GET /api/audit                          # Staff; latest 200
/// GET /api/audit/user/:user_id            # Staff
/// GET /api/audit/action/:action           # Staff
/// GET /api/audit/complaint/:complaint_id  # Staff, owner, or assignee
/// ```
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use aptdesk_shared::{
    auth::middleware::AuthContext,
    models::{
        action_log::{ActionLog, ActionLogView, AuditAction},
        complaint::Complaint,
    },
};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

/// Hard cap on audit listings
const LIST_LIMIT: i64 = 200;

fn require_staff(auth: &AuthContext) -> Result<(), ApiError> {
    if !auth.is_staff() {
        return Err(ApiError::Forbidden(
            "Only managers and admins can read the audit log".to_string(),
        ));
    }
    Ok(())
}

/// GET /api/audit
pub async fn list_recent(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<ActionLogView>>> {
    require_staff(&auth)?;

    let logs = ActionLog::list_recent(&state.db, LIST_LIMIT).await?;

    Ok(Json(logs))
}

/// GET /api/audit/user/:user_id
pub async fn list_by_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ActionLogView>>> {
    require_staff(&auth)?;

    let logs = ActionLog::list_by_user(&state.db, user_id, LIST_LIMIT).await?;

    Ok(Json(logs))
}

/// GET /api/audit/action/:action
pub async fn list_by_action(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(action): Path<String>,
) -> ApiResult<Json<Vec<ActionLogView>>> {
    require_staff(&auth)?;

    let action: AuditAction = action.parse().map_err(ApiError::BadRequest)?;

    let logs = ActionLog::list_by_action(&state.db, action, LIST_LIMIT).await?;

    Ok(Json(logs))
}

/// GET /api/audit/complaint/:complaint_id
///
/// The full history of one complaint, oldest first. Besides staff, the
/// complaint's owner and its currently assigned technician may read it.
pub async fn list_by_complaint(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(complaint_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ActionLogView>>> {
    if !auth.is_staff() {
        let complaint = Complaint::find_by_id(&state.db, complaint_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Complaint not found".to_string()))?;

        let is_owner = complaint.created_by == auth.user_id;
        let is_assignee = complaint.assigned_to == Some(auth.user_id);

        if !is_owner && !is_assignee {
            return Err(ApiError::Forbidden(
                "Not allowed to read this complaint's history".to_string(),
            ));
        }
    }

    let logs = ActionLog::list_by_complaint(&state.db, complaint_id).await?;

    Ok(Json(logs))
}
