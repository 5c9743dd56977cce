/// Complaint endpoints: creation, listing, and lifecycle transitions
///
/// # Endpoints
///
/// ```text
/// POST   /api/complaints               # Tenant
/// GET    /api/complaints               # Role-filtered listing
/// PUT    /api/complaints/assign/:id    # Manager/admin
/// PUT    /api/complaints/status/:id    # Role-gated transitions
/// PUT    /api/complaints/priority/:id  # Manager/admin
/// DELETE /api/complaints/:id           # Admin
/// ```
///
/// Role checks happen here; state guards live in the model's SQL. When a
/// guarded update returns no row after the handler's own checks passed, a
/// concurrent transition won the race and the request gets a 400.
use crate::{
    app::AppState,
    error::{ApiError, ApiJson, ApiResult},
    routes::request_meta,
};
use aptdesk_shared::models::{
    action_log::{ActionLog, RecordAction},
    complaint::{
        normalize_category, normalize_image, Complaint, ComplaintFilter, ComplaintStatus,
        ComplaintView, CreateComplaint, Priority,
    },
    notification::{notify_roles, notify_user, CreateNotification},
    user::{User, UserRole},
    AuditAction, NotificationKind,
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use aptdesk_shared::auth::middleware::AuthContext;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

const DEFAULT_LIMIT: i64 = 100;

/// New complaint request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateComplaintRequest {
    #[validate(length(min = 3, max = 255, message = "must be 3-255 characters"))]
    pub title: String,

    #[validate(length(min = 5, message = "must be at least 5 characters"))]
    pub description: String,

    /// http(s) URL or base64 data:image URL
    pub image: Option<String>,

    /// Free-form category, normalized to lowercase
    pub category: Option<String>,
}

/// Listing query parameters
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Restrict to one status (case-insensitive)
    pub status: Option<String>,

    /// `CLOSED` drops closed complaints from the listing
    pub exclude_status: Option<String>,

    /// Include closed complaints (default false)
    pub include_closed: Option<bool>,

    /// Maximum rows, 1..=100
    pub limit: Option<i64>,
}

/// Assignment request
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub technician_id: Uuid,
}

/// Status transition request
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: ComplaintStatus,

    /// Rejection reason; defaults to "Rejected"
    pub reason: Option<String>,

    /// Technician's note when completing
    pub resolution_note: Option<String>,
}

/// Priority override request
#[derive(Debug, Deserialize)]
pub struct UpdatePriorityRequest {
    pub priority: Priority,
}

/// POST /api/complaints
///
/// Tenant only. Derives the priority from the text, allocates the yearly
/// ticket token, and notifies staff.
pub async fn create_complaint(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<CreateComplaintRequest>,
) -> ApiResult<(StatusCode, Json<Complaint>)> {
    if auth.role != UserRole::Tenant {
        return Err(ApiError::Forbidden(
            "Only tenants can file complaints".to_string(),
        ));
    }

    payload.validate()?;

    let image = normalize_image(payload.image.as_deref())?;
    let category = normalize_category(payload.category.as_deref());
    let priority = Priority::detect(&format!("{} {}", payload.title, payload.description));
    let token = Complaint::next_token(&state.db).await?;

    let complaint = Complaint::create(
        &state.db,
        CreateComplaint {
            token,
            title: payload.title,
            description: payload.description,
            image,
            category,
            priority,
            created_by: auth.user_id,
        },
    )
    .await?;

    let meta = request_meta(&headers);
    ActionLog::record(
        &state.db,
        RecordAction {
            action: AuditAction::ComplaintCreated,
            complaint_id: Some(complaint.id),
            related_token: complaint.token.clone(),
            performed_by: auth.user_id,
            performed_by_role: auth.role.to_string(),
            assigned_to: None,
            previous_status: None,
            new_status: Some(ComplaintStatus::New),
            note: String::new(),
            ip_address: meta.ip_address,
            user_agent: meta.user_agent,
        },
    )
    .await;

    notify_roles(
        &state.db,
        &[UserRole::Manager, UserRole::Admin],
        &CreateNotification {
            title: "New complaint filed".to_string(),
            message: format!("{}: {}", complaint.token, complaint.title),
            kind: NotificationKind::ComplaintCreated,
            complaint_id: Some(complaint.id),
            related_token: complaint.token.clone(),
        },
    )
    .await;

    tracing::info!(token = %complaint.token, priority = %complaint.priority, "Complaint created");

    Ok((StatusCode::CREATED, Json(complaint)))
}

/// GET /api/complaints
///
/// Tenants see their own complaints, technicians their assignments, staff
/// everything. Closed complaints are hidden unless `include_closed=true` or
/// `status=CLOSED` asks for them directly.
pub async fn list_complaints(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<ComplaintView>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=100).contains(&limit) {
        return Err(ApiError::BadRequest(
            "limit must be between 1 and 100".to_string(),
        ));
    }

    let status = query
        .status
        .as_deref()
        .map(|s| s.parse::<ComplaintStatus>())
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let exclude_status = query
        .exclude_status
        .as_deref()
        .map(|s| s.parse::<ComplaintStatus>())
        .transpose()
        .map_err(ApiError::BadRequest)?;

    if let Some(excluded) = exclude_status {
        if excluded != ComplaintStatus::Closed {
            return Err(ApiError::BadRequest(
                "Only CLOSED can be excluded".to_string(),
            ));
        }
    }

    // An explicit status filter wins over the default closed-exclusion; it
    // only collides with an explicit exclude_status=CLOSED.
    let exclude_closed = match status {
        Some(ComplaintStatus::Closed) => {
            if exclude_status.is_some() {
                return Ok(Json(Vec::new()));
            }
            false
        }
        Some(_) => false,
        None => exclude_status.is_some() || !query.include_closed.unwrap_or(false),
    };

    let mut filter = ComplaintFilter {
        status,
        exclude_closed,
        limit,
        ..Default::default()
    };

    match auth.role {
        UserRole::Tenant => filter.created_by = Some(auth.user_id),
        UserRole::Technician => filter.assigned_to = Some(auth.user_id),
        UserRole::Manager | UserRole::Admin => {}
    }

    let complaints = Complaint::list(&state.db, filter).await?;

    Ok(Json(complaints))
}

/// PUT /api/complaints/assign/:id
///
/// Manager/admin. The target must be an active technician and the complaint
/// NEW or REJECTED.
pub async fn assign_complaint(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<AssignRequest>,
) -> ApiResult<Json<Complaint>> {
    if !auth.is_staff() {
        return Err(ApiError::Forbidden(
            "Only managers and admins can assign complaints".to_string(),
        ));
    }

    let complaint = Complaint::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Complaint not found".to_string()))?;

    if !complaint.status.is_assignable() {
        return Err(ApiError::BadRequest(format!(
            "Cannot assign a complaint in status {}",
            complaint.status
        )));
    }

    let technician = User::find_by_id(&state.db, payload.technician_id)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Technician not found".to_string()))?;

    if technician.role != UserRole::Technician || !technician.is_active {
        return Err(ApiError::BadRequest(
            "Assignee must be an active technician".to_string(),
        ));
    }

    let previous_status = complaint.status;
    let updated = Complaint::assign(&state.db, id, technician.id, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Complaint is no longer assignable".to_string()))?;

    let meta = request_meta(&headers);
    ActionLog::record(
        &state.db,
        RecordAction {
            action: AuditAction::ComplaintAssigned,
            complaint_id: Some(updated.id),
            related_token: updated.token.clone(),
            performed_by: auth.user_id,
            performed_by_role: auth.role.to_string(),
            assigned_to: Some(technician.id),
            previous_status: Some(previous_status),
            new_status: Some(ComplaintStatus::Assigned),
            note: format!("Assigned to {}", technician.name),
            ip_address: meta.ip_address,
            user_agent: meta.user_agent,
        },
    )
    .await;

    notify_user(
        &state.db,
        technician.id,
        &CreateNotification {
            title: "Complaint assigned to you".to_string(),
            message: format!("{}: {}", updated.token, updated.title),
            kind: NotificationKind::ComplaintAssigned,
            complaint_id: Some(updated.id),
            related_token: updated.token.clone(),
        },
    )
    .await;
    notify_user(
        &state.db,
        updated.created_by,
        &CreateNotification {
            title: "Your complaint was assigned".to_string(),
            message: format!("{} is now handled by {}", updated.token, technician.name),
            kind: NotificationKind::ComplaintAssigned,
            complaint_id: Some(updated.id),
            related_token: updated.token.clone(),
        },
    )
    .await;

    Ok(Json(updated))
}

/// PUT /api/complaints/status/:id
///
/// Role-gated lifecycle transitions. ASSIGNED is not a valid target here;
/// assignment has its own endpoint because it carries a technician id.
pub async fn update_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateStatusRequest>,
) -> ApiResult<Json<Complaint>> {
    let complaint = Complaint::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Complaint not found".to_string()))?;

    let meta = request_meta(&headers);
    let previous_status = complaint.status;

    let (updated, action, note) = match payload.status {
        ComplaintStatus::Assigned => {
            return Err(ApiError::BadRequest(
                "Use the assign endpoint to assign a technician".to_string(),
            ));
        }

        ComplaintStatus::InProgress => {
            require_assigned_technician(&auth, &complaint)?;
            if complaint.status != ComplaintStatus::Assigned {
                return Err(ApiError::BadRequest(format!(
                    "Cannot start work from status {}",
                    complaint.status
                )));
            }

            let updated = Complaint::start(&state.db, id, auth.user_id)
                .await?
                .ok_or_else(|| invalid_transition(previous_status, ComplaintStatus::InProgress))?;

            (updated, AuditAction::ComplaintStarted, String::new())
        }

        ComplaintStatus::Completed => {
            require_assigned_technician(&auth, &complaint)?;
            if complaint.status != ComplaintStatus::InProgress {
                return Err(ApiError::BadRequest(format!(
                    "Cannot complete from status {}",
                    complaint.status
                )));
            }

            let resolution_note = payload.resolution_note.unwrap_or_default();
            let updated = Complaint::complete(&state.db, id, auth.user_id, &resolution_note)
                .await?
                .ok_or_else(|| invalid_transition(previous_status, ComplaintStatus::Completed))?;

            notify_roles(
                &state.db,
                &[UserRole::Manager, UserRole::Admin],
                &CreateNotification {
                    title: "Complaint completed".to_string(),
                    message: format!("{} is ready for review", updated.token),
                    kind: NotificationKind::ComplaintCompleted,
                    complaint_id: Some(updated.id),
                    related_token: updated.token.clone(),
                },
            )
            .await;

            (updated, AuditAction::ComplaintCompleted, resolution_note)
        }

        ComplaintStatus::Rejected => {
            require_assigned_technician(&auth, &complaint)?;
            if !complaint.status.is_rejectable() {
                return Err(ApiError::BadRequest(format!(
                    "Cannot reject from status {}",
                    complaint.status
                )));
            }

            let reason = payload
                .reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| "Rejected".to_string());
            let updated = Complaint::reject(&state.db, id, auth.user_id, &reason)
                .await?
                .ok_or_else(|| invalid_transition(previous_status, ComplaintStatus::Rejected))?;

            notify_user(
                &state.db,
                updated.created_by,
                &CreateNotification {
                    title: "Complaint rejected".to_string(),
                    message: format!("{}: {}", updated.token, reason),
                    kind: NotificationKind::ComplaintRejected,
                    complaint_id: Some(updated.id),
                    related_token: updated.token.clone(),
                },
            )
            .await;

            (updated, AuditAction::ComplaintRejected, reason)
        }

        ComplaintStatus::Closed => {
            if !auth.is_staff() {
                return Err(ApiError::Forbidden(
                    "Only managers and admins can close complaints".to_string(),
                ));
            }
            if complaint.status != ComplaintStatus::Completed {
                return Err(ApiError::BadRequest(format!(
                    "Only COMPLETED complaints can be closed, not {}",
                    complaint.status
                )));
            }

            let updated = Complaint::close(&state.db, id, auth.user_id)
                .await?
                .ok_or_else(|| invalid_transition(previous_status, ComplaintStatus::Closed))?;

            notify_user(
                &state.db,
                updated.created_by,
                &CreateNotification {
                    title: "Complaint closed".to_string(),
                    message: format!("{} has been resolved and closed", updated.token),
                    kind: NotificationKind::ComplaintClosed,
                    complaint_id: Some(updated.id),
                    related_token: updated.token.clone(),
                },
            )
            .await;

            (updated, AuditAction::ComplaintClosed, String::new())
        }

        ComplaintStatus::New => {
            // Reopen: the owning tenant may reopen a rejection; staff may
            // also reopen closed complaints.
            let allowed = if auth.is_staff() {
                matches!(
                    complaint.status,
                    ComplaintStatus::Rejected | ComplaintStatus::Closed
                )
            } else if auth.role == UserRole::Tenant && complaint.created_by == auth.user_id {
                if complaint.status == ComplaintStatus::Closed {
                    return Err(ApiError::Forbidden(
                        "Only managers and admins can reopen closed complaints".to_string(),
                    ));
                }
                complaint.status == ComplaintStatus::Rejected
            } else {
                return Err(ApiError::Forbidden(
                    "Not allowed to reopen this complaint".to_string(),
                ));
            };

            if !allowed {
                return Err(ApiError::BadRequest(format!(
                    "Cannot reopen from status {}",
                    complaint.status
                )));
            }

            let updated = Complaint::reopen(&state.db, id, auth.user_id, complaint.status)
                .await?
                .ok_or_else(|| invalid_transition(previous_status, ComplaintStatus::New))?;

            (updated, AuditAction::ComplaintReopened, String::new())
        }
    };

    ActionLog::record(
        &state.db,
        RecordAction {
            action,
            complaint_id: Some(updated.id),
            related_token: updated.token.clone(),
            performed_by: auth.user_id,
            performed_by_role: auth.role.to_string(),
            assigned_to: updated.assigned_to,
            previous_status: Some(previous_status),
            new_status: Some(updated.status),
            note,
            ip_address: meta.ip_address,
            user_agent: meta.user_agent,
        },
    )
    .await;

    tracing::info!(
        token = %updated.token,
        from = %previous_status,
        to = %updated.status,
        "Complaint transitioned"
    );

    Ok(Json(updated))
}

/// PUT /api/complaints/priority/:id
///
/// Manager/admin override of the detected priority.
pub async fn update_priority(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdatePriorityRequest>,
) -> ApiResult<Json<Complaint>> {
    if !auth.is_staff() {
        return Err(ApiError::Forbidden(
            "Only managers and admins can change priority".to_string(),
        ));
    }

    let complaint = Complaint::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Complaint not found".to_string()))?;

    let old_priority = complaint.priority;
    let updated = Complaint::set_priority(&state.db, id, payload.priority, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Complaint not found".to_string()))?;

    let meta = request_meta(&headers);
    ActionLog::record(
        &state.db,
        RecordAction {
            action: AuditAction::PriorityUpdated,
            complaint_id: Some(updated.id),
            related_token: updated.token.clone(),
            performed_by: auth.user_id,
            performed_by_role: auth.role.to_string(),
            assigned_to: updated.assigned_to,
            previous_status: None,
            new_status: None,
            note: format!("{} -> {}", old_priority, updated.priority),
            ip_address: meta.ip_address,
            user_agent: meta.user_agent,
        },
    )
    .await;

    Ok(Json(updated))
}

/// DELETE /api/complaints/:id
///
/// Admin only; hard delete. The audit entry keeps the token since the row is
/// gone.
pub async fn delete_complaint(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if auth.role != UserRole::Admin {
        return Err(ApiError::Forbidden(
            "Only admins can delete complaints".to_string(),
        ));
    }

    let deleted = Complaint::delete(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Complaint not found".to_string()))?;

    let meta = request_meta(&headers);
    ActionLog::record(
        &state.db,
        RecordAction {
            action: AuditAction::ComplaintDeleted,
            complaint_id: Some(deleted.id),
            related_token: deleted.token.clone(),
            performed_by: auth.user_id,
            performed_by_role: auth.role.to_string(),
            assigned_to: deleted.assigned_to,
            previous_status: Some(deleted.status),
            new_status: None,
            note: deleted.title,
            ip_address: meta.ip_address,
            user_agent: meta.user_agent,
        },
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// The acting user must be a technician and the current assignee
fn require_assigned_technician(auth: &AuthContext, complaint: &Complaint) -> Result<(), ApiError> {
    if auth.role != UserRole::Technician {
        return Err(ApiError::Forbidden(
            "Only the assigned technician can do this".to_string(),
        ));
    }
    if complaint.assigned_to != Some(auth.user_id) {
        return Err(ApiError::Forbidden(
            "Complaint is not assigned to you".to_string(),
        ));
    }
    Ok(())
}

/// Guarded update matched no row: another request changed the status first
fn invalid_transition(from: ComplaintStatus, to: ComplaintStatus) -> ApiError {
    ApiError::BadRequest(format!("Invalid transition from {} to {}", from, to))
}
