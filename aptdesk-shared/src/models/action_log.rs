/// Append-only audit log of every state-changing action
///
/// Entries are written as a side effect of handlers and never updated or
/// deleted. Like notifications, a failed append is logged as a warning and
/// must not fail the triggering request; use [`ActionLog::record`] for that.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::complaint::ComplaintStatus;

/// Auditable action
///
/// Stored as the `audit_action` Postgres enum and serialized snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "audit_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ComplaintCreated,
    ComplaintAssigned,
    ComplaintStarted,
    ComplaintCompleted,
    ComplaintRejected,
    ComplaintClosed,
    ComplaintReopened,
    PriorityUpdated,
    ComplaintDeleted,
    UserCreated,
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    /// Case-insensitive parse for the `/api/audit/action/:action` route
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "complaint_created" => Ok(AuditAction::ComplaintCreated),
            "complaint_assigned" => Ok(AuditAction::ComplaintAssigned),
            "complaint_started" => Ok(AuditAction::ComplaintStarted),
            "complaint_completed" => Ok(AuditAction::ComplaintCompleted),
            "complaint_rejected" => Ok(AuditAction::ComplaintRejected),
            "complaint_closed" => Ok(AuditAction::ComplaintClosed),
            "complaint_reopened" => Ok(AuditAction::ComplaintReopened),
            "priority_updated" => Ok(AuditAction::PriorityUpdated),
            "complaint_deleted" => Ok(AuditAction::ComplaintDeleted),
            "user_created" => Ok(AuditAction::UserCreated),
            other => Err(format!("Unknown action: {}", other)),
        }
    }
}

/// Audit log entry
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ActionLog {
    pub id: Uuid,
    pub action: AuditAction,

    /// Plain UUID without a foreign key so entries outlive their complaint
    pub complaint_id: Option<Uuid>,

    /// Ticket token kept as text for the same reason
    pub related_token: String,

    /// Acting user; NULL if the account was later deleted
    pub performed_by: Option<Uuid>,

    /// Role at the time of the action, denormalized for history
    pub performed_by_role: String,

    /// Technician involved in an assignment, if any
    pub assigned_to: Option<Uuid>,

    pub previous_status: Option<ComplaintStatus>,
    pub new_status: Option<ComplaintStatus>,

    /// Free-form detail (reject reason, old/new priority, ...)
    pub note: String,

    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

/// Audit entry with the performer's identity joined in, for listings
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ActionLogView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub log: ActionLog,

    /// Performer's display name; NULL if the account was deleted
    pub performed_by_name: Option<String>,

    /// Performer's email; NULL if the account was deleted
    pub performed_by_email: Option<String>,
}

/// Input for appending an audit entry
#[derive(Debug, Clone)]
pub struct RecordAction {
    pub action: AuditAction,
    pub complaint_id: Option<Uuid>,
    pub related_token: String,
    pub performed_by: Uuid,
    pub performed_by_role: String,
    pub assigned_to: Option<Uuid>,
    pub previous_status: Option<ComplaintStatus>,
    pub new_status: Option<ComplaintStatus>,
    pub note: String,
    pub ip_address: String,
    pub user_agent: String,
}

const LOG_COLUMNS: &str = "id, action, complaint_id, related_token, performed_by, \
     performed_by_role, assigned_to, previous_status, new_status, note, ip_address, \
     user_agent, created_at";

const LOG_VIEW_QUERY: &str = "SELECT l.id, l.action, l.complaint_id, l.related_token, \
     l.performed_by, l.performed_by_role, l.assigned_to, l.previous_status, l.new_status, \
     l.note, l.ip_address, l.user_agent, l.created_at, \
     u.name AS performed_by_name, u.email AS performed_by_email \
     FROM action_logs l \
     LEFT JOIN users u ON u.id = l.performed_by";

impl ActionLog {
    /// Appends an audit entry
    pub async fn insert(pool: &PgPool, data: &RecordAction) -> Result<Self, sqlx::Error> {
        let log = sqlx::query_as::<_, ActionLog>(&format!(
            r#"
            INSERT INTO action_logs
                (action, complaint_id, related_token, performed_by, performed_by_role,
                 assigned_to, previous_status, new_status, note, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {LOG_COLUMNS}
            "#,
        ))
        .bind(data.action)
        .bind(data.complaint_id)
        .bind(&data.related_token)
        .bind(data.performed_by)
        .bind(&data.performed_by_role)
        .bind(data.assigned_to)
        .bind(data.previous_status)
        .bind(data.new_status)
        .bind(&data.note)
        .bind(&data.ip_address)
        .bind(&data.user_agent)
        .fetch_one(pool)
        .await?;

        Ok(log)
    }

    /// Appends an audit entry, swallowing failures with a warning
    ///
    /// The audit trail is best-effort from the request's point of view; the
    /// action it documents has already been committed.
    pub async fn record(pool: &PgPool, data: RecordAction) {
        if let Err(e) = Self::insert(pool, &data).await {
            warn!(
                action = ?data.action,
                token = %data.related_token,
                "Failed to write audit log: {}", e
            );
        }
    }

    /// Latest entries across the whole system, newest first
    pub async fn list_recent(pool: &PgPool, limit: i64) -> Result<Vec<ActionLogView>, sqlx::Error> {
        let logs = sqlx::query_as::<_, ActionLogView>(&format!(
            "{LOG_VIEW_QUERY} ORDER BY l.created_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(logs)
    }

    /// Entries performed by a user, newest first
    pub async fn list_by_user(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ActionLogView>, sqlx::Error> {
        let logs = sqlx::query_as::<_, ActionLogView>(&format!(
            "{LOG_VIEW_QUERY} WHERE l.performed_by = $1 ORDER BY l.created_at DESC LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(logs)
    }

    /// Entries of one action kind, newest first
    pub async fn list_by_action(
        pool: &PgPool,
        action: AuditAction,
        limit: i64,
    ) -> Result<Vec<ActionLogView>, sqlx::Error> {
        let logs = sqlx::query_as::<_, ActionLogView>(&format!(
            "{LOG_VIEW_QUERY} WHERE l.action = $1 ORDER BY l.created_at DESC LIMIT $2"
        ))
        .bind(action)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(logs)
    }

    /// Full history of one complaint, oldest first
    pub async fn list_by_complaint(
        pool: &PgPool,
        complaint_id: Uuid,
    ) -> Result<Vec<ActionLogView>, sqlx::Error> {
        let logs = sqlx::query_as::<_, ActionLogView>(&format!(
            "{LOG_VIEW_QUERY} WHERE l.complaint_id = $1 ORDER BY l.created_at ASC"
        ))
        .bind(complaint_id)
        .fetch_all(pool)
        .await?;

        Ok(logs)
    }
}
