/// Notification model and fan-out helpers
///
/// Notifications are created as a side effect of complaint transitions and
/// are mutated only to mark them read. A failed insert must never fail the
/// request that triggered it, so the `notify_*` helpers log a warning and
/// move on instead of returning an error.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::user::UserRole;

/// Kind of event the notification describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ComplaintCreated,
    ComplaintAssigned,
    ComplaintCompleted,
    ComplaintClosed,
    ComplaintRejected,
    System,
}

/// Notification record
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,

    /// Recipient
    pub user_id: Uuid,

    pub title: String,
    pub message: String,
    pub kind: NotificationKind,

    /// Complaint the event refers to; NULL once the complaint is deleted
    pub complaint_id: Option<Uuid>,

    /// Ticket token kept as text so it survives complaint deletion
    pub related_token: String,

    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a notification
#[derive(Debug, Clone)]
pub struct CreateNotification {
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub complaint_id: Option<Uuid>,
    pub related_token: String,
}

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, title, message, kind, complaint_id, related_token, is_read, read_at, created_at";

impl Notification {
    /// Creates a notification for a single user
    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        data: &CreateNotification,
    ) -> Result<Self, sqlx::Error> {
        let notification = sqlx::query_as::<_, Notification>(&format!(
            r#"
            INSERT INTO notifications (user_id, title, message, kind, complaint_id, related_token)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {NOTIFICATION_COLUMNS}
            "#,
        ))
        .bind(user_id)
        .bind(&data.title)
        .bind(&data.message)
        .bind(data.kind)
        .bind(data.complaint_id)
        .bind(&data.related_token)
        .fetch_one(pool)
        .await?;

        Ok(notification)
    }

    /// Finds a notification by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let notification = sqlx::query_as::<_, Notification>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(notification)
    }

    /// Lists a user's notifications, newest first, capped at `limit`
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let notifications = sqlx::query_as::<_, Notification>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(notifications)
    }

    /// Marks a notification read and stamps `read_at`
    pub async fn mark_read(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let notification = sqlx::query_as::<_, Notification>(&format!(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = NOW()
            WHERE id = $1
            RETURNING {NOTIFICATION_COLUMNS}
            "#,
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(notification)
    }
}

/// Notifies a single user, swallowing failures with a warning
pub async fn notify_user(pool: &PgPool, user_id: Uuid, data: &CreateNotification) {
    if let Err(e) = Notification::create(pool, user_id, data).await {
        warn!(
            user_id = %user_id,
            token = %data.related_token,
            "Failed to create notification: {}", e
        );
    }
}

/// Notifies every active user holding one of the given roles
pub async fn notify_roles(pool: &PgPool, roles: &[UserRole], data: &CreateNotification) {
    let recipients: Result<Vec<(Uuid,)>, sqlx::Error> =
        sqlx::query_as("SELECT id FROM users WHERE role = ANY($1) AND is_active = TRUE")
            .bind(roles)
            .fetch_all(pool)
            .await;

    let recipients = match recipients {
        Ok(rows) => rows,
        Err(e) => {
            warn!(token = %data.related_token, "Failed to resolve notification recipients: {}", e);
            return;
        }
    };

    for (user_id,) in recipients {
        notify_user(pool, user_id, data).await;
    }
}
