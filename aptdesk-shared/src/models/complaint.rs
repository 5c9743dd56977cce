/// Complaint model, lifecycle state machine, and database operations
///
/// A complaint moves through a fixed lifecycle:
///
/// ```text
/// NEW ──assign──> ASSIGNED ──start──> IN_PROGRESS ──complete──> COMPLETED ──close──> CLOSED
///  ^                  │                    │                                            │
///  │                  └──────reject────────┘                                            │
///  └────────────reopen────────── REJECTED <──┘                  <───────reopen──────────┘
/// ```
///
/// Transitions are guarded in SQL (`WHERE status = <expected>`), so a lost
/// race surfaces as an invalid transition instead of a double-apply. Role
/// checks stay in the handlers; this module only enforces state.
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Lifecycle state of a complaint
///
/// Stored lowercase in the `complaint_status` Postgres enum; serialized in
/// SCREAMING_SNAKE_CASE over the API (`"NEW"`, `"IN_PROGRESS"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "complaint_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplaintStatus {
    New,
    Assigned,
    InProgress,
    Completed,
    Closed,
    Rejected,
}

impl ComplaintStatus {
    /// API-facing name
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintStatus::New => "NEW",
            ComplaintStatus::Assigned => "ASSIGNED",
            ComplaintStatus::InProgress => "IN_PROGRESS",
            ComplaintStatus::Completed => "COMPLETED",
            ComplaintStatus::Closed => "CLOSED",
            ComplaintStatus::Rejected => "REJECTED",
        }
    }

    /// States from which a technician can be assigned
    pub fn is_assignable(&self) -> bool {
        matches!(self, ComplaintStatus::New | ComplaintStatus::Rejected)
    }

    /// States a technician may reject from
    pub fn is_rejectable(&self) -> bool {
        matches!(self, ComplaintStatus::Assigned | ComplaintStatus::InProgress)
    }
}

impl std::str::FromStr for ComplaintStatus {
    type Err = String;

    /// Case-insensitive parse for query parameters
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NEW" => Ok(ComplaintStatus::New),
            "ASSIGNED" => Ok(ComplaintStatus::Assigned),
            "IN_PROGRESS" => Ok(ComplaintStatus::InProgress),
            "COMPLETED" => Ok(ComplaintStatus::Completed),
            "CLOSED" => Ok(ComplaintStatus::Closed),
            "REJECTED" => Ok(ComplaintStatus::Rejected),
            other => Err(format!("Unknown status: {}", other)),
        }
    }
}

impl std::fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency of a complaint, derived at creation from the text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "complaint_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

/// Keyword tables for priority detection, scanned highest first
const CRITICAL_KEYWORDS: &[&str] = &[
    "electricity",
    "fire",
    "gas leak",
    "lift stuck",
    "water flooding",
];

const HIGH_KEYWORDS: &[&str] = &["water leak", "power issue", "security", "internet down"];

const MEDIUM_KEYWORDS: &[&str] = &["plumbing slow", "fan/light issue", "door lock"];

const LOW_KEYWORDS: &[&str] = &["noise", "painting", "cleaning", "minor repair"];

impl Priority {
    /// Derives a priority from complaint text
    ///
    /// The lowercased text is scanned against the keyword tables in order
    /// critical, high, medium, low; the first hit wins. Text that matches
    /// nothing (including empty text) lands on `Medium`.
    pub fn detect(text: &str) -> Self {
        let haystack = text.to_lowercase();

        let tables = [
            (Priority::Critical, CRITICAL_KEYWORDS),
            (Priority::High, HIGH_KEYWORDS),
            (Priority::Medium, MEDIUM_KEYWORDS),
            (Priority::Low, LOW_KEYWORDS),
        ];

        for (priority, keywords) in tables {
            if keywords.iter().any(|kw| haystack.contains(kw)) {
                return priority;
            }
        }

        Priority::Medium
    }

    /// Lowercase name as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for complaint input validation
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// Not an http(s) URL or a data:image URL
    #[error("Image must be an http(s) URL or a base64 data:image URL")]
    InvalidFormat,

    /// Unsupported image subtype in a data URL
    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),

    /// Encoded payload exceeds the size limit
    #[error("Image exceeds the {} MB limit", MAX_IMAGE_BYTES / (1024 * 1024))]
    TooLarge,
}

/// Maximum decoded size for inline base64 images
pub const MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;

const ALLOWED_IMAGE_TYPES: &[&str] = &["png", "jpeg", "jpg", "gif", "webp", "bmp", "svg+xml"];

/// Validates and normalizes the optional image field
///
/// Accepts an http(s) URL or a `data:image/<type>;base64,<payload>` URL whose
/// decoded payload is at most [`MAX_IMAGE_BYTES`]. Missing or empty input
/// normalizes to the empty string.
pub fn normalize_image(image: Option<&str>) -> Result<String, ImageError> {
    let image = match image {
        Some(s) if !s.trim().is_empty() => s.trim(),
        _ => return Ok(String::new()),
    };

    if image.starts_with("http://") || image.starts_with("https://") {
        return Ok(image.to_string());
    }

    let rest = image.strip_prefix("data:image/").ok_or(ImageError::InvalidFormat)?;
    let (subtype, payload) = rest.split_once(";base64,").ok_or(ImageError::InvalidFormat)?;

    if !ALLOWED_IMAGE_TYPES.contains(&subtype) {
        return Err(ImageError::UnsupportedType(subtype.to_string()));
    }

    // Base64 inflates by 4/3, so bound the encoded length instead of decoding
    if payload.len() > MAX_IMAGE_BYTES / 3 * 4 + 4 {
        return Err(ImageError::TooLarge);
    }

    Ok(image.to_string())
}

/// Normalizes the free-form category to lowercase, defaulting to "general"
pub fn normalize_category(category: Option<&str>) -> String {
    match category {
        Some(c) if !c.trim().is_empty() => c.trim().to_lowercase(),
        _ => "general".to_string(),
    }
}

/// Complaint record
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Complaint {
    /// Unique complaint ID (UUID v4)
    pub id: Uuid,

    /// Human-readable ticket token, e.g. `APT-2026-0042`
    pub token: String,

    pub title: String,
    pub description: String,

    /// Image URL or base64 data URL; empty when none was attached
    pub image: String,

    /// Lowercase category, "general" by default
    pub category: String,

    pub status: ComplaintStatus,
    pub priority: Priority,

    /// Tenant who filed the complaint
    pub created_by: Uuid,

    /// Technician currently assigned, if any
    pub assigned_to: Option<Uuid>,

    /// Staff member who made the assignment
    pub assigned_by: Option<Uuid>,

    pub completed_by: Option<Uuid>,
    pub closed_by: Option<Uuid>,
    pub rejected_by: Option<Uuid>,

    /// Whoever performed the most recent transition
    pub last_updated_by: Option<Uuid>,

    pub reject_reason: String,
    pub resolution_note: String,

    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Complaint with creator and assignee display names joined in, for listings
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ComplaintView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub complaint: Complaint,

    /// Name of the tenant who filed the complaint
    pub created_by_name: String,

    /// Name of the assigned technician, if any
    pub assigned_to_name: Option<String>,
}

/// Input for creating a new complaint
#[derive(Debug, Clone)]
pub struct CreateComplaint {
    pub token: String,
    pub title: String,
    pub description: String,
    pub image: String,
    pub category: String,
    pub priority: Priority,
    pub created_by: Uuid,
}

/// Filter for complaint listings
///
/// Role filtering is expressed through `created_by`/`assigned_to`; handlers
/// fill these from the caller's auth context.
#[derive(Debug, Clone, Default)]
pub struct ComplaintFilter {
    /// Restrict to complaints filed by this user (tenant view)
    pub created_by: Option<Uuid>,

    /// Restrict to complaints assigned to this user (technician view)
    pub assigned_to: Option<Uuid>,

    /// Restrict to a single status
    pub status: Option<ComplaintStatus>,

    /// Drop closed complaints from the listing
    pub exclude_closed: bool,

    /// Maximum rows to return
    pub limit: i64,
}

const COMPLAINT_COLUMNS: &str = "id, token, title, description, image, category, status, \
     priority, created_by, assigned_to, assigned_by, completed_by, closed_by, rejected_by, \
     last_updated_by, reject_reason, resolution_note, assigned_at, started_at, completed_at, \
     closed_at, rejected_at, created_at, updated_at";

/// Formats a ticket token from year and per-year sequence number
fn format_token(year: i32, seq: i32) -> String {
    format!("APT-{}-{:04}", year, seq)
}

impl Complaint {
    /// Allocates the next ticket token for the current year
    ///
    /// The per-year sequence lives in `token_counters` and is advanced with a
    /// single upsert, so concurrent creations never collide.
    pub async fn next_token(pool: &PgPool) -> Result<String, sqlx::Error> {
        let year = Utc::now().year();

        let (seq,): (i32,) = sqlx::query_as(
            r#"
            INSERT INTO token_counters (year, last_seq)
            VALUES ($1, 1)
            ON CONFLICT (year)
            DO UPDATE SET last_seq = token_counters.last_seq + 1
            RETURNING last_seq
            "#,
        )
        .bind(year)
        .fetch_one(pool)
        .await?;

        Ok(format_token(year, seq))
    }

    /// Creates a new complaint in the NEW state
    pub async fn create(pool: &PgPool, data: CreateComplaint) -> Result<Self, sqlx::Error> {
        let complaint = sqlx::query_as::<_, Complaint>(&format!(
            r#"
            INSERT INTO complaints (token, title, description, image, category, priority, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {COMPLAINT_COLUMNS}
            "#,
        ))
        .bind(data.token)
        .bind(data.title)
        .bind(data.description)
        .bind(data.image)
        .bind(data.category)
        .bind(data.priority)
        .bind(data.created_by)
        .fetch_one(pool)
        .await?;

        Ok(complaint)
    }

    /// Finds a complaint by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let complaint = sqlx::query_as::<_, Complaint>(&format!(
            "SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(complaint)
    }

    /// Lists complaints matching the filter, newest first, with creator and
    /// assignee names joined in
    pub async fn list(
        pool: &PgPool,
        filter: ComplaintFilter,
    ) -> Result<Vec<ComplaintView>, sqlx::Error> {
        let mut query = String::from(
            "SELECT c.id, c.token, c.title, c.description, c.image, c.category, c.status, \
             c.priority, c.created_by, c.assigned_to, c.assigned_by, c.completed_by, \
             c.closed_by, c.rejected_by, c.last_updated_by, c.reject_reason, c.resolution_note, \
             c.assigned_at, c.started_at, c.completed_at, c.closed_at, c.rejected_at, \
             c.created_at, c.updated_at, \
             creator.name AS created_by_name, assignee.name AS assigned_to_name \
             FROM complaints c \
             JOIN users creator ON creator.id = c.created_by \
             LEFT JOIN users assignee ON assignee.id = c.assigned_to \
             WHERE 1 = 1",
        );
        let mut bind_count = 1;

        if filter.created_by.is_some() {
            bind_count += 1;
            query.push_str(&format!(" AND c.created_by = ${}", bind_count));
        }
        if filter.assigned_to.is_some() {
            bind_count += 1;
            query.push_str(&format!(" AND c.assigned_to = ${}", bind_count));
        }
        if filter.status.is_some() {
            bind_count += 1;
            query.push_str(&format!(" AND c.status = ${}", bind_count));
        }
        if filter.exclude_closed {
            query.push_str(" AND c.status <> 'closed'");
        }

        query.push_str(" ORDER BY c.created_at DESC LIMIT $1");

        let mut q = sqlx::query_as::<_, ComplaintView>(&query).bind(filter.limit);

        if let Some(created_by) = filter.created_by {
            q = q.bind(created_by);
        }
        if let Some(assigned_to) = filter.assigned_to {
            q = q.bind(assigned_to);
        }
        if let Some(status) = filter.status {
            q = q.bind(status);
        }

        q.fetch_all(pool).await
    }

    /// NEW/REJECTED -> ASSIGNED
    ///
    /// Clears any previous rejection and stamps `assigned_at`. Returns `None`
    /// if the complaint is no longer in an assignable state.
    pub async fn assign(
        pool: &PgPool,
        id: Uuid,
        technician_id: Uuid,
        assigned_by: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let complaint = sqlx::query_as::<_, Complaint>(&format!(
            r#"
            UPDATE complaints
            SET status = 'assigned', assigned_to = $2, assigned_by = $3,
                assigned_at = NOW(), rejected_by = NULL, rejected_at = NULL,
                reject_reason = '', last_updated_by = $3, updated_at = NOW()
            WHERE id = $1 AND status IN ('new', 'rejected')
            RETURNING {COMPLAINT_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(technician_id)
        .bind(assigned_by)
        .fetch_optional(pool)
        .await?;

        Ok(complaint)
    }

    /// ASSIGNED -> IN_PROGRESS, by the assigned technician
    pub async fn start(
        pool: &PgPool,
        id: Uuid,
        technician_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let complaint = sqlx::query_as::<_, Complaint>(&format!(
            r#"
            UPDATE complaints
            SET status = 'in_progress', started_at = NOW(),
                last_updated_by = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'assigned' AND assigned_to = $2
            RETURNING {COMPLAINT_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(technician_id)
        .fetch_optional(pool)
        .await?;

        Ok(complaint)
    }

    /// IN_PROGRESS -> COMPLETED, by the assigned technician
    pub async fn complete(
        pool: &PgPool,
        id: Uuid,
        technician_id: Uuid,
        resolution_note: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let complaint = sqlx::query_as::<_, Complaint>(&format!(
            r#"
            UPDATE complaints
            SET status = 'completed', completed_by = $2, completed_at = NOW(),
                resolution_note = $3, last_updated_by = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'in_progress' AND assigned_to = $2
            RETURNING {COMPLAINT_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(technician_id)
        .bind(resolution_note)
        .fetch_optional(pool)
        .await?;

        Ok(complaint)
    }

    /// ASSIGNED/IN_PROGRESS -> REJECTED, by the assigned technician
    ///
    /// Unassigns the complaint so it can be reassigned or reopened.
    pub async fn reject(
        pool: &PgPool,
        id: Uuid,
        technician_id: Uuid,
        reason: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let complaint = sqlx::query_as::<_, Complaint>(&format!(
            r#"
            UPDATE complaints
            SET status = 'rejected', rejected_by = $2, rejected_at = NOW(),
                reject_reason = $3, assigned_to = NULL,
                last_updated_by = $2, updated_at = NOW()
            WHERE id = $1 AND status IN ('assigned', 'in_progress') AND assigned_to = $2
            RETURNING {COMPLAINT_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(technician_id)
        .bind(reason)
        .fetch_optional(pool)
        .await?;

        Ok(complaint)
    }

    /// COMPLETED -> CLOSED, by staff
    pub async fn close(
        pool: &PgPool,
        id: Uuid,
        closed_by: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let complaint = sqlx::query_as::<_, Complaint>(&format!(
            r#"
            UPDATE complaints
            SET status = 'closed', closed_by = $2, closed_at = NOW(),
                last_updated_by = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'completed'
            RETURNING {COMPLAINT_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(closed_by)
        .fetch_optional(pool)
        .await?;

        Ok(complaint)
    }

    /// REJECTED/CLOSED -> NEW
    ///
    /// Clears every assignment, completion, and rejection field so the
    /// complaint restarts its lifecycle. `expected_status` is the prior state
    /// the caller verified; the guard keeps a concurrent transition from
    /// being overwritten.
    pub async fn reopen(
        pool: &PgPool,
        id: Uuid,
        actor: Uuid,
        expected_status: ComplaintStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        let complaint = sqlx::query_as::<_, Complaint>(&format!(
            r#"
            UPDATE complaints
            SET status = 'new', assigned_to = NULL, assigned_by = NULL,
                completed_by = NULL, closed_by = NULL, rejected_by = NULL,
                reject_reason = '', resolution_note = '',
                assigned_at = NULL, started_at = NULL, completed_at = NULL,
                closed_at = NULL, rejected_at = NULL,
                last_updated_by = $2, updated_at = NOW()
            WHERE id = $1 AND status = $3
            RETURNING {COMPLAINT_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(actor)
        .bind(expected_status)
        .fetch_optional(pool)
        .await?;

        Ok(complaint)
    }

    /// Overrides the priority (staff only; role check in the handler)
    pub async fn set_priority(
        pool: &PgPool,
        id: Uuid,
        priority: Priority,
        actor: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let complaint = sqlx::query_as::<_, Complaint>(&format!(
            r#"
            UPDATE complaints
            SET priority = $2, last_updated_by = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {COMPLAINT_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(priority)
        .bind(actor)
        .fetch_optional(pool)
        .await?;

        Ok(complaint)
    }

    /// Hard-deletes a complaint, returning the deleted row for audit logging
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let complaint = sqlx::query_as::<_, Complaint>(&format!(
            "DELETE FROM complaints WHERE id = $1 RETURNING {COMPLAINT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(complaint)
    }
}
