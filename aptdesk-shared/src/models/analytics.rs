/// Aggregate queries backing the admin analytics endpoint
///
/// All aggregation happens in SQL; handlers just assemble the response.
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// Complaint counts by lifecycle state
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StatusOverview {
    pub total: i64,
    pub new: i64,
    pub assigned: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub closed: i64,
    pub rejected: i64,
}

/// Counts of urgent complaints
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PriorityOverview {
    pub critical: i64,
    pub high: i64,
}

/// Today's activity plus the average time to resolution
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TimeOverview {
    /// Complaints created since midnight (server time)
    pub created_today: i64,

    /// Complaints closed since midnight
    pub closed_today: i64,

    /// Mean `closed_at - created_at` over closed complaints, in milliseconds
    pub avg_resolution_ms: f64,
}

/// Completed workload of one technician
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TechnicianPerformance {
    pub technician_id: Uuid,
    pub name: String,
    pub email: String,
    pub completed_count: i64,

    /// Mean `completed_at - created_at` over their completed work, in
    /// milliseconds; 0 when nothing is completed yet
    pub avg_completion_ms: f64,
}

/// Open workload of one technician
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TechnicianBacklog {
    pub technician_id: Uuid,
    pub name: String,
    pub email: String,

    /// Complaints currently assigned or in progress
    pub pending_count: i64,
}

/// Counts complaints by status in a single pass
pub async fn status_overview(pool: &PgPool) -> Result<StatusOverview, sqlx::Error> {
    sqlx::query_as::<_, StatusOverview>(
        r#"
        SELECT COUNT(*) AS total,
               COUNT(*) FILTER (WHERE status = 'new') AS new,
               COUNT(*) FILTER (WHERE status = 'assigned') AS assigned,
               COUNT(*) FILTER (WHERE status = 'in_progress') AS in_progress,
               COUNT(*) FILTER (WHERE status = 'completed') AS completed,
               COUNT(*) FILTER (WHERE status = 'closed') AS closed,
               COUNT(*) FILTER (WHERE status = 'rejected') AS rejected
        FROM complaints
        "#,
    )
    .fetch_one(pool)
    .await
}

/// Counts critical and high priority complaints
pub async fn priority_overview(pool: &PgPool) -> Result<PriorityOverview, sqlx::Error> {
    sqlx::query_as::<_, PriorityOverview>(
        r#"
        SELECT COUNT(*) FILTER (WHERE priority = 'critical') AS critical,
               COUNT(*) FILTER (WHERE priority = 'high') AS high
        FROM complaints
        "#,
    )
    .fetch_one(pool)
    .await
}

/// Today's created/closed counts and the overall average resolution time
pub async fn time_overview(pool: &PgPool) -> Result<TimeOverview, sqlx::Error> {
    sqlx::query_as::<_, TimeOverview>(
        r#"
        SELECT COUNT(*) FILTER (WHERE created_at >= date_trunc('day', NOW())) AS created_today,
               COUNT(*) FILTER (WHERE closed_at >= date_trunc('day', NOW())) AS closed_today,
               COALESCE(
                   (SELECT AVG(EXTRACT(EPOCH FROM (closed_at - created_at)) * 1000.0)::FLOAT8
                    FROM complaints
                    WHERE status = 'closed' AND closed_at IS NOT NULL),
                   0
               ) AS avg_resolution_ms
        FROM complaints
        "#,
    )
    .fetch_one(pool)
    .await
}

/// Per-technician completed counts with average completion time, busiest first
///
/// Counts everything the technician ever completed, including complaints that
/// have since been closed; only a reopen (which clears `completed_by`) removes
/// work from the tally.
pub async fn technician_performance(
    pool: &PgPool,
) -> Result<Vec<TechnicianPerformance>, sqlx::Error> {
    sqlx::query_as::<_, TechnicianPerformance>(
        r#"
        SELECT u.id AS technician_id, u.name, u.email,
               COUNT(c.id) AS completed_count,
               COALESCE(
                   AVG(EXTRACT(EPOCH FROM (c.completed_at - c.created_at)) * 1000.0)::FLOAT8,
                   0
               ) AS avg_completion_ms
        FROM users u
        LEFT JOIN complaints c
               ON c.completed_by = u.id AND c.completed_at IS NOT NULL
        WHERE u.role = 'technician'
        GROUP BY u.id, u.name, u.email
        ORDER BY completed_count DESC, u.name ASC
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Per-technician open workload, busiest first
pub async fn technician_backlog(pool: &PgPool) -> Result<Vec<TechnicianBacklog>, sqlx::Error> {
    sqlx::query_as::<_, TechnicianBacklog>(
        r#"
        SELECT u.id AS technician_id, u.name, u.email,
               COUNT(c.id) AS pending_count
        FROM users u
        LEFT JOIN complaints c
               ON c.assigned_to = u.id AND c.status IN ('assigned', 'in_progress')
        WHERE u.role = 'technician'
        GROUP BY u.id, u.name, u.email
        ORDER BY pending_count DESC, u.name ASC
        "#,
    )
    .fetch_all(pool)
    .await
}
