/// Admin analytics endpoint
///
/// # Endpoint
///
/// ```text
/// GET /api/admin/analytics
/// ```
///
/// Aggregates complaint counts by status and priority, today's activity,
/// average resolution time, and per-technician workload.
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use aptdesk_shared::{
    auth::middleware::AuthContext,
    models::{
        analytics::{
            self, PriorityOverview, StatusOverview, TechnicianBacklog, TechnicianPerformance,
            TimeOverview,
        },
        user::{User, UserRole},
    },
};
use axum::{extract::State, Extension, Json};
use serde::Serialize;

/// Analytics response
#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub overview: StatusOverview,
    pub priority: PriorityOverview,
    pub time: TimeOverview,
    pub technician_count: i64,
    pub technician_performance: Vec<TechnicianPerformance>,
    pub technician_backlog: Vec<TechnicianBacklog>,
}

/// GET /api/admin/analytics
pub async fn analytics(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<AnalyticsResponse>> {
    if auth.role != UserRole::Admin {
        return Err(ApiError::Forbidden(
            "Only admins can view analytics".to_string(),
        ));
    }

    let overview = analytics::status_overview(&state.db).await?;
    let priority = analytics::priority_overview(&state.db).await?;
    let time = analytics::time_overview(&state.db).await?;
    let technician_count = User::count_by_role(&state.db, UserRole::Technician).await?;
    let technician_performance = analytics::technician_performance(&state.db).await?;
    let technician_backlog = analytics::technician_backlog(&state.db).await?;

    Ok(Json(AnalyticsResponse {
        overview,
        priority,
        time,
        technician_count,
        technician_performance,
        technician_backlog,
    }))
}
