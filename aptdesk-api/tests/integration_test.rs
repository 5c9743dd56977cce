/// Integration tests for the AptDesk API
///
/// Drive the full router against a real database:
/// - Authentication and token refresh
/// - Complaint lifecycle and role-gated transitions
/// - Role-filtered listings
/// - Notifications, audit log, user management, analytics
///
/// Requires DATABASE_URL and JWT_SECRET in the environment (or .env).
mod common;

use aptdesk_shared::models::user::UserRole;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::TestContext;
use serde_json::{json, Value};
use tower::Service as _;
use uuid::Uuid;

/// Builds a request with optional bearer auth and JSON body
fn build_request(
    method: Method,
    uri: &str,
    auth: Option<String>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(auth) = auth {
        builder = builder.header("authorization", auth);
    }

    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Sends a request through the router and parses the JSON response
async fn send(ctx: &TestContext, request: Request<Body>) -> (StatusCode, Value) {
    let response = ctx.app.clone().call(request).await.unwrap();
    let status = response.status();

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, body)
}

async fn put_status(
    ctx: &TestContext,
    complaint_id: &str,
    auth: String,
    body: Value,
) -> (StatusCode, Value) {
    send(
        ctx,
        build_request(
            Method::PUT,
            &format!("/api/complaints/status/{}", complaint_id),
            Some(auth),
            Some(body),
        ),
    )
    .await
}

#[tokio::test]
async fn test_health_check() {
    let ctx = TestContext::new().await.unwrap();

    let (status, body) = send(&ctx, build_request(Method::GET, "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_requires_authentication() {
    let ctx = TestContext::new().await.unwrap();

    let (status, _) = send(
        &ctx,
        build_request(Method::GET, "/api/complaints", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &ctx,
        build_request(
            Method::POST,
            "/api/complaints",
            None,
            Some(json!({ "title": "No auth", "description": "Should fail" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_login_and_refresh() {
    let ctx = TestContext::new().await.unwrap();

    let (status, body) = send(
        &ctx,
        build_request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": ctx.tenant.email, "password": common::TEST_PASSWORD })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].is_string());
    assert!(body["refresh_token"].is_string());
    assert_eq!(body["user"]["role"], "tenant");
    assert_eq!(body["user"]["email"], ctx.tenant.email.as_str());

    // Refresh token yields a fresh access token
    let refresh_token = body["refresh_token"].as_str().unwrap().to_string();
    let (status, body) = send(
        &ctx,
        build_request(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh_token })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].is_string());

    // Wrong password is 401 without revealing which part was wrong
    let (status, body) = send(
        &ctx,
        build_request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": ctx.tenant.email, "password": "WrongPass1!" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_login_inactive_account_refused() {
    let ctx = TestContext::new().await.unwrap();

    ctx.deactivate_user(ctx.tenant.id).await.unwrap();

    let (status, _) = send(
        &ctx,
        build_request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": ctx.tenant.email, "password": common::TEST_PASSWORD })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_tenant_files_complaint() {
    let ctx = TestContext::new().await.unwrap();

    let (status, body) = send(
        &ctx,
        build_request(
            Method::POST,
            "/api/complaints",
            Some(ctx.auth_header(&ctx.tenant)),
            Some(json!({
                "title": "Gas leak in the kitchen",
                "description": "Strong smell near the stove since this morning",
                "category": "Plumbing"
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "NEW");
    assert_eq!(body["priority"], "critical");
    assert_eq!(body["category"], "plumbing");

    let token = body["token"].as_str().unwrap();
    let parts: Vec<&str> = token.split('-').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], "APT");
    assert_eq!(parts[1].len(), 4);
    assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
    assert!(parts[2].len() >= 4);
    assert!(parts[2].chars().all(|c| c.is_ascii_digit()));

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_only_tenants_file_complaints() {
    let ctx = TestContext::new().await.unwrap();

    let (status, _) = send(
        &ctx,
        build_request(
            Method::POST,
            "/api/complaints",
            Some(ctx.auth_header(&ctx.manager)),
            Some(json!({ "title": "Manager filed", "description": "Should be refused" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_complaint_validation() {
    let ctx = TestContext::new().await.unwrap();
    let auth = ctx.auth_header(&ctx.tenant);

    // Title too short
    let (status, _) = send(
        &ctx,
        build_request(
            Method::POST,
            "/api/complaints",
            Some(auth.clone()),
            Some(json!({ "title": "ab", "description": "Long enough description" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Bad image scheme
    let (status, body) = send(
        &ctx,
        build_request(
            Method::POST,
            "/api/complaints",
            Some(auth),
            Some(json!({
                "title": "Broken door lock",
                "description": "Front door lock is jammed",
                "image": "ftp://example.com/photo.png"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_assignment_rules() {
    let ctx = TestContext::new().await.unwrap();
    let complaint = ctx.create_test_complaint("Leaking tap").await.unwrap();
    let uri = format!("/api/complaints/assign/{}", complaint.id);

    // Tenants cannot assign
    let (status, _) = send(
        &ctx,
        build_request(
            Method::PUT,
            &uri,
            Some(ctx.auth_header(&ctx.tenant)),
            Some(json!({ "technician_id": ctx.technician.id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Assignee must be a technician
    let (status, _) = send(
        &ctx,
        build_request(
            Method::PUT,
            &uri,
            Some(ctx.auth_header(&ctx.manager)),
            Some(json!({ "technician_id": ctx.tenant.id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Proper assignment works
    let (status, body) = send(
        &ctx,
        build_request(
            Method::PUT,
            &uri,
            Some(ctx.auth_header(&ctx.manager)),
            Some(json!({ "technician_id": ctx.technician.id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ASSIGNED");
    assert_eq!(body["assigned_to"], ctx.technician.id.to_string());

    // Already-assigned complaints cannot be assigned again
    let (status, _) = send(
        &ctx,
        build_request(
            Method::PUT,
            &uri,
            Some(ctx.auth_header(&ctx.manager)),
            Some(json!({ "technician_id": ctx.technician.id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_assign_inactive_technician_rejected() {
    let ctx = TestContext::new().await.unwrap();
    let complaint = ctx.create_test_complaint("Flickering light").await.unwrap();

    ctx.deactivate_user(ctx.technician.id).await.unwrap();

    let (status, _) = send(
        &ctx,
        build_request(
            Method::PUT,
            &format!("/api/complaints/assign/{}", complaint.id),
            Some(ctx.auth_header(&ctx.manager)),
            Some(json!({ "technician_id": ctx.technician.id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_full_lifecycle() {
    let ctx = TestContext::new().await.unwrap();
    let complaint = ctx.create_test_complaint("Water heater broken").await.unwrap();
    let id = complaint.id.to_string();

    // Closing before completion is refused
    let (status, _) = put_status(
        &ctx,
        &id,
        ctx.auth_header(&ctx.manager),
        json!({ "status": "CLOSED" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Assign
    let (status, _) = send(
        &ctx,
        build_request(
            Method::PUT,
            &format!("/api/complaints/assign/{}", id),
            Some(ctx.auth_header(&ctx.manager)),
            Some(json!({ "technician_id": ctx.technician.id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Technician starts work
    let (status, body) = put_status(
        &ctx,
        &id,
        ctx.auth_header(&ctx.technician),
        json!({ "status": "IN_PROGRESS" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "IN_PROGRESS");
    assert!(body["started_at"].is_string());

    // Technician completes with a note
    let (status, body) = put_status(
        &ctx,
        &id,
        ctx.auth_header(&ctx.technician),
        json!({ "status": "COMPLETED", "resolution_note": "Replaced heating element" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "COMPLETED");
    assert_eq!(body["resolution_note"], "Replaced heating element");

    // Technicians cannot close
    let (status, _) = put_status(
        &ctx,
        &id,
        ctx.auth_header(&ctx.technician),
        json!({ "status": "CLOSED" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Manager closes
    let (status, body) = put_status(
        &ctx,
        &id,
        ctx.auth_header(&ctx.manager),
        json!({ "status": "CLOSED" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CLOSED");
    assert!(body["closed_at"].is_string());

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_unassigned_technician_cannot_transition() {
    let ctx = TestContext::new().await.unwrap();
    let complaint = ctx.create_test_complaint("Blocked drain").await.unwrap();
    let id = complaint.id.to_string();

    // Create a second technician through the API
    let (status, body) = send(
        &ctx,
        build_request(
            Method::POST,
            "/api/auth/create-user",
            Some(ctx.auth_header(&ctx.admin)),
            Some(json!({
                "name": "Other Technician",
                "email": format!("other-tech-{}@example.com", Uuid::new_v4()),
                "password": common::TEST_PASSWORD,
                "role": "technician"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let other_tech_id: Uuid = body["id"].as_str().unwrap().parse().unwrap();

    // Assign to the first technician
    let (status, _) = send(
        &ctx,
        build_request(
            Method::PUT,
            &format!("/api/complaints/assign/{}", id),
            Some(ctx.auth_header(&ctx.manager)),
            Some(json!({ "technician_id": ctx.technician.id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The other technician cannot start it
    let (status, _) = put_status(
        &ctx,
        &id,
        ctx.bearer_for(other_tech_id, UserRole::Technician),
        json!({ "status": "IN_PROGRESS" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(other_tech_id)
        .execute(&ctx.db)
        .await
        .unwrap();
    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_reopen_rules() {
    let ctx = TestContext::new().await.unwrap();
    let complaint = ctx.create_test_complaint("Cracked window").await.unwrap();
    let id = complaint.id.to_string();

    // Assign, then have the technician reject
    let (status, _) = send(
        &ctx,
        build_request(
            Method::PUT,
            &format!("/api/complaints/assign/{}", id),
            Some(ctx.auth_header(&ctx.manager)),
            Some(json!({ "technician_id": ctx.technician.id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = put_status(
        &ctx,
        &id,
        ctx.auth_header(&ctx.technician),
        json!({ "status": "REJECTED", "reason": "Needs an external contractor" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "REJECTED");
    assert_eq!(body["reject_reason"], "Needs an external contractor");
    assert!(body["assigned_to"].is_null());

    // The owning tenant reopens; rejection fields are cleared
    let (status, body) = put_status(
        &ctx,
        &id,
        ctx.auth_header(&ctx.tenant),
        json!({ "status": "NEW" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "NEW");
    assert_eq!(body["reject_reason"], "");
    assert!(body["assigned_to"].is_null());
    assert!(body["rejected_at"].is_null());

    // Run it to CLOSED
    let (status, _) = send(
        &ctx,
        build_request(
            Method::PUT,
            &format!("/api/complaints/assign/{}", id),
            Some(ctx.auth_header(&ctx.manager)),
            Some(json!({ "technician_id": ctx.technician.id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    put_status(&ctx, &id, ctx.auth_header(&ctx.technician), json!({ "status": "IN_PROGRESS" })).await;
    put_status(&ctx, &id, ctx.auth_header(&ctx.technician), json!({ "status": "COMPLETED" })).await;
    let (status, _) = put_status(
        &ctx,
        &id,
        ctx.auth_header(&ctx.manager),
        json!({ "status": "CLOSED" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Tenants cannot reopen closed complaints
    let (status, _) = put_status(
        &ctx,
        &id,
        ctx.auth_header(&ctx.tenant),
        json!({ "status": "NEW" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Managers can
    let (status, body) = put_status(
        &ctx,
        &id,
        ctx.auth_header(&ctx.manager),
        json!({ "status": "NEW" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "NEW");
    assert!(body["closed_at"].is_null());
    assert_eq!(body["resolution_note"], "");

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_role_filtered_listing() {
    let ctx = TestContext::new().await.unwrap();
    let mine = ctx.create_test_complaint("Noisy neighbors").await.unwrap();

    // Tenant sees their own complaint, with their name joined in
    let (status, body) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/complaints",
            Some(ctx.auth_header(&ctx.tenant)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let listed = body.as_array().unwrap();
    assert!(listed.iter().any(|c| c["token"] == mine.token.as_str()));
    assert!(listed
        .iter()
        .all(|c| c["created_by"] == ctx.tenant.id.to_string()));
    assert!(listed
        .iter()
        .any(|c| c["created_by_name"] == ctx.tenant.name.as_str()));

    // Technician sees nothing until assigned
    let (status, body) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/complaints",
            Some(ctx.auth_header(&ctx.technician)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    // Manager sees it too
    let (status, body) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/complaints",
            Some(ctx.auth_header(&ctx.manager)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c["token"] == mine.token.as_str()));

    // Out-of-range limit is refused
    let (status, _) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/complaints?limit=1000",
            Some(ctx.auth_header(&ctx.manager)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_closed_complaints_hidden_by_default() {
    let ctx = TestContext::new().await.unwrap();
    let complaint = ctx.create_test_complaint("Broken mailbox").await.unwrap();
    let id = complaint.id.to_string();

    // Drive to CLOSED
    send(
        &ctx,
        build_request(
            Method::PUT,
            &format!("/api/complaints/assign/{}", id),
            Some(ctx.auth_header(&ctx.manager)),
            Some(json!({ "technician_id": ctx.technician.id })),
        ),
    )
    .await;
    put_status(&ctx, &id, ctx.auth_header(&ctx.technician), json!({ "status": "IN_PROGRESS" })).await;
    put_status(&ctx, &id, ctx.auth_header(&ctx.technician), json!({ "status": "COMPLETED" })).await;
    let (status, _) = put_status(
        &ctx,
        &id,
        ctx.auth_header(&ctx.manager),
        json!({ "status": "CLOSED" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Hidden by default
    let (_, body) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/complaints",
            Some(ctx.auth_header(&ctx.tenant)),
            None,
        ),
    )
    .await;
    assert!(!body
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c["token"] == complaint.token.as_str()));

    // Visible with include_closed
    let (_, body) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/complaints?include_closed=true",
            Some(ctx.auth_header(&ctx.tenant)),
            None,
        ),
    )
    .await;
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c["token"] == complaint.token.as_str()));

    // And when asked for directly
    let (_, body) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/complaints?status=CLOSED",
            Some(ctx.auth_header(&ctx.tenant)),
            None,
        ),
    )
    .await;
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c["token"] == complaint.token.as_str()));

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_exclude_status_parameter() {
    let ctx = TestContext::new().await.unwrap();
    let open = ctx.create_test_complaint("Dripping faucet").await.unwrap();
    let closed = ctx.create_test_complaint("Torn carpet").await.unwrap();
    let closed_id = closed.id.to_string();

    // Drive the second complaint to CLOSED
    send(
        &ctx,
        build_request(
            Method::PUT,
            &format!("/api/complaints/assign/{}", closed_id),
            Some(ctx.auth_header(&ctx.manager)),
            Some(json!({ "technician_id": ctx.technician.id })),
        ),
    )
    .await;
    put_status(&ctx, &closed_id, ctx.auth_header(&ctx.technician), json!({ "status": "IN_PROGRESS" })).await;
    put_status(&ctx, &closed_id, ctx.auth_header(&ctx.technician), json!({ "status": "COMPLETED" })).await;
    let (status, _) = put_status(
        &ctx,
        &closed_id,
        ctx.auth_header(&ctx.manager),
        json!({ "status": "CLOSED" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // exclude_status=CLOSED drops the closed complaint, keeps the open one
    let (status, body) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/complaints?exclude_status=CLOSED",
            Some(ctx.auth_header(&ctx.tenant)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let listed = body.as_array().unwrap();
    assert!(listed.iter().any(|c| c["token"] == open.token.as_str()));
    assert!(!listed.iter().any(|c| c["token"] == closed.token.as_str()));

    // Asking for closed complaints while excluding them yields nothing
    let (status, body) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/complaints?status=CLOSED&exclude_status=CLOSED",
            Some(ctx.auth_header(&ctx.tenant)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    // Only CLOSED can be excluded
    let (status, body) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/complaints?exclude_status=NEW",
            Some(ctx.auth_header(&ctx.tenant)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_unknown_enum_values_are_bad_requests() {
    let ctx = TestContext::new().await.unwrap();
    let complaint = ctx.create_test_complaint("Squeaky hinge").await.unwrap();

    // Unknown priority value in the body
    let (status, body) = send(
        &ctx,
        build_request(
            Method::PUT,
            &format!("/api/complaints/priority/{}", complaint.id),
            Some(ctx.auth_header(&ctx.manager)),
            Some(json!({ "priority": "urgent" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    // Unknown status value in the body
    let (status, body) = put_status(
        &ctx,
        &complaint.id.to_string(),
        ctx.auth_header(&ctx.manager),
        json!({ "status": "FROZEN" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_tokens_unique_under_concurrent_creation() {
    let ctx = TestContext::new().await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let db = ctx.db.clone();
        handles.push(tokio::spawn(async move {
            aptdesk_shared::models::complaint::Complaint::next_token(&db)
                .await
                .unwrap()
        }));
    }

    let mut seen = std::collections::HashSet::new();
    for handle in handles {
        let token = handle.await.unwrap();
        assert!(seen.insert(token.clone()), "duplicate token {}", token);
    }

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_tokens_increase_monotonically() {
    let ctx = TestContext::new().await.unwrap();

    let first = ctx.create_test_complaint("First issue").await.unwrap();
    let second = ctx.create_test_complaint("Second issue").await.unwrap();

    let seq = |token: &str| -> u32 {
        token
            .rsplit('-')
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap()
    };

    assert!(seq(&second.token) > seq(&first.token));

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_priority_override_and_delete() {
    let ctx = TestContext::new().await.unwrap();
    let complaint = ctx.create_test_complaint("Peeling paint").await.unwrap();
    let uri = format!("/api/complaints/priority/{}", complaint.id);

    // Tenants cannot change priority
    let (status, _) = send(
        &ctx,
        build_request(
            Method::PUT,
            &uri,
            Some(ctx.auth_header(&ctx.tenant)),
            Some(json!({ "priority": "high" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Managers can
    let (status, body) = send(
        &ctx,
        build_request(
            Method::PUT,
            &uri,
            Some(ctx.auth_header(&ctx.manager)),
            Some(json!({ "priority": "high" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["priority"], "high");

    // Only admins can delete
    let delete_uri = format!("/api/complaints/{}", complaint.id);
    let (status, _) = send(
        &ctx,
        build_request(
            Method::DELETE,
            &delete_uri,
            Some(ctx.auth_header(&ctx.manager)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &ctx,
        build_request(
            Method::DELETE,
            &delete_uri,
            Some(ctx.auth_header(&ctx.admin)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Gone now
    let (status, _) = send(
        &ctx,
        build_request(
            Method::DELETE,
            &delete_uri,
            Some(ctx.auth_header(&ctx.admin)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_create_user_rules() {
    let ctx = TestContext::new().await.unwrap();
    let email = format!("new-user-{}@example.com", Uuid::new_v4());

    // Non-admins are refused
    let (status, _) = send(
        &ctx,
        build_request(
            Method::POST,
            "/api/auth/create-user",
            Some(ctx.auth_header(&ctx.manager)),
            Some(json!({
                "name": "Someone",
                "email": email,
                "password": common::TEST_PASSWORD,
                "role": "tenant"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Admin role cannot be handed out
    let (status, _) = send(
        &ctx,
        build_request(
            Method::POST,
            "/api/auth/create-user",
            Some(ctx.auth_header(&ctx.admin)),
            Some(json!({
                "name": "Sneaky",
                "email": email,
                "password": common::TEST_PASSWORD,
                "role": "admin"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Weak passwords are refused
    let (status, _) = send(
        &ctx,
        build_request(
            Method::POST,
            "/api/auth/create-user",
            Some(ctx.auth_header(&ctx.admin)),
            Some(json!({
                "name": "Weak",
                "email": email,
                "password": "password",
                "role": "tenant"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Success; the hash never appears in the response
    let (status, body) = send(
        &ctx,
        build_request(
            Method::POST,
            "/api/auth/create-user",
            Some(ctx.auth_header(&ctx.admin)),
            Some(json!({
                "name": "New Tenant",
                "email": email,
                "password": common::TEST_PASSWORD,
                "role": "tenant"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email"], email.as_str());
    assert!(body.get("password_hash").is_none());
    let new_user_id: Uuid = body["id"].as_str().unwrap().parse().unwrap();

    // Duplicate email is a conflict
    let (status, body) = send(
        &ctx,
        build_request(
            Method::POST,
            "/api/auth/create-user",
            Some(ctx.auth_header(&ctx.admin)),
            Some(json!({
                "name": "Duplicate",
                "email": email,
                "password": common::TEST_PASSWORD,
                "role": "tenant"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(new_user_id)
        .execute(&ctx.db)
        .await
        .unwrap();
    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_technician_listing_excludes_inactive() {
    let ctx = TestContext::new().await.unwrap();

    let (status, body) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/auth/technicians",
            Some(ctx.auth_header(&ctx.manager)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .any(|u| u["id"] == ctx.technician.id.to_string()));

    ctx.deactivate_user(ctx.technician.id).await.unwrap();

    let (_, body) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/auth/technicians",
            Some(ctx.auth_header(&ctx.manager)),
            None,
        ),
    )
    .await;
    assert!(!body
        .as_array()
        .unwrap()
        .iter()
        .any(|u| u["id"] == ctx.technician.id.to_string()));

    // Listing all users is admin only
    let (status, _) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/auth/users",
            Some(ctx.auth_header(&ctx.manager)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/auth/users",
            Some(ctx.auth_header(&ctx.admin)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_notification_flow() {
    let ctx = TestContext::new().await.unwrap();
    let complaint = ctx.create_test_complaint("Elevator noise").await.unwrap();

    // Assignment notifies the technician
    let (status, _) = send(
        &ctx,
        build_request(
            Method::PUT,
            &format!("/api/complaints/assign/{}", complaint.id),
            Some(ctx.auth_header(&ctx.manager)),
            Some(json!({ "technician_id": ctx.technician.id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/notifications",
            Some(ctx.auth_header(&ctx.technician)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let notification = body
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n["related_token"] == complaint.token.as_str())
        .cloned()
        .expect("technician should be notified about the assignment");
    assert_eq!(notification["kind"], "complaint_assigned");
    assert_eq!(notification["is_read"], false);
    let notification_id = notification["id"].as_str().unwrap().to_string();

    // Someone else cannot mark it read
    let (status, _) = send(
        &ctx,
        build_request(
            Method::PUT,
            &format!("/api/notifications/{}/read", notification_id),
            Some(ctx.auth_header(&ctx.tenant)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The recipient can
    let (status, body) = send(
        &ctx,
        build_request(
            Method::PUT,
            &format!("/api/notifications/{}/read", notification_id),
            Some(ctx.auth_header(&ctx.technician)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_read"], true);
    assert!(body["read_at"].is_string());

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_audit_endpoints() {
    let ctx = TestContext::new().await.unwrap();
    let complaint = ctx.create_test_complaint("Garage door stuck").await.unwrap();

    // Generate some history through the API
    let (status, _) = send(
        &ctx,
        build_request(
            Method::PUT,
            &format!("/api/complaints/assign/{}", complaint.id),
            Some(ctx.auth_header(&ctx.manager)),
            Some(json!({ "technician_id": ctx.technician.id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Tenants cannot read the global log
    let (status, _) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/audit",
            Some(ctx.auth_header(&ctx.tenant)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Staff can
    let (status, body) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/audit",
            Some(ctx.auth_header(&ctx.manager)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .any(|l| l["related_token"] == complaint.token.as_str()));

    // Filter by action
    let (status, body) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/audit/action/complaint_assigned",
            Some(ctx.auth_header(&ctx.admin)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .all(|l| l["action"] == "complaint_assigned"));

    // Unknown action name is a bad request
    let (status, _) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/audit/action/made_coffee",
            Some(ctx.auth_header(&ctx.admin)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The owner may read their complaint's history
    let (status, body) = send(
        &ctx,
        build_request(
            Method::GET,
            &format!("/api/audit/complaint/{}", complaint.id),
            Some(ctx.auth_header(&ctx.tenant)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.as_array().unwrap().is_empty());

    // Filter by performer
    let (status, body) = send(
        &ctx,
        build_request(
            Method::GET,
            &format!("/api/audit/user/{}", ctx.manager.id),
            Some(ctx.auth_header(&ctx.admin)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .all(|l| l["performed_by"] == ctx.manager.id.to_string()));

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_analytics_admin_only() {
    let ctx = TestContext::new().await.unwrap();
    ctx.create_test_complaint("Stats fodder").await.unwrap();

    let (status, _) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/admin/analytics",
            Some(ctx.auth_header(&ctx.manager)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &ctx,
        build_request(
            Method::GET,
            "/api/admin/analytics",
            Some(ctx.auth_header(&ctx.admin)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["overview"]["total"].as_i64().unwrap() >= 1);
    assert!(body["overview"]["new"].as_i64().unwrap() >= 1);
    assert!(body["time"]["created_today"].as_i64().unwrap() >= 1);
    assert!(body["technician_count"].as_i64().unwrap() >= 1);
    assert!(body["technician_backlog"].is_array());

    ctx.cleanup().await.unwrap();
}
