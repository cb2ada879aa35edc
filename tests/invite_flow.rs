mod common;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use serde_json::json;
use workboard::authz::Role;

use common::{error_kind, send, TestApp};

async fn create_invite(t: &TestApp, token: &str, email: &str) -> Result<(String, String)> {
    let body = json!({ "email": email, "role": "member", "expires_in_days": 3 });
    let (status, body) = t.request("POST", "/api/invites", Some(token), Some(body)).await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let invite_token = body["token"].as_str().context("missing token")?.to_string();
    let invite_id = body["invite"]["id"].as_str().context("missing id")?.to_string();
    Ok((invite_id, invite_token))
}

#[tokio::test]
async fn accept_creates_account_once() -> Result<()> {
    let t = TestApp::new().await?;
    let (_, admin) = t.seed_user("root@example.com", Role::Admin, None).await?;
    let (_, token) = create_invite(&t, &admin, "New.Hire@example.com").await?;

    let (status, body) = t.request("GET", &format!("/api/invites/validate/{token}"), None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["email"], "new.hire@example.com");
    assert_eq!(body["password_required"], true);

    let accept = json!({ "name": "New Hire", "password": "password123" });
    let (status, body) = t
        .request("POST", &format!("/api/invites/accept/{token}"), None, Some(accept.clone()))
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["user"]["role"], "member");

    let (status, body) = t
        .request("POST", &format!("/api/invites/accept/{token}"), None, Some(accept))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_kind(&body), "conflict");

    let (_, body) = t.request("GET", &format!("/api/invites/validate/{token}"), None, None).await?;
    assert_eq!(body["valid"], false);

    // The invitee also gets a team member profile.
    let members: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM team_members WHERE email = 'new.hire@example.com' AND user_id IS NOT NULL",
    )
    .fetch_one(&t.pool)
    .await?;
    assert_eq!(members, 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_accepts_yield_exactly_one_account() -> Result<()> {
    let t = TestApp::new().await?;
    let (_, admin) = t.seed_user("root@example.com", Role::Admin, None).await?;
    let (_, token) = create_invite(&t, &admin, "race@example.com").await?;

    let uri = format!("/api/invites/accept/{token}");
    let body = json!({ "name": "Racer", "password": "password123" });
    let (first, second) = tokio::join!(
        send(&t.app, "POST", &uri, None, Some(body.clone())),
        send(&t.app, "POST", &uri, None, Some(body.clone())),
    );
    let statuses = [first?.0, second?.0];

    let created = statuses.iter().filter(|s| **s == StatusCode::CREATED).count();
    let conflicts = statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count();
    assert_eq!((created, conflicts), (1, 1), "statuses: {statuses:?}");

    let users: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = 'race@example.com'")
        .fetch_one(&t.pool)
        .await?;
    assert_eq!(users, 1);
    Ok(())
}

#[tokio::test]
async fn revoked_and_unknown_tokens() -> Result<()> {
    let t = TestApp::new().await?;
    let (_, admin) = t.seed_user("root@example.com", Role::Admin, None).await?;
    let (invite_id, token) = create_invite(&t, &admin, "later@example.com").await?;

    let (status, _) = t.request("DELETE", &format!("/api/invites/{invite_id}"), Some(&admin), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = t.request("DELETE", &format!("/api/invites/{invite_id}"), Some(&admin), None).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let accept = json!({ "password": "password123" });
    let (status, _) = t
        .request("POST", &format!("/api/invites/accept/{token}"), None, Some(accept.clone()))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = t
        .request("POST", "/api/invites/accept/does-not-exist", None, Some(accept))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn invite_rules_by_role() -> Result<()> {
    let t = TestApp::new().await?;
    let d1 = t.seed_department("D1").await?;
    let d2 = t.seed_department("D2").await?;
    let (_, member) = t.seed_user("m@example.com", Role::Member, None).await?;
    let (_, manager) = t.seed_user("pm@example.com", Role::Manager, None).await?;
    let (_, dept_admin) = t.seed_user("da@example.com", Role::DepartmentAdmin, Some(d1)).await?;

    let body = json!({ "email": "x@example.com", "role": "member" });
    let (status, _) = t.request("POST", "/api/invites", Some(&member), Some(body)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let body = json!({ "email": "x@example.com", "role": "admin" });
    let (status, body) = t.request("POST", "/api/invites", Some(&manager), Some(body)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_kind(&body), "validation_failed");

    let body = json!({ "email": "x@example.com", "role": "member", "expires_in_days": 31 });
    let (status, _) = t.request("POST", "/api/invites", Some(&manager), Some(body)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = json!({ "email": "y@example.com", "role": "viewer", "department_id": d2 });
    let (status, body) = t.request("POST", "/api/invites", Some(&dept_admin), Some(body)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_kind(&body), "access_denied");

    let body = json!({ "email": "y@example.com", "role": "viewer" });
    let (status, body) = t.request("POST", "/api/invites", Some(&dept_admin), Some(body)).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["invite"]["department_id"], d1.to_string());

    // The manager created nothing that succeeded, so sees nothing.
    let (_, listed) = t.get("/api/invites", &manager).await?;
    assert_eq!(listed.as_array().map(Vec::len), Some(0));
    let (_, listed) = t.get("/api/invites", &dept_admin).await?;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn invite_without_department_inherits_the_creator_s() -> Result<()> {
    let t = TestApp::new().await?;
    let d1 = t.seed_department("D1").await?;
    let (_, manager) = t.seed_user("pm@example.com", Role::Manager, Some(d1)).await?;

    let body = json!({ "email": "recruit@example.com", "role": "member" });
    let (status, body) = t.request("POST", "/api/invites", Some(&manager), Some(body)).await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["invite"]["department_id"], d1.to_string());
    Ok(())
}
