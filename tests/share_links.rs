mod common;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use serde_json::json;
use workboard::authz::Role;

use common::{days, today, TestApp};

#[tokio::test]
async fn share_link_lifecycle() -> Result<()> {
    let t = TestApp::new().await?;
    let (owner, token) = t.seed_user("pm@example.com", Role::Manager, None).await?;
    let project = t.seed_project("Public", owner, "active", today(), today() + days(20)).await?;
    t.seed_task(project, "Visible", "todo", "low", 0, today() + days(4), None).await?;

    let (status, body) = t
        .request(
            "POST",
            &format!("/api/projects/{project}/share-links"),
            Some(&token),
            Some(json!({ "expires_in_days": 7 })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let share_token = body["token"].as_str().context("token")?.to_string();
    let link_id = body["link"]["id"].as_str().context("link id")?.to_string();

    // Anyone holding the token may view, no bearer token needed.
    let (status, view) = t.request("GET", &format!("/api/share/{share_token}"), None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["project"]["name"], "Public");
    assert_eq!(view["tasks"].as_array().map(Vec::len), Some(1));

    let (status, _) = t.request("DELETE", &format!("/api/share-links/{link_id}"), Some(&token), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = t.request("GET", &format!("/api/share/{share_token}"), None, None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t.request("DELETE", &format!("/api/share-links/{link_id}"), Some(&token), None).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn share_link_expiry_is_bounded() -> Result<()> {
    let t = TestApp::new().await?;
    let (owner, token) = t.seed_user("pm@example.com", Role::Manager, None).await?;
    let project = t.seed_project("Bounded", owner, "active", today(), today() + days(20)).await?;

    for days in [0, 31] {
        let (status, _) = t
            .request(
                "POST",
                &format!("/api/projects/{project}/share-links"),
                Some(&token),
                Some(json!({ "expires_in_days": days })),
            )
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{days}");
    }

    let (status, _) = t.get("/api/share/not-a-real-token", &token).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn only_creator_or_admin_may_revoke() -> Result<()> {
    let t = TestApp::new().await?;
    let (owner, token) = t.seed_user("pm@example.com", Role::Manager, None).await?;
    let (_, other) = t.seed_user("other@example.com", Role::Manager, None).await?;
    let project = t.seed_project("Guarded", owner, "active", today(), today() + days(20)).await?;

    let (_, body) = t
        .request("POST", &format!("/api/projects/{project}/share-links"), Some(&token), None)
        .await?;
    let link_id = body["link"]["id"].as_str().context("link id")?.to_string();

    let (status, _) = t.request("DELETE", &format!("/api/share-links/{link_id}"), Some(&other), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}
