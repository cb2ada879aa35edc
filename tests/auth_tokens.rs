mod common;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use serde_json::json;
use workboard::authz::Role;

use common::{error_kind, TestApp, PASSWORD};

#[tokio::test]
async fn refresh_token_mints_a_working_access_token() -> Result<()> {
    let t = TestApp::new().await?;
    t.seed_user("ada@example.com", Role::Member, None).await?;

    let login = json!({ "email": "ada@example.com", "password": PASSWORD });
    let (status, body) = t.request("POST", "/api/auth/login", None, Some(login)).await?;
    assert_eq!(status, StatusCode::OK);
    let refresh = body["refresh_token"].as_str().context("refresh token")?.to_string();

    let (status, body) = t.request("POST", "/api/auth/refresh", Some(&refresh), None).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    let access = body["token"].as_str().context("access token")?;

    let (status, body) = t.get("/api/auth/me", access).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "ada@example.com");
    Ok(())
}

#[tokio::test]
async fn token_kinds_are_not_interchangeable() -> Result<()> {
    let t = TestApp::new().await?;
    let (user_id, access) = t.seed_user("ada@example.com", Role::Member, None).await?;
    let refresh = t.refresh_token_for(user_id)?;

    let (status, body) = t.request("POST", "/api/auth/refresh", Some(&access), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_kind(&body), "unauthorized");

    let (status, _) = t.get("/api/auth/me", &refresh).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t.request("POST", "/api/auth/refresh", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn deactivated_account_cannot_refresh() -> Result<()> {
    let t = TestApp::new().await?;
    let (user_id, _) = t.seed_user("gone@example.com", Role::Member, None).await?;
    let refresh = t.refresh_token_for(user_id)?;
    sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?")
        .bind(user_id)
        .execute(&t.pool)
        .await?;

    let (status, body) = t.request("POST", "/api/auth/refresh", Some(&refresh), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_kind(&body), "account_deactivated");
    Ok(())
}

#[tokio::test]
async fn verify_echoes_the_subject() -> Result<()> {
    let t = TestApp::new().await?;
    let (user_id, token) = t.seed_user("ada@example.com", Role::Viewer, None).await?;

    let (status, body) = t.get("/api/auth/verify", &token).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["user_id"], user_id.to_string());

    let (status, _) = t.get("/api/auth/verify", "garbage").await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}
