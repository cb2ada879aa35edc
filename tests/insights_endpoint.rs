mod common;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use serde_json::json;
use workboard::authz::Role;

use common::{days, error_kind, today, TestApp};

#[tokio::test]
async fn insights_require_authentication() -> Result<()> {
    let t = TestApp::new().await?;

    let (status, body) = t.request("GET", "/api/insights", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_kind(&body), "unauthorized");
    Ok(())
}

#[tokio::test]
async fn empty_workspace_only_reports_summary() -> Result<()> {
    let t = TestApp::new().await?;
    let (_, token) = t.seed_user("viewer@example.com", Role::Viewer, None).await?;

    let (status, body) = t.get("/api/insights", &token).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["generated_at"].is_string());

    let insights = body["insights"].as_array().cloned().unwrap_or_default();
    assert!(insights.iter().all(|i| i["category"] == "info"), "{insights:?}");
    Ok(())
}

#[tokio::test]
async fn overdue_task_leads_with_a_critical_finding() -> Result<()> {
    let t = TestApp::new().await?;
    let (owner, token) = t.seed_user("pm@example.com", Role::Manager, None).await?;
    let assignee = t.seed_member("Dana", None, None).await?;

    let project = t
        .seed_project("P1", owner, "active", today() - days(30), today() + days(30))
        .await?;
    t.seed_task(project, "T1", "in-progress", "high", 40, today() - days(3), Some(assignee))
        .await?;

    let (status, body) = t.get("/api/insights", &token).await?;
    assert_eq!(status, StatusCode::OK);

    let first = &body["insights"][0];
    assert_eq!(first["category"], "critical");
    assert_eq!(first["code"], "overdue_tasks");
    let description = first["description"].as_str().unwrap_or_default();
    assert!(description.contains("\"T1\""), "{description}");
    assert!(description.contains("3 days"), "{description}");

    // Ordering is by category, so nothing critical appears after a warning.
    let categories: Vec<_> = body["insights"]
        .as_array()
        .map(|items| items.iter().filter_map(|i| i["category"].as_str()).collect())
        .unwrap_or_default();
    let rank = |c: &str| ["critical", "warning", "positive", "info"].iter().position(|x| *x == c);
    assert!(categories.windows(2).all(|w| rank(w[0]) <= rank(w[1])), "{categories:?}");
    Ok(())
}

#[tokio::test]
async fn resaving_a_task_unchanged_keeps_insights_stable() -> Result<()> {
    let t = TestApp::new().await?;
    let (_, token) = t.seed_user("pm@example.com", Role::Manager, None).await?;

    // Created through the API so stored project progress already matches its tasks.
    let body = json!({ "name": "Alpha", "start_date": today() - days(10), "end_date": today() + days(10) });
    let (status, project) = t.request("POST", "/api/projects", Some(&token), Some(body)).await?;
    assert_eq!(status, StatusCode::CREATED, "{project}");
    let project_id = project["id"].as_str().context("project id")?;

    let body = json!({
        "project_id": project_id,
        "name": "Draft",
        "start_date": today() - days(5),
        "end_date": today() + days(2),
        "priority": "high",
        "progress": 20,
    });
    let (status, task) = t.request("POST", "/api/tasks", Some(&token), Some(body)).await?;
    assert_eq!(status, StatusCode::CREATED, "{task}");
    let task_id = task["id"].as_str().context("task id")?;

    let (_, before) = t.get("/api/insights", &token).await?;

    let same = json!({
        "name": task["name"],
        "description": task["description"],
        "start_date": task["start_date"],
        "end_date": task["end_date"],
        "status": task["status"],
        "priority": task["priority"],
        "progress": task["progress"],
        "assignee_id": task["assignee_id"],
    });
    let (status, _) = t.request("PUT", &format!("/api/tasks/{task_id}"), Some(&token), Some(same)).await?;
    assert_eq!(status, StatusCode::OK);

    let (_, after) = t.get("/api/insights", &token).await?;
    assert!(before["insights"].as_array().is_some_and(|items| !items.is_empty()));
    assert_eq!(before["insights"], after["insights"]);
    Ok(())
}
