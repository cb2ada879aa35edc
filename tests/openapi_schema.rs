use serde_json::Value;

#[test]
fn openapi_documents_task_fields_and_auth() -> anyhow::Result<()> {
    // Build the OpenAPI document the same way the server does
    let doc = workboard::docs::build_openapi(8000);
    let v = serde_json::to_value(&doc)?;

    let props = v
        .pointer("/components/schemas/Task/properties")
        .and_then(Value::as_object)
        .expect("components.schemas.Task.properties must exist");

    for k in ["start_date", "end_date", "status", "priority", "progress", "assignee_id"] {
        assert!(props.contains_key(k), "OpenAPI Task schema missing '{}'", k);
    }

    assert!(v.pointer("/components/securitySchemes/bearerAuth").is_some());
    Ok(())
}

#[test]
fn openapi_lists_every_resource() -> anyhow::Result<()> {
    let v = serde_json::to_value(workboard::docs::build_openapi(8000))?;
    let paths = v.get("paths").and_then(Value::as_object).expect("paths must exist");

    for p in [
        "/api/insights",
        "/api/projects/{project_id}",
        "/api/tasks/{task_id}/progress",
        "/api/invites/accept/{token}",
        "/api/share/{token}",
        "/api/audit-logs",
        "/api/auth/refresh",
        "/api/user/profile",
        "/api/user/settings",
    ] {
        assert!(paths.contains_key(p), "missing path {p}");
    }
    Ok(())
}
