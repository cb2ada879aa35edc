#![allow(dead_code)]

use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

use workboard::authz::Role;
use workboard::create_app;
use workboard::jwt::JwtConfig;
use workboard::routes::auth::insert_user;
use workboard::utils::hash_password;

pub const TEST_SECRET: &str = "test-secret";
pub const PASSWORD: &str = "password123";

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    jwt: JwtConfig,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let opts = SqliteConnectOptions::new()
            .filename(dir.path().join("test.db"))
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opts).await?;

        let migrator =
            sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
        migrator.run(&pool).await?;

        std::env::set_var("JWT_SECRET", TEST_SECRET);
        let app = create_app(pool.clone()).await?;

        Ok(Self {
            app,
            pool,
            jwt: JwtConfig::new(TEST_SECRET, 1),
            _dir: dir,
        })
    }

    pub fn token_for(&self, user_id: Uuid) -> Result<String> {
        Ok(self.jwt.encode(user_id)?)
    }

    pub fn refresh_token_for(&self, user_id: Uuid) -> Result<String> {
        Ok(self.jwt.encode_refresh(user_id)?)
    }

    /// Inserts an active user and returns its id and a signed token.
    pub async fn seed_user(&self, email: &str, role: Role, department_id: Option<Uuid>) -> Result<(Uuid, String)> {
        let user_id = Uuid::new_v4();
        let hash = hash_password(PASSWORD)?;
        let mut conn = self.pool.acquire().await?;
        insert_user(&mut conn, user_id, email, email, &hash, role, department_id).await?;
        Ok((user_id, self.token_for(user_id)?))
    }

    pub async fn seed_department(&self, name: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query("INSERT INTO departments (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn seed_member(&self, name: &str, user_id: Option<Uuid>, department_id: Option<Uuid>) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO team_members (id, user_id, department_id, name, email, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, 'active', ?, ?)",
        )
        .bind(id)
        .bind(user_id)
        .bind(department_id)
        .bind(name)
        .bind(format!("{}@members.test", name.to_lowercase().replace(' ', ".")))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn seed_project(&self, name: &str, owner_id: Uuid, status: &str, start: NaiveDate, end: NaiveDate) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO projects (id, name, status, progress, start_date, end_date, owner_id, created_at, updated_at) VALUES (?, ?, ?, 0, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(name)
        .bind(status)
        .bind(start)
        .bind(end)
        .bind(owner_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn add_project_member(&self, project_id: Uuid, member_id: Uuid) -> Result<()> {
        sqlx::query("INSERT INTO project_members (project_id, team_member_id, joined_at) VALUES (?, ?, ?)")
            .bind(project_id)
            .bind(member_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn seed_task(
        &self,
        project_id: Uuid,
        name: &str,
        status: &str,
        priority: &str,
        progress: i64,
        end: NaiveDate,
        assignee_id: Option<Uuid>,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO tasks (id, project_id, name, start_date, end_date, status, priority, progress, assignee_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(project_id)
        .bind(name)
        .bind(end - chrono::Duration::days(7))
        .bind(end)
        .bind(status)
        .bind(priority)
        .bind(progress)
        .bind(assignee_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn request(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        send(&self.app, method, uri, token, body).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> Result<(StatusCode, Value)> {
        self.request("GET", uri, Some(token), None).await
    }
}

pub async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn days(n: i64) -> chrono::Duration {
    chrono::Duration::days(n)
}

pub fn error_kind(body: &Value) -> &str {
    body.get("error").and_then(Value::as_str).unwrap_or_default()
}
