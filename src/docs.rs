use std::sync::Arc;

use axum::{routing::get, Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::{OpenApi as OpenApiDoc, Server};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::{insights, models, routes, validation};

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::auth::register,
		routes::auth::login,
		routes::auth::refresh,
		routes::auth::verify,
		routes::auth::me,
		routes::auth::logout,
		routes::auth::change_password,
		routes::projects::list_projects,
		routes::projects::create_project,
		routes::projects::get_project,
		routes::projects::update_project,
		routes::projects::delete_project,
		routes::projects::list_project_tasks,
		routes::projects::list_project_members,
		routes::projects::add_project_member,
		routes::projects::remove_project_member,
		routes::share::create_share_link,
		routes::share::list_share_links,
		routes::share::revoke_share_link,
		routes::share::view_shared_project,
		routes::tasks::list_tasks,
		routes::tasks::create_task,
		routes::tasks::get_task,
		routes::tasks::update_task,
		routes::tasks::update_task_status,
		routes::tasks::update_task_progress,
		routes::tasks::delete_task,
		routes::team::list_members,
		routes::team::get_member,
		routes::team::create_member,
		routes::team::update_member,
		routes::team::update_member_status,
		routes::team::delete_member,
		routes::departments::list_departments,
		routes::departments::get_department,
		routes::departments::create_department,
		routes::departments::update_department,
		routes::departments::delete_department,
		routes::departments::assign_admin,
		routes::users::list_users,
		routes::users::get_user,
		routes::users::create_user,
		routes::users::get_profile,
		routes::users::update_profile,
		routes::users::get_settings,
		routes::users::update_settings,
		routes::users::update_user,
		routes::users::delete_user,
		routes::invites::create_invite,
		routes::invites::list_invites,
		routes::invites::get_invite,
		routes::invites::revoke_invite,
		routes::invites::validate_invite,
		routes::invites::accept_invite,
		routes::audit::list_audit_logs,
		routes::insights::get_insights
	),
	components(
		schemas(
			crate::authz::Role,
			validation::FieldError,
			models::MessageResponse,
			routes::health::HealthResponse,
			models::user::User,
			models::user::AuthResponse,
			models::user::LoginRequest,
			models::user::RegisterRequest,
			models::user::ChangePasswordRequest,
			models::user::UserUpdateRequest,
			models::user::UserCreateRequest,
			models::user::RefreshResponse,
			models::user::VerifyResponse,
			models::user::ProfileUpdateRequest,
			models::user::UserSettings,
			models::user::NotificationPreferences,
			models::user::DisplayPreferences,
			models::user::SettingsUpdateRequest,
			models::project::Project,
			models::project::ProjectStatus,
			models::project::ProjectCreateRequest,
			models::project::ProjectUpdateRequest,
			models::project::ProjectMemberRequest,
			models::task::Task,
			models::task::TaskStatus,
			models::task::Priority,
			models::task::TaskCreateRequest,
			models::task::TaskUpdateRequest,
			models::task::TaskStatusRequest,
			models::task::TaskProgressRequest,
			models::team_member::TeamMember,
			models::team_member::MemberStatus,
			models::team_member::TeamMemberCreateRequest,
			models::team_member::TeamMemberUpdateRequest,
			models::team_member::MemberStatusRequest,
			models::department::Department,
			models::department::DepartmentCreateRequest,
			models::department::DepartmentUpdateRequest,
			models::department::AssignAdminRequest,
			models::invite::Invite,
			models::invite::InviteCreateRequest,
			models::invite::InviteCreatedResponse,
			models::invite::InviteAcceptRequest,
			models::invite::InviteValidation,
			models::share_link::ShareLink,
			models::share_link::ShareLinkCreateRequest,
			models::share_link::ShareLinkCreatedResponse,
			models::share_link::SharedMember,
			models::share_link::SharedProjectView,
			models::audit_log::AuditLog,
			insights::Insight,
			insights::InsightCategory,
			insights::InsightsResponse
		)
	),
	modifiers(&SecurityAddon),
	tags(
		(name = "Health", description = "Liveness and database probe"),
		(name = "Auth", description = "Registration, login and session management"),
		(name = "Projects", description = "Projects and their members"),
		(name = "Tasks", description = "Tasks; every change re-derives project progress"),
		(name = "Team", description = "Team member profiles"),
		(name = "Departments", description = "Departments and their admins"),
		(name = "Users", description = "Account administration"),
		(name = "Profile", description = "The caller's own profile and settings"),
		(name = "Invites", description = "Invitation tokens"),
		(name = "Share links", description = "Read-only public project links"),
		(name = "Audit", description = "Audit trail"),
		(name = "Insights", description = "Portfolio findings")
	)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
	fn modify(&self, openapi: &mut OpenApiDoc) {
		let components = openapi.components.get_or_insert_with(Default::default);
		components.add_security_scheme(
			"bearerAuth",
			SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
		);
	}
}

pub fn build_openapi(port: u16) -> OpenApiDoc {
	let mut doc = ApiDoc::openapi();
	doc.servers = Some(vec![Server::new(format!("http://localhost:{port}"))]);
	doc
}

pub fn swagger_routes(doc: OpenApiDoc) -> Router {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc = Arc::new(doc);
	let json_route = get(move || {
		let doc = Arc::clone(&doc);
		async move { Json((*doc).clone()) }
	});

	Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bearer_scheme_is_registered() {
		let doc = build_openapi(8000);
		let components = doc.components.expect("components");
		assert!(components.security_schemes.contains_key("bearerAuth"));
	}

	#[test]
	fn servers_carry_the_port() {
		let doc = build_openapi(9123);
		let servers = doc.servers.expect("servers");
		assert_eq!(servers[0].url, "http://localhost:9123");
	}
}
