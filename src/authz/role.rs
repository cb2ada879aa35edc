use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Account role. Variants are declared in ascending privilege order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Member,
    Manager,
    DepartmentAdmin,
    Admin,
}

/// Fine-grained capability, checked against [`Role::permissions`] and never
/// inferred from rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewUsers,
    ManageUsers,
    ViewProjects,
    CreateProjects,
    EditProjects,
    DeleteProjects,
    ManageProjectMembers,
    ViewTasks,
    CreateTasks,
    EditTasks,
    DeleteTasks,
    AssignTasks,
    ViewTeam,
    ManageTeam,
    ManageDepartments,
    ManageDepartmentMembers,
    ManageDepartmentProjects,
    ManageRoles,
    SystemSettings,
}

use Permission::*;

const VIEWER_PERMISSIONS: &[Permission] = &[ViewUsers, ViewProjects, ViewTasks, ViewTeam];

const MEMBER_PERMISSIONS: &[Permission] = &[ViewUsers, ViewProjects, ViewTasks, CreateTasks, EditTasks, ViewTeam];

const MANAGER_PERMISSIONS: &[Permission] = &[
    ViewUsers,
    ViewProjects,
    CreateProjects,
    EditProjects,
    ManageProjectMembers,
    ViewTasks,
    CreateTasks,
    EditTasks,
    DeleteTasks,
    AssignTasks,
    ViewTeam,
    ManageTeam,
];

// Department-bounded manager set plus the two department permissions. No
// system-wide permissions even though the rank sits above manager.
const DEPARTMENT_ADMIN_PERMISSIONS: &[Permission] = &[
    ViewUsers,
    ViewProjects,
    CreateProjects,
    EditProjects,
    ManageProjectMembers,
    ViewTasks,
    CreateTasks,
    EditTasks,
    DeleteTasks,
    AssignTasks,
    ViewTeam,
    ManageTeam,
    ManageDepartmentMembers,
    ManageDepartmentProjects,
];

const ADMIN_PERMISSIONS: &[Permission] = &[
    ViewUsers,
    ManageUsers,
    ViewProjects,
    CreateProjects,
    EditProjects,
    DeleteProjects,
    ManageProjectMembers,
    ViewTasks,
    CreateTasks,
    EditTasks,
    DeleteTasks,
    AssignTasks,
    ViewTeam,
    ManageTeam,
    ManageDepartments,
    ManageRoles,
    SystemSettings,
];

impl Role {
    pub const ALL: [Role; 5] = [Role::Viewer, Role::Member, Role::Manager, Role::DepartmentAdmin, Role::Admin];

    pub fn rank(self) -> u8 {
        match self {
            Role::Viewer => 0,
            Role::Member => 1,
            Role::Manager => 2,
            Role::DepartmentAdmin => 3,
            Role::Admin => 4,
        }
    }

    pub fn at_least(self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    pub fn permissions(self) -> &'static [Permission] {
        match self {
            Role::Viewer => VIEWER_PERMISSIONS,
            Role::Member => MEMBER_PERMISSIONS,
            Role::Manager => MANAGER_PERMISSIONS,
            Role::DepartmentAdmin => DEPARTMENT_ADMIN_PERMISSIONS,
            Role::Admin => ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Member => "member",
            Role::Manager => "manager",
            Role::DepartmentAdmin => "department_admin",
            Role::Admin => "admin",
        }
    }

    /// Reads a role persisted in the store. Unrecognised values resolve to
    /// the least privileged role instead of failing the request.
    pub fn from_stored(value: &str) -> Role {
        value.parse().unwrap_or_else(|_| {
            tracing::warn!(role = %value, "unknown stored role, treating as viewer");
            Role::Viewer
        })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role '{}'", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewer" => Ok(Role::Viewer),
            "member" => Ok(Role::Member),
            "manager" => Ok(Role::Manager),
            "department_admin" => Ok(Role::DepartmentAdmin),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewUsers => "view_users",
            ManageUsers => "manage_users",
            ViewProjects => "view_projects",
            CreateProjects => "create_projects",
            EditProjects => "edit_projects",
            DeleteProjects => "delete_projects",
            ManageProjectMembers => "manage_project_members",
            ViewTasks => "view_tasks",
            CreateTasks => "create_tasks",
            EditTasks => "edit_tasks",
            DeleteTasks => "delete_tasks",
            AssignTasks => "assign_tasks",
            ViewTeam => "view_team",
            ManageTeam => "manage_team",
            ManageDepartments => "manage_departments",
            ManageDepartmentMembers => "manage_department_members",
            ManageDepartmentProjects => "manage_department_projects",
            ManageRoles => "manage_roles",
            SystemSettings => "system_settings",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_total_and_strict() {
        for (i, lower) in Role::ALL.iter().enumerate() {
            for higher in &Role::ALL[i + 1..] {
                assert!(lower.rank() < higher.rank());
                assert!(!lower.at_least(*higher), "{lower} should not be at least {higher}");
                assert!(higher.at_least(*lower), "{higher} should be at least {lower}");
            }
            assert!(lower.at_least(*lower));
        }
    }

    #[test]
    fn department_admin_lacks_system_permissions() {
        let role = Role::DepartmentAdmin;
        assert!(role.rank() > Role::Manager.rank());
        for permission in [ManageUsers, ManageDepartments, ManageRoles, DeleteProjects, SystemSettings] {
            assert!(!role.has_permission(permission), "department_admin must not hold {permission}");
        }
        assert!(role.has_permission(ManageDepartmentMembers));
        assert!(role.has_permission(ManageDepartmentProjects));
    }

    #[test]
    fn department_admin_covers_manager_set() {
        for permission in Role::Manager.permissions() {
            assert!(Role::DepartmentAdmin.has_permission(*permission));
        }
    }

    #[test]
    fn admin_holds_system_permissions_only() {
        assert!(Role::Admin.has_permission(ManageUsers));
        assert!(Role::Admin.has_permission(ManageRoles));
        assert!(!Role::Admin.has_permission(ManageDepartmentMembers));
    }

    #[test]
    fn member_can_edit_but_not_delete_tasks() {
        assert!(Role::Member.has_permission(EditTasks));
        assert!(!Role::Member.has_permission(DeleteTasks));
        assert!(!Role::Viewer.has_permission(CreateTasks));
    }

    #[test]
    fn unknown_stored_role_is_least_privileged() {
        assert_eq!(Role::from_stored("superuser"), Role::Viewer);
        assert_eq!(Role::from_stored(""), Role::Viewer);
        assert_eq!(Role::from_stored("department_admin"), Role::DepartmentAdmin);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn string_form_round_trips() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
    }
}
