pub mod audit;
pub mod auth;
pub mod departments;
pub mod health;
pub mod insights;
pub mod invites;
pub mod projects;
pub mod share;
pub mod tasks;
pub mod team;
pub mod users;

use uuid::Uuid;

use crate::authz::{Principal, Role};
use crate::errors::{AppError, AppResult};

/// Confines list queries for department admins to their own department.
///
/// Bind as `(? = 0 OR <department column> = ?)`; a department admin without
/// a department matches nothing.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DepartmentFilter {
    pub scoped: bool,
    pub department_id: Option<Uuid>,
}

impl DepartmentFilter {
    pub fn for_principal(principal: &Principal) -> Self {
        Self {
            scoped: principal.role == Role::DepartmentAdmin,
            department_id: principal.department_id,
        }
    }
}

/// Department admins may only place people and invites in their own
/// department. Everyone else keeps what they asked for, falling back to
/// their own department when nothing was requested.
pub(crate) fn pinned_department(principal: &Principal, requested: Option<Uuid>) -> AppResult<Option<Uuid>> {
    if principal.role != Role::DepartmentAdmin {
        return Ok(requested.or(principal.department_id));
    }
    match (requested, principal.department_id) {
        (_, None) => Err(AppError::access_denied("department admin has no department")),
        (Some(requested), Some(own)) if requested != own => {
            Err(AppError::access_denied("outside your department"))
        }
        (_, Some(own)) => Ok(Some(own)),
    }
}

/// Lowercased, trimmed email used for storage and lookups.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_department_admins_are_filtered() {
        let dept = Uuid::new_v4();
        let admin = Principal::new(Uuid::new_v4(), Role::Admin).in_department(dept);
        let dept_admin = Principal::new(Uuid::new_v4(), Role::DepartmentAdmin).in_department(dept);

        assert!(!DepartmentFilter::for_principal(&admin).scoped);
        let filter = DepartmentFilter::for_principal(&dept_admin);
        assert!(filter.scoped);
        assert_eq!(filter.department_id, Some(dept));
    }

    #[test]
    fn department_admin_is_pinned_to_own_department() {
        let own = Uuid::new_v4();
        let dept_admin = Principal::new(Uuid::new_v4(), Role::DepartmentAdmin).in_department(own);

        assert_eq!(pinned_department(&dept_admin, None).unwrap(), Some(own));
        assert_eq!(pinned_department(&dept_admin, Some(own)).unwrap(), Some(own));
        let err = pinned_department(&dept_admin, Some(Uuid::new_v4())).unwrap_err();
        assert_eq!(err.kind(), "access_denied");

        let homeless = Principal::new(Uuid::new_v4(), Role::DepartmentAdmin);
        assert!(pinned_department(&homeless, None).is_err());
    }

    #[test]
    fn other_roles_keep_requested_department() {
        let manager = Principal::new(Uuid::new_v4(), Role::Manager);
        let dept = Uuid::new_v4();
        assert_eq!(pinned_department(&manager, Some(dept)).unwrap(), Some(dept));
        assert_eq!(pinned_department(&manager, None).unwrap(), None);
    }

    #[test]
    fn missing_department_defaults_to_the_creator_s() {
        let own = Uuid::new_v4();
        let other = Uuid::new_v4();
        let manager = Principal::new(Uuid::new_v4(), Role::Manager).in_department(own);

        assert_eq!(pinned_department(&manager, None).unwrap(), Some(own));
        assert_eq!(pinned_department(&manager, Some(other)).unwrap(), Some(other));
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }
}
