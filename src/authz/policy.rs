use std::fmt;

use uuid::Uuid;

use super::role::{Permission, Role};
use crate::errors::AppError;

/// Resource kind a relationship rule is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Project,
    Task,
}

/// Resource kind whose owning department bounds a department admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeTarget {
    Project,
    Task,
    Member,
}

/// Which relationships grant access to a project or task. Checked in field
/// order after the admin bypass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relationship {
    pub target: Target,
    pub allow_manager: bool,
    pub allow_owner: bool,
    pub allow_member: bool,
    pub allow_assignee: bool,
}

impl Relationship {
    pub fn project() -> Self {
        Self {
            target: Target::Project,
            allow_manager: true,
            allow_owner: true,
            allow_member: false,
            allow_assignee: false,
        }
    }

    pub fn task() -> Self {
        Self {
            target: Target::Task,
            allow_manager: true,
            allow_owner: true,
            allow_member: false,
            allow_assignee: false,
        }
    }

    pub fn members(mut self) -> Self {
        self.allow_member = true;
        self
    }

    pub fn assignee(mut self) -> Self {
        self.allow_assignee = true;
        self
    }

    pub fn without_managers(mut self) -> Self {
        self.allow_manager = false;
        self
    }

    pub fn without_owner(mut self) -> Self {
        self.allow_owner = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Authenticated,
    Permission(Permission),
    MinRole(Role),
    Relationship(Relationship),
    DepartmentScope(ScopeTarget),
}

/// Ordered rule pipeline. Evaluation stops at the first deny.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    rules: Vec<Rule>,
}

impl Policy {
    pub fn authenticated() -> Self {
        Self {
            rules: vec![Rule::Authenticated],
        }
    }

    pub fn permission(permission: Permission) -> Self {
        Self::authenticated().then(Rule::Permission(permission))
    }

    pub fn min_role(role: Role) -> Self {
        Self::authenticated().then(Rule::MinRole(role))
    }

    pub fn relationship(relationship: Relationship) -> Self {
        Self::authenticated().then(Rule::Relationship(relationship))
    }

    pub fn then(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn scoped(self, target: ScopeTarget) -> Self {
        self.then(Rule::DepartmentScope(target))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

/// Identifiers pulled from the route for the rules to resolve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceRefs {
    pub project_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
}

impl ResourceRefs {
    pub fn project(id: Uuid) -> Self {
        Self {
            project_id: Some(id),
            ..Self::default()
        }
    }

    pub fn task(id: Uuid) -> Self {
        Self {
            task_id: Some(id),
            ..Self::default()
        }
    }

    pub fn member(id: Uuid) -> Self {
        Self {
            member_id: Some(id),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialKind {
    AccountDeactivated,
    InsufficientPermission,
    AccessDenied,
    ResourceNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub kind: DenialKind,
    pub reason: String,
}

impl Denial {
    pub fn new(kind: DenialKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.reason)
    }
}

impl From<Denial> for AppError {
    fn from(denial: Denial) -> Self {
        match denial.kind {
            DenialKind::AccountDeactivated => AppError::AccountDeactivated,
            DenialKind::InsufficientPermission => AppError::InsufficientPermission(denial.reason),
            DenialKind::AccessDenied => AppError::AccessDenied(denial.reason),
            DenialKind::ResourceNotFound => AppError::NotFound(denial.reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny(Denial),
}

impl Verdict {
    pub fn deny(kind: DenialKind, reason: impl Into<String>) -> Self {
        Verdict::Deny(Denial::new(kind, reason))
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    pub fn denial_kind(&self) -> Option<DenialKind> {
        match self {
            Verdict::Allow => None,
            Verdict::Deny(denial) => Some(denial.kind),
        }
    }

    pub fn into_result(self) -> Result<(), AppError> {
        match self {
            Verdict::Allow => Ok(()),
            Verdict::Deny(denial) => Err(denial.into()),
        }
    }
}
