use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::policy::{DenialKind, Policy, Relationship, ResourceRefs, Rule, ScopeTarget, Target, Verdict};
use super::principal::Principal;
use super::role::Role;
use super::store::{AccessStore, ProjectFacts};
use crate::errors::{AppError, AppResult};

/// Policy evaluator trait for pluggable authorization logic.
///
/// `Err` means the verdict could not be reached because a collaborator
/// failed. It is never a denial.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn evaluate(&self, principal: &Principal, policy: &Policy, refs: &ResourceRefs) -> AppResult<Verdict>;
}

/// Default evaluator over an [`AccessStore`].
///
/// Evaluation order:
/// 1. inactive principal -> deny (`AccountDeactivated`)
/// 2. each rule in policy order, first deny wins
/// 3. allow
///
/// Relationship and department-scope rules confirm the resource exists
/// before judging access, so a missing resource is a 404 rather than a 403.
#[derive(Clone)]
pub struct AccessEvaluator {
    store: Arc<dyn AccessStore>,
}

impl AccessEvaluator {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self { store }
    }

    async fn check_rule(&self, principal: &Principal, rule: &Rule, refs: &ResourceRefs) -> AppResult<Verdict> {
        match rule {
            Rule::Authenticated => Ok(Verdict::Allow),
            Rule::Permission(permission) => {
                if principal.has_permission(*permission) {
                    Ok(Verdict::Allow)
                } else {
                    Ok(Verdict::deny(
                        DenialKind::InsufficientPermission,
                        format!("requires permission '{permission}'"),
                    ))
                }
            }
            Rule::MinRole(required) => {
                if principal.role.at_least(*required) {
                    Ok(Verdict::Allow)
                } else {
                    Ok(Verdict::deny(
                        DenialKind::InsufficientPermission,
                        format!("requires role '{required}' or higher"),
                    ))
                }
            }
            Rule::Relationship(relationship) => self.check_relationship(principal, relationship, refs).await,
            Rule::DepartmentScope(target) => self.check_department(principal, *target, refs).await,
        }
    }

    async fn check_relationship(&self, principal: &Principal, rel: &Relationship, refs: &ResourceRefs) -> AppResult<Verdict> {
        match rel.target {
            Target::Project => {
                let project_id = require(refs.project_id, "project_id")?;
                let Some(project) = self.store.project_facts(project_id).await? else {
                    return Ok(Verdict::deny(DenialKind::ResourceNotFound, "project not found"));
                };

                if let Some(verdict) = role_bypass(principal, rel) {
                    return Ok(verdict);
                }
                if rel.allow_owner && project.owner_id == Some(principal.id) {
                    return Ok(Verdict::Allow);
                }
                if rel.allow_member {
                    if let Some(member_id) = self.store.team_member_for_user(principal.id).await? {
                        if self.store.is_project_member(project_id, member_id).await? {
                            return Ok(Verdict::Allow);
                        }
                    }
                }

                Ok(Verdict::deny(DenialKind::AccessDenied, "no access to this project"))
            }
            Target::Task => {
                let task_id = require(refs.task_id, "task_id")?;
                let Some(task) = self.store.task_facts(task_id).await? else {
                    return Ok(Verdict::deny(DenialKind::ResourceNotFound, "task not found"));
                };

                if let Some(verdict) = role_bypass(principal, rel) {
                    return Ok(verdict);
                }
                if rel.allow_owner {
                    let owner = self.store.project_facts(task.project_id).await?.and_then(|p| p.owner_id);
                    if owner == Some(principal.id) {
                        return Ok(Verdict::Allow);
                    }
                }
                if rel.allow_assignee || rel.allow_member {
                    if let Some(member_id) = self.store.team_member_for_user(principal.id).await? {
                        if rel.allow_assignee && task.assignee_id == Some(member_id) {
                            return Ok(Verdict::Allow);
                        }
                        if rel.allow_member && self.store.is_project_member(task.project_id, member_id).await? {
                            return Ok(Verdict::Allow);
                        }
                    }
                }

                Ok(Verdict::deny(DenialKind::AccessDenied, "no access to this task"))
            }
        }
    }

    async fn check_department(&self, principal: &Principal, target: ScopeTarget, refs: &ResourceRefs) -> AppResult<Verdict> {
        // Containment applies to department admins only.
        if principal.role != Role::DepartmentAdmin {
            return Ok(Verdict::Allow);
        }

        let resource_department = match target {
            ScopeTarget::Project => {
                let project_id = require(refs.project_id, "project_id")?;
                match self.store.project_facts(project_id).await? {
                    Some(ProjectFacts { department_id, .. }) => department_id,
                    None => return Ok(Verdict::deny(DenialKind::ResourceNotFound, "project not found")),
                }
            }
            ScopeTarget::Task => {
                let task_id = require(refs.task_id, "task_id")?;
                let Some(task) = self.store.task_facts(task_id).await? else {
                    return Ok(Verdict::deny(DenialKind::ResourceNotFound, "task not found"));
                };
                self.store
                    .project_facts(task.project_id)
                    .await?
                    .and_then(|p| p.department_id)
            }
            ScopeTarget::Member => {
                let member_id = require(refs.member_id, "member_id")?;
                match self.store.member_facts(member_id).await? {
                    Some(member) => member.department_id,
                    None => return Ok(Verdict::deny(DenialKind::ResourceNotFound, "team member not found")),
                }
            }
        };

        match (principal.department_id, resource_department) {
            (Some(own), Some(theirs)) if own == theirs => Ok(Verdict::Allow),
            _ => Ok(Verdict::deny(DenialKind::AccessDenied, "resource belongs to another department")),
        }
    }
}

#[async_trait]
impl PolicyEvaluator for AccessEvaluator {
    async fn evaluate(&self, principal: &Principal, policy: &Policy, refs: &ResourceRefs) -> AppResult<Verdict> {
        if !principal.active {
            tracing::info!(user_id = %principal.id, "access denied: account deactivated");
            return Ok(Verdict::deny(DenialKind::AccountDeactivated, "account deactivated"));
        }

        for rule in policy.rules() {
            let verdict = self.check_rule(principal, rule, refs).await?;
            if let Verdict::Deny(denial) = &verdict {
                tracing::info!(
                    user_id = %principal.id,
                    role = %principal.role,
                    rule = ?rule,
                    kind = ?denial.kind,
                    "access denied"
                );
                return Ok(verdict);
            }
        }

        tracing::debug!(user_id = %principal.id, role = %principal.role, "access allowed");
        Ok(Verdict::Allow)
    }
}

fn role_bypass(principal: &Principal, rel: &Relationship) -> Option<Verdict> {
    if principal.role == Role::Admin {
        return Some(Verdict::Allow);
    }
    if rel.allow_manager && principal.role.at_least(Role::Manager) {
        return Some(Verdict::Allow);
    }
    None
}

fn require(id: Option<Uuid>, name: &str) -> AppResult<Uuid> {
    id.ok_or_else(|| AppError::internal(format!("route does not provide '{name}'")))
}
