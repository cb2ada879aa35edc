//! Authorization: role model, relationship lookups, policy pipeline,
//! evaluator and the route layer that enforces it.
//!
//! Four access patterns are expressible as [`Rule`]s:
//! - permission-gated (role permission table)
//! - role-gated (minimum rank)
//! - relationship-gated (admin, manager, owner, member or assignee)
//! - department-scoped (department admins only)

mod evaluator;
mod middleware;
mod policy;
mod principal;
mod role;
mod store;

pub use evaluator::{AccessEvaluator, PolicyEvaluator};
pub use middleware::{RequireAccess, RequireAccessService};
pub use policy::{Denial, DenialKind, Policy, Relationship, ResourceRefs, Rule, ScopeTarget, Target, Verdict};
pub use principal::{CurrentPrincipal, Principal};
pub use role::{Permission, Role, UnknownRole};
pub use store::{AccessStore, MemberFacts, ProjectFacts, SqliteAccessStore, TaskFacts};
