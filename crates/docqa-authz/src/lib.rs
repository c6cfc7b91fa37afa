//! ---
//! docqa_section: "06-security-access-control"
//! docqa_subsection: "module"
//! docqa_type: "source"
//! docqa_scope: "code"
//! docqa_description: "Authorization policy core and identity utilities."
//! docqa_version: "v0.1.0-alpha"
//! docqa_owner: "tbd"
//! ---
#![warn(missing_docs)]

pub mod assignments;
pub mod audit;
pub mod catalog;
pub mod gate;
pub mod identity;
pub mod metrics;
pub mod model;
pub mod policy;

pub use assignments::{RoleAssignment, RoleAssignmentStore, RoleSet};
pub use audit::{AuditEntry, AuditLog};
pub use catalog::{Permission, RoleCatalog, RoleError};
pub use gate::{AccessDenied, AuthorizationGate, GateError, RoleSummary};
pub use identity::{ApiKey, IdentityError, IdentityProvider, NewUser, TokenClaims, UserAccount, UserUpdate};
pub use metrics::AuthzMetrics;
pub use model::{Action, Actor, ActorId, Resource, ResourceType};
pub use policy::{Decision, PolicyEvaluator, Rule, Verdict};
