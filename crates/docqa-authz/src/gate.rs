//! ---
//! docqa_section: "06-security-access-control"
//! docqa_subsection: "module"
//! docqa_type: "source"
//! docqa_scope: "code"
//! docqa_description: "Authorization policy core and identity utilities."
//! docqa_version: "v0.1.0-alpha"
//! docqa_owner: "tbd"
//! ---
use std::collections::BTreeSet;
use std::sync::Arc;

use docqa_common::config::ADMIN_ROLE;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assignments::RoleAssignmentStore;
use crate::catalog::{Permission, RoleCatalog, RoleError};
use crate::model::{Action, Actor, ActorId, Resource, ResourceType};
use crate::policy::{PolicyEvaluator, Verdict};

/// Structured fault produced when the policy denies a request.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{actor_id} is not authorized to {action} on {resource}")]
pub struct AccessDenied {
    /// Actor that was denied.
    pub actor_id: ActorId,
    /// Attempted action.
    pub action: Action,
    /// Target resource.
    pub resource: Resource,
}

/// Failure of a guarded role-management operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// Caller lacks the required permission.
    #[error(transparent)]
    Denied(#[from] AccessDenied),
    /// Role catalog or assignment invariant rejected the mutation.
    #[error(transparent)]
    Role(#[from] RoleError),
}

/// Listing entry for a defined role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSummary {
    /// Role name.
    pub name: String,
    /// Whether the role is reserved against deletion.
    pub protected: bool,
    /// Permissions granted to the role.
    pub grants: BTreeSet<Permission>,
}

/// Single entry point for protected operations.
///
/// Handlers call [`AuthorizationGate::check`] before touching a resource and
/// use the role-management methods instead of mutating the catalog or
/// assignment store directly. The gate never records audit entries; callers
/// turn the returned faults into responses and audit events.
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    evaluator: PolicyEvaluator,
}

impl AuthorizationGate {
    /// Wrap an evaluator.
    pub fn new(evaluator: PolicyEvaluator) -> Self {
        Self { evaluator }
    }

    /// Gate over the built-in permission table and an empty assignment store.
    pub fn builtin() -> Self {
        let catalog = Arc::new(RoleCatalog::builtin());
        let assignments = Arc::new(RoleAssignmentStore::new(catalog.clone()));
        Self::new(PolicyEvaluator::new(catalog, assignments))
    }

    /// Underlying evaluator.
    pub fn evaluator(&self) -> &PolicyEvaluator {
        &self.evaluator
    }

    /// Role catalog.
    pub fn catalog(&self) -> &Arc<RoleCatalog> {
        self.evaluator.catalog()
    }

    /// Assignment store.
    pub fn assignments(&self) -> &Arc<RoleAssignmentStore> {
        self.evaluator.assignments()
    }

    /// Evaluate the request, returning the allowing verdict or the denial fault.
    pub fn authorize(
        &self,
        actor: &Actor,
        action: Action,
        resource: &Resource,
    ) -> Result<Verdict, AccessDenied> {
        let verdict = self.evaluator.explain(actor, action, resource);
        if verdict.decision.is_allow() {
            Ok(verdict)
        } else {
            Err(AccessDenied {
                actor_id: actor.id.clone(),
                action,
                resource: resource.clone(),
            })
        }
    }

    /// Guard a protected operation.
    pub fn check(&self, actor: &Actor, action: Action, resource: &Resource) -> Result<(), AccessDenied> {
        self.authorize(actor, action, resource).map(|_| ())
    }

    fn check_manage_roles(&self, actor: &Actor) -> Result<(), AccessDenied> {
        self.check(actor, Action::ManageRoles, &Resource::of_type(ResourceType::Role))
    }

    /// List defined roles with their grants.
    pub fn list_roles(&self, actor: &Actor) -> Result<Vec<RoleSummary>, AccessDenied> {
        self.check(actor, Action::Read, &Resource::of_type(ResourceType::Role))?;
        let catalog = self.catalog();
        Ok(catalog
            .role_names()
            .into_iter()
            .map(|name| RoleSummary {
                protected: catalog.is_protected(&name),
                grants: catalog.grants_of(&name).unwrap_or_default(),
                name,
            })
            .collect())
    }

    /// Define a new, empty role.
    pub fn create_role(&self, actor: &Actor, role: &str) -> Result<(), GateError> {
        self.check_manage_roles(actor)?;
        self.catalog().define_role(role)?;
        Ok(())
    }

    /// Delete a role and drop it from every actor.
    ///
    /// Protected roles are refused before the policy is consulted, so even an
    /// administrator receives [`RoleError::ProtectedRole`].
    pub fn delete_role(&self, actor: &Actor, role: &str) -> Result<(), GateError> {
        if self.catalog().is_protected(role) {
            return Err(RoleError::ProtectedRole(role.to_owned()).into());
        }
        self.check_manage_roles(actor)?;
        if !self.assignments().retire_role(role)? {
            return Err(RoleError::UnknownRole(role.to_owned()).into());
        }
        Ok(())
    }

    /// Assign `role` to `target`.
    pub fn assign_role(&self, actor: &Actor, target: &str, role: &str) -> Result<(), GateError> {
        self.check_manage_roles(actor)?;
        self.assignments().assign(target, role)?;
        Ok(())
    }

    /// Remove `role` from `target`, refusing to strip the last explicit admin.
    pub fn remove_role(&self, actor: &Actor, target: &str, role: &str) -> Result<(), GateError> {
        self.check_manage_roles(actor)?;
        if !self.catalog().contains(role) {
            return Err(RoleError::UnknownRole(role.to_owned()).into());
        }
        if role == ADMIN_ROLE {
            self.assignments().remove_unless_last(target, role)?;
        } else {
            self.assignments().remove(target, role);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_returns_structured_fault() {
        let gate = AuthorizationGate::builtin();
        let alice = Actor::new("alice");
        let resource = Resource::of_type(ResourceType::Document);
        assert!(gate.check(&alice, Action::Write, &resource).is_ok());
        let denied = gate.check(&alice, Action::Delete, &resource).unwrap_err();
        assert_eq!(
            denied,
            AccessDenied {
                actor_id: "alice".into(),
                action: Action::Delete,
                resource: resource.clone(),
            }
        );
        assert_eq!(
            denied.to_string(),
            "alice is not authorized to delete on Document"
        );
    }

    #[test]
    fn deleting_admin_role_fails_even_for_admins() {
        let gate = AuthorizationGate::builtin();
        let root = Actor::admin("root");
        assert!(gate
            .check(&root, Action::ManageRoles, &Resource::of_type(ResourceType::Role))
            .is_ok());
        assert_eq!(
            gate.delete_role(&root, "admin"),
            Err(GateError::Role(RoleError::ProtectedRole("admin".into())))
        );
        assert!(gate.catalog().contains("admin"));
    }

    #[test]
    fn role_lifecycle_requires_manage_roles() {
        let gate = AuthorizationGate::builtin();
        let root = Actor::admin("root");
        let alice = Actor::new("alice");

        assert!(matches!(
            gate.create_role(&alice, "reviewer"),
            Err(GateError::Denied(_))
        ));
        gate.create_role(&root, "reviewer").unwrap();
        gate.assign_role(&root, "alice", "reviewer").unwrap();
        assert!(gate.assignments().roles_of("alice").contains("reviewer"));

        gate.delete_role(&root, "reviewer").unwrap();
        assert!(gate.assignments().roles_of("alice").is_empty());
        assert_eq!(
            gate.delete_role(&root, "reviewer"),
            Err(GateError::Role(RoleError::UnknownRole("reviewer".into())))
        );
    }

    #[test]
    fn assigning_unknown_role_is_a_role_error() {
        let gate = AuthorizationGate::builtin();
        let root = Actor::admin("root");
        assert_eq!(
            gate.assign_role(&root, "alice", "ghost"),
            Err(GateError::Role(RoleError::UnknownRole("ghost".into())))
        );
    }

    #[test]
    fn last_explicit_admin_cannot_be_removed() {
        let gate = AuthorizationGate::builtin();
        let root = Actor::admin("root");
        gate.assign_role(&root, "dave", "admin").unwrap();
        assert!(matches!(
            gate.remove_role(&root, "dave", "admin"),
            Err(GateError::Role(RoleError::LastAdmin { .. }))
        ));
        gate.assign_role(&root, "erin", "admin").unwrap();
        gate.remove_role(&root, "dave", "admin").unwrap();
        assert_eq!(gate.assignments().holders_of("admin"), vec!["erin"]);
    }

    #[test]
    fn default_role_holder_may_list_roles_only_with_grant() {
        let gate = AuthorizationGate::builtin();
        let alice = Actor::new("alice");
        assert!(gate.list_roles(&alice).is_err());
        gate.catalog().grant("user", Action::Read, ResourceType::Role);
        let roles = gate.list_roles(&alice).unwrap();
        let names: Vec<_> = roles.iter().map(|role| role.name.as_str()).collect();
        assert_eq!(names, vec!["admin", "user"]);
        assert!(roles.iter().all(|role| role.protected));
    }
}
