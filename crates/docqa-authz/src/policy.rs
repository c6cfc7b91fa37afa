//! ---
//! docqa_section: "06-security-access-control"
//! docqa_subsection: "module"
//! docqa_type: "source"
//! docqa_scope: "code"
//! docqa_description: "Authorization policy core and identity utilities."
//! docqa_version: "v0.1.0-alpha"
//! docqa_owner: "tbd"
//! ---
//! Ordered decision procedure.
//!
//! Rules are tried in a fixed order and the first match allows the request:
//!
//! 1. admin override (`actor.is_admin`);
//! 2. self-access: read/write on the actor's own `User` instance;
//! 3. role grant over the actor's effective roles;
//! 4. otherwise deny.
//!
//! There are no deny rules. A non-admin actor with no explicit assignment is
//! evaluated as holding the default role; an actor with any explicit role is
//! evaluated with exactly those roles.
use std::collections::BTreeSet;
use std::sync::Arc;

use docqa_common::config::DEFAULT_ROLE;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::assignments::{RoleAssignmentStore, RoleSet};
use crate::catalog::RoleCatalog;
use crate::model::{Action, Actor, Resource, ResourceType};

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Decision {
    /// The request may proceed.
    Allow,
    /// The request must be rejected.
    Deny,
}

impl Decision {
    /// Whether the decision allows the request.
    pub fn is_allow(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Rule that produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Rule {
    /// Actor carries the administrator flag.
    AdminOverride,
    /// Actor reads or writes its own profile.
    SelfAccess,
    /// One of the actor's effective roles grants the permission.
    RoleGrant,
    /// Nothing matched.
    NoMatch,
}

/// Decision plus the rule (and role, for grants) that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Final decision.
    pub decision: Decision,
    /// Rule that fired.
    pub rule: Rule,
    /// Granting role when `rule` is [`Rule::RoleGrant`].
    pub role: Option<String>,
}

impl Verdict {
    fn allow(rule: Rule) -> Self {
        Self {
            decision: Decision::Allow,
            rule,
            role: None,
        }
    }

    fn deny() -> Self {
        Self {
            decision: Decision::Deny,
            rule: Rule::NoMatch,
            role: None,
        }
    }
}

/// Decision engine over an injected catalog and assignment store.
#[derive(Debug, Clone)]
pub struct PolicyEvaluator {
    catalog: Arc<RoleCatalog>,
    assignments: Arc<RoleAssignmentStore>,
    default_role: String,
}

impl PolicyEvaluator {
    /// Build an evaluator with `"user"` as the default role.
    pub fn new(catalog: Arc<RoleCatalog>, assignments: Arc<RoleAssignmentStore>) -> Self {
        Self {
            catalog,
            assignments,
            default_role: DEFAULT_ROLE.to_owned(),
        }
    }

    /// Override the role applied to actors without explicit assignments.
    pub fn with_default_role(mut self, role: impl Into<String>) -> Self {
        self.default_role = role.into();
        self
    }

    /// Role catalog consulted for grants.
    pub fn catalog(&self) -> &Arc<RoleCatalog> {
        &self.catalog
    }

    /// Assignment store consulted for explicit roles.
    pub fn assignments(&self) -> &Arc<RoleAssignmentStore> {
        &self.assignments
    }

    /// Role applied to non-admin actors without explicit assignments.
    pub fn default_role(&self) -> &str {
        &self.default_role
    }

    /// Roles used for grant evaluation, applying the default-role fallback.
    pub fn effective_roles(&self, actor: &Actor) -> RoleSet {
        let explicit = self.assignments.roles_of(&actor.id);
        if explicit.is_empty() && !actor.is_admin {
            Arc::new(BTreeSet::from([self.default_role.clone()]))
        } else {
            explicit
        }
    }

    /// Evaluate the request and report which rule fired.
    pub fn explain(&self, actor: &Actor, action: Action, resource: &Resource) -> Verdict {
        if actor.is_admin {
            return Verdict::allow(Rule::AdminOverride);
        }

        if let Resource::Instance {
            resource_type: ResourceType::User,
            owner_id,
        } = resource
        {
            if matches!(action, Action::Read | Action::Write) && *owner_id == actor.id {
                return Verdict::allow(Rule::SelfAccess);
            }
        }

        let Some(resource_type) = resource.resource_type() else {
            return Verdict::deny();
        };
        let roles = self.effective_roles(actor);
        if let Some(role) = roles
            .iter()
            .find(|role| self.catalog.is_granted(role, action, resource_type))
        {
            return Verdict {
                decision: Decision::Allow,
                rule: Rule::RoleGrant,
                role: Some(role.clone()),
            };
        }

        Verdict::deny()
    }

    /// Decide ALLOW or DENY for the request.
    pub fn decide(&self, actor: &Actor, action: Action, resource: &Resource) -> Decision {
        self.explain(actor, action, resource).decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn evaluator() -> PolicyEvaluator {
        let catalog = Arc::new(RoleCatalog::builtin());
        let assignments = Arc::new(RoleAssignmentStore::new(catalog.clone()));
        PolicyEvaluator::new(catalog, assignments)
    }

    fn all_resources() -> Vec<Resource> {
        let mut resources: Vec<Resource> = ResourceType::iter().map(Resource::Type).collect();
        resources.extend(ResourceType::iter().map(|kind| Resource::instance(kind, "someone")));
        resources.push(Resource::Unclassified("Invoice".into()));
        resources
    }

    #[test]
    fn admin_flag_allows_everything() {
        let evaluator = evaluator();
        let admin = Actor::admin("root");
        for action in Action::iter() {
            for resource in all_resources() {
                let verdict = evaluator.explain(&admin, action, &resource);
                assert_eq!(verdict.decision, Decision::Allow, "{action} on {resource}");
                assert_eq!(verdict.rule, Rule::AdminOverride);
            }
        }
    }

    #[test]
    fn admin_override_precedes_self_access() {
        let evaluator = evaluator();
        let admin = Actor::admin("root");
        let verdict = evaluator.explain(&admin, Action::Read, &Resource::user("root"));
        assert_eq!(verdict.rule, Rule::AdminOverride);
    }

    #[test]
    fn self_access_ignores_role_grants() {
        let evaluator = evaluator();
        evaluator.catalog().define_role("empty").unwrap();
        evaluator.assignments().assign("alice", "empty").unwrap();
        let alice = Actor::new("alice");
        let own = Resource::user("alice");
        assert_eq!(evaluator.explain(&alice, Action::Read, &own).rule, Rule::SelfAccess);
        assert_eq!(evaluator.decide(&alice, Action::Write, &own), Decision::Allow);
        assert_eq!(evaluator.decide(&alice, Action::Delete, &own), Decision::Deny);
        assert_eq!(
            evaluator.decide(&alice, Action::Read, &Resource::user("bob")),
            Decision::Deny
        );
    }

    #[test]
    fn self_access_only_covers_user_instances() {
        let evaluator = evaluator();
        let alice = Actor::new("alice");
        let own_doc = Resource::instance(ResourceType::Document, "alice");
        assert_eq!(evaluator.decide(&alice, Action::Delete, &own_doc), Decision::Deny);
        assert_eq!(
            evaluator.decide(&alice, Action::Read, &Resource::of_type(ResourceType::User)),
            Decision::Deny
        );
    }

    #[test]
    fn default_role_fallback_applies_without_assignments() {
        let evaluator = evaluator();
        let alice = Actor::new("alice");
        let document = Resource::of_type(ResourceType::Document);
        let verdict = evaluator.explain(&alice, Action::Read, &document);
        assert_eq!(verdict.rule, Rule::RoleGrant);
        assert_eq!(verdict.role.as_deref(), Some("user"));
        assert_eq!(evaluator.decide(&alice, Action::Delete, &document), Decision::Deny);
        assert!(evaluator.assignments().roles_of("alice").is_empty());
    }

    #[test]
    fn explicit_roles_replace_the_fallback() {
        let evaluator = evaluator();
        evaluator
            .catalog()
            .grant("auditor", Action::Read, ResourceType::Role);
        evaluator.assignments().assign("carol", "auditor").unwrap();
        let carol = Actor::new("carol");
        assert_eq!(
            evaluator.decide(&carol, Action::Read, &Resource::of_type(ResourceType::Role)),
            Decision::Allow
        );
        assert_eq!(
            evaluator.decide(&carol, Action::Read, &Resource::of_type(ResourceType::Document)),
            Decision::Deny
        );
    }

    #[test]
    fn explicit_admin_role_grants_management() {
        let evaluator = evaluator();
        evaluator.assignments().assign("dave", "admin").unwrap();
        let dave = Actor::new("dave");
        let verdict = evaluator.explain(&dave, Action::ManageRoles, &Resource::of_type(ResourceType::Role));
        assert_eq!(verdict.rule, Rule::RoleGrant);
        assert_eq!(verdict.role.as_deref(), Some("admin"));
        assert_eq!(
            evaluator.decide(&dave, Action::Delete, &Resource::of_type(ResourceType::Document)),
            Decision::Allow
        );
    }

    #[test]
    fn unclassified_resources_are_denied() {
        let evaluator = evaluator();
        evaluator.assignments().assign("dave", "admin").unwrap();
        let dave = Actor::new("dave");
        for action in Action::iter() {
            assert_eq!(
                evaluator.decide(&dave, action, &Resource::from_tag("Invoice")),
                Decision::Deny
            );
        }
    }

    #[test]
    fn custom_default_role() {
        let evaluator = evaluator().with_default_role("guest");
        evaluator
            .catalog()
            .grant("guest", Action::Read, ResourceType::Document);
        let eve = Actor::new("eve");
        assert_eq!(
            evaluator.decide(&eve, Action::Write, &Resource::of_type(ResourceType::Document)),
            Decision::Deny
        );
        assert_eq!(
            evaluator.decide(&eve, Action::Read, &Resource::of_type(ResourceType::Document)),
            Decision::Allow
        );
    }

    #[test]
    fn decision_labels() {
        assert_eq!(Decision::Allow.to_string(), "ALLOW");
        assert_eq!(Rule::AdminOverride.as_ref(), "admin-override");
    }
}
