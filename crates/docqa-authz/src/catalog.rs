//! ---
//! docqa_section: "06-security-access-control"
//! docqa_subsection: "module"
//! docqa_type: "source"
//! docqa_scope: "code"
//! docqa_description: "Authorization policy core and identity utilities."
//! docqa_version: "v0.1.0-alpha"
//! docqa_owner: "tbd"
//! ---
use std::collections::{BTreeSet, HashMap, HashSet};
use std::str::FromStr;

use anyhow::{Context, Result};
use docqa_common::config::{PolicyConfig, ADMIN_ROLE, DEFAULT_ROLE};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::model::{Action, ActorId, ResourceType};

/// Permission pairs an action with the resource type it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Permission {
    /// Permitted action.
    pub action: Action,
    /// Resource type the action applies to.
    pub resource_type: ResourceType,
}

impl Permission {
    /// Construct a permission pair.
    pub fn new(action: Action, resource_type: ResourceType) -> Self {
        Self {
            action,
            resource_type,
        }
    }
}

/// Errors raised by role definition and assignment operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleError {
    /// Role not defined in the catalog.
    #[error("role not found: {0}")]
    UnknownRole(String),
    /// Role already defined.
    #[error("role already exists: {0}")]
    DuplicateRole(String),
    /// Role is reserved and cannot be deleted.
    #[error("role '{0}' is protected and cannot be deleted")]
    ProtectedRole(String),
    /// Removal would leave no explicit holder of the admin role.
    #[error("cannot remove the last '{role}' assignment (held by {actor_id})")]
    LastAdmin {
        /// Reserved role being removed.
        role: String,
        /// Actor that would lose it.
        actor_id: ActorId,
    },
    /// Role name is empty or whitespace.
    #[error("role names cannot be empty")]
    InvalidName,
}

/// Known roles and the permissions granted to each.
///
/// Grants are additive: there is no deny entry, and a lookup matches only the
/// exact `(role, action, resource type)` triple.
#[derive(Debug)]
pub struct RoleCatalog {
    roles: RwLock<HashMap<String, HashSet<Permission>>>,
    protected: HashSet<String>,
}

impl Default for RoleCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RoleCatalog {
    /// Empty catalog; only the admin role name is protected.
    pub fn new() -> Self {
        Self {
            roles: RwLock::new(HashMap::new()),
            protected: HashSet::from([ADMIN_ROLE.to_owned()]),
        }
    }

    /// Fixed permission table used when no policy configuration is supplied.
    pub fn builtin() -> Self {
        let catalog = Self::new().with_protected([DEFAULT_ROLE]);
        catalog.grant(ADMIN_ROLE, Action::ManageRoles, ResourceType::Role);
        catalog.grant(ADMIN_ROLE, Action::ManageUsers, ResourceType::User);
        for action in [Action::Read, Action::Write, Action::Delete] {
            catalog.grant(ADMIN_ROLE, action, ResourceType::Document);
        }
        catalog.grant(DEFAULT_ROLE, Action::Read, ResourceType::Document);
        catalog.grant(DEFAULT_ROLE, Action::Write, ResourceType::Document);
        catalog
    }

    /// Seed a catalog from policy configuration.
    pub fn from_config(policy: &PolicyConfig) -> Result<Self> {
        let catalog = Self::new().with_protected(policy.protected_roles.iter());
        for (role, definition) in &policy.roles {
            catalog.ensure_role(role);
            for grant in &definition.grants {
                let action = Action::from_str(&grant.action)
                    .with_context(|| format!("role '{role}': unknown action '{}'", grant.action))?;
                let resource_type = ResourceType::from_str(&grant.resource).with_context(|| {
                    format!("role '{role}': unknown resource type '{}'", grant.resource)
                })?;
                catalog.grant(role, action, resource_type);
            }
        }
        Ok(catalog)
    }

    /// Mark additional role names as protected from deletion.
    pub fn with_protected<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.protected
            .extend(names.into_iter().map(|name| name.as_ref().to_owned()));
        self
    }

    /// Grant `action` on `resource_type` to `role`, defining the role if needed.
    pub fn grant(&self, role: &str, action: Action, resource_type: ResourceType) {
        self.roles
            .write()
            .entry(role.to_owned())
            .or_default()
            .insert(Permission::new(action, resource_type));
    }

    /// Exact-match permission lookup.
    pub fn is_granted(&self, role: &str, action: Action, resource_type: ResourceType) -> bool {
        self.roles
            .read()
            .get(role)
            .map(|grants| grants.contains(&Permission::new(action, resource_type)))
            .unwrap_or(false)
    }

    /// Define a new role with no grants.
    pub fn define_role(&self, role: &str) -> Result<(), RoleError> {
        let role = role.trim();
        if role.is_empty() {
            return Err(RoleError::InvalidName);
        }
        let mut roles = self.roles.write();
        if roles.contains_key(role) {
            return Err(RoleError::DuplicateRole(role.to_owned()));
        }
        roles.insert(role.to_owned(), HashSet::new());
        debug!(role, "role defined");
        Ok(())
    }

    fn ensure_role(&self, role: &str) {
        self.roles.write().entry(role.to_owned()).or_default();
    }

    /// Remove a role and all of its grants. Returns whether the role existed.
    pub fn revoke_role(&self, role: &str) -> Result<bool, RoleError> {
        if self.is_protected(role) {
            return Err(RoleError::ProtectedRole(role.to_owned()));
        }
        let existed = self.roles.write().remove(role).is_some();
        if existed {
            debug!(role, "role revoked");
        }
        Ok(existed)
    }

    /// Whether the role is defined.
    pub fn contains(&self, role: &str) -> bool {
        self.roles.read().contains_key(role)
    }

    /// Whether the role is reserved against deletion.
    pub fn is_protected(&self, role: &str) -> bool {
        self.protected.contains(role)
    }

    /// Sorted list of defined role names.
    pub fn role_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.roles.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Grants attached to a role, in stable order.
    pub fn grants_of(&self, role: &str) -> Option<BTreeSet<Permission>> {
        self.roles
            .read()
            .get(role)
            .map(|grants| grants.iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_common::config::{GrantConfig, RoleConfig};

    #[test]
    fn builtin_table_matches_fixed_grants() {
        let catalog = RoleCatalog::builtin();
        assert!(catalog.is_granted("admin", Action::ManageRoles, ResourceType::Role));
        assert!(catalog.is_granted("admin", Action::ManageUsers, ResourceType::User));
        assert!(catalog.is_granted("admin", Action::Delete, ResourceType::Document));
        assert!(catalog.is_granted("user", Action::Write, ResourceType::Document));
        assert!(!catalog.is_granted("user", Action::Delete, ResourceType::Document));
        assert!(!catalog.is_granted("admin", Action::Read, ResourceType::User));
        assert_eq!(catalog.role_names(), vec!["admin", "user"]);
    }

    #[test]
    fn grant_is_idempotent_and_exact() {
        let catalog = RoleCatalog::new();
        catalog.grant("editor", Action::Write, ResourceType::Document);
        catalog.grant("editor", Action::Write, ResourceType::Document);
        assert_eq!(catalog.grants_of("editor").unwrap().len(), 1);
        assert!(!catalog.is_granted("editor", Action::Read, ResourceType::Document));
        assert!(!catalog.is_granted("editor", Action::Write, ResourceType::Role));
        assert!(!catalog.is_granted("missing", Action::Write, ResourceType::Document));
    }

    #[test]
    fn admin_role_cannot_be_revoked() {
        let catalog = RoleCatalog::new();
        assert_eq!(
            catalog.revoke_role("admin"),
            Err(RoleError::ProtectedRole("admin".into()))
        );
        let builtin = RoleCatalog::builtin();
        assert!(matches!(
            builtin.revoke_role("user"),
            Err(RoleError::ProtectedRole(_))
        ));
        assert!(builtin.is_granted("user", Action::Read, ResourceType::Document));
    }

    #[test]
    fn revoke_drops_all_grants() {
        let catalog = RoleCatalog::builtin();
        catalog.grant("auditor", Action::Read, ResourceType::Role);
        assert_eq!(catalog.revoke_role("auditor"), Ok(true));
        assert!(!catalog.is_granted("auditor", Action::Read, ResourceType::Role));
        assert!(!catalog.contains("auditor"));
        assert_eq!(catalog.revoke_role("auditor"), Ok(false));
    }

    #[test]
    fn define_role_rejects_duplicates_and_blanks() {
        let catalog = RoleCatalog::builtin();
        catalog.define_role("reviewer").unwrap();
        assert!(catalog.contains("reviewer"));
        assert!(catalog.grants_of("reviewer").unwrap().is_empty());
        assert_eq!(
            catalog.define_role("admin"),
            Err(RoleError::DuplicateRole("admin".into()))
        );
        assert_eq!(catalog.define_role("  "), Err(RoleError::InvalidName));
    }

    #[test]
    fn from_config_parses_grants() {
        let mut policy = PolicyConfig::default();
        policy.roles.insert(
            "reader".into(),
            RoleConfig {
                grants: vec![GrantConfig {
                    action: "read".into(),
                    resource: "document".into(),
                }],
            },
        );
        let catalog = RoleCatalog::from_config(&policy).unwrap();
        assert!(catalog.is_granted("reader", Action::Read, ResourceType::Document));
        assert!(catalog.is_protected("admin"));
        assert!(catalog.is_protected("user"));
        assert!(!catalog.is_protected("reader"));
    }

    #[test]
    fn from_config_rejects_unknown_action() {
        let mut policy = PolicyConfig::default();
        policy.roles.insert(
            "broken".into(),
            RoleConfig {
                grants: vec![GrantConfig {
                    action: "execute".into(),
                    resource: "Document".into(),
                }],
            },
        );
        let err = RoleCatalog::from_config(&policy).unwrap_err();
        assert!(err.to_string().contains("execute"));
    }
}
