//! ---
//! docqa_section: "06-security-access-control"
//! docqa_subsection: "module"
//! docqa_type: "source"
//! docqa_scope: "code"
//! docqa_description: "Authorization policy core and identity utilities."
//! docqa_version: "v0.1.0-alpha"
//! docqa_owner: "tbd"
//! ---
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{RoleCatalog, RoleError};
use crate::model::ActorId;

/// Immutable snapshot of one actor's explicit role names.
pub type RoleSet = Arc<BTreeSet<String>>;

/// Association between an actor and its explicit roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// Actor identifier.
    pub actor_id: ActorId,
    /// Roles explicitly assigned to the actor.
    pub roles: BTreeSet<String>,
}

/// Process-wide actor → role-set map.
///
/// Each actor's set is replaced wholesale on mutation (copy-on-write), so a
/// reader holding a [`RoleSet`] only ever sees a complete pre- or post-state.
/// The default role is never stored here.
#[derive(Debug)]
pub struct RoleAssignmentStore {
    catalog: Arc<RoleCatalog>,
    assignments: RwLock<HashMap<ActorId, RoleSet>>,
}

impl RoleAssignmentStore {
    /// Create an empty store validating role names against `catalog`.
    pub fn new(catalog: Arc<RoleCatalog>) -> Self {
        Self {
            catalog,
            assignments: RwLock::new(HashMap::new()),
        }
    }

    /// Catalog used to validate assignments.
    pub fn catalog(&self) -> &Arc<RoleCatalog> {
        &self.catalog
    }

    /// Assign `role` to `actor_id`. Assigning a held role is a no-op.
    pub fn assign(&self, actor_id: &str, role: &str) -> Result<(), RoleError> {
        // Catalog membership is checked under the write guard so a concurrent
        // `retire_role` cannot slip in between the check and the insert.
        let mut assignments = self.assignments.write();
        if !self.catalog.contains(role) {
            return Err(RoleError::UnknownRole(role.to_owned()));
        }
        let current = assignments.get(actor_id);
        if current.is_some_and(|roles| roles.contains(role)) {
            return Ok(());
        }
        let mut next = current.map(|roles| (**roles).clone()).unwrap_or_default();
        next.insert(role.to_owned());
        assignments.insert(actor_id.to_owned(), Arc::new(next));
        debug!(actor = actor_id, role, "role assigned");
        Ok(())
    }

    /// Remove `role` from `actor_id`. Removing an unassigned role is a no-op.
    pub fn remove(&self, actor_id: &str, role: &str) {
        let mut assignments = self.assignments.write();
        let Some(current) = assignments.get(actor_id) else {
            return;
        };
        if !current.contains(role) {
            return;
        }
        let mut next = (**current).clone();
        next.remove(role);
        if next.is_empty() {
            assignments.remove(actor_id);
        } else {
            assignments.insert(actor_id.to_owned(), Arc::new(next));
        }
        debug!(actor = actor_id, role, "role removed");
    }

    /// Remove `role` from `actor_id` unless the actor is its only explicit holder.
    ///
    /// The holder count and the replace happen under one write guard, so two
    /// concurrent removals can never strip the last holder between them.
    pub fn remove_unless_last(&self, actor_id: &str, role: &str) -> Result<(), RoleError> {
        let mut assignments = self.assignments.write();
        let Some(current) = assignments.get(actor_id) else {
            return Ok(());
        };
        if !current.contains(role) {
            return Ok(());
        }
        let holders = assignments.values().filter(|roles| roles.contains(role)).count();
        if holders <= 1 {
            return Err(RoleError::LastAdmin {
                role: role.to_owned(),
                actor_id: actor_id.to_owned(),
            });
        }
        let mut next = (**current).clone();
        next.remove(role);
        if next.is_empty() {
            assignments.remove(actor_id);
        } else {
            assignments.insert(actor_id.to_owned(), Arc::new(next));
        }
        debug!(actor = actor_id, role, "role removed");
        Ok(())
    }

    /// Assign several roles as one mutation. Fails without changes if any role is unknown.
    pub fn assign_many<'a, I>(&self, actor_id: &str, roles: I) -> Result<(), RoleError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let roles: Vec<&str> = roles.into_iter().collect();
        let mut assignments = self.assignments.write();
        if let Some(unknown) = roles.iter().find(|role| !self.catalog.contains(role)) {
            return Err(RoleError::UnknownRole((*unknown).to_owned()));
        }
        let mut next = assignments
            .get(actor_id)
            .map(|current| (**current).clone())
            .unwrap_or_default();
        next.extend(roles.into_iter().map(str::to_owned));
        if !next.is_empty() {
            assignments.insert(actor_id.to_owned(), Arc::new(next));
        }
        Ok(())
    }

    /// Remove several roles as one mutation.
    pub fn remove_many<'a, I>(&self, actor_id: &str, roles: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut assignments = self.assignments.write();
        let Some(current) = assignments.get(actor_id) else {
            return;
        };
        let mut next = (**current).clone();
        for role in roles {
            next.remove(role);
        }
        if next.is_empty() {
            assignments.remove(actor_id);
        } else {
            assignments.insert(actor_id.to_owned(), Arc::new(next));
        }
    }

    /// Explicit roles of `actor_id`; empty when nothing was assigned.
    pub fn roles_of(&self, actor_id: &str) -> RoleSet {
        self.assignments
            .read()
            .get(actor_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Actors explicitly holding `role`, sorted.
    pub fn holders_of(&self, role: &str) -> Vec<ActorId> {
        let mut holders: Vec<ActorId> = self
            .assignments
            .read()
            .iter()
            .filter(|(_, roles)| roles.contains(role))
            .map(|(actor_id, _)| actor_id.clone())
            .collect();
        holders.sort();
        holders
    }

    /// Drop `role` from every actor. Returns the number of actors affected.
    pub fn forget_role(&self, role: &str) -> usize {
        strip_role(&mut self.assignments.write(), role)
    }

    /// Delete `role` from the catalog and from every actor as one step.
    ///
    /// Holds the assignment write guard across the catalog revoke, so no
    /// assignment of the retiring role can land after it is stripped.
    /// Returns whether the role existed.
    pub fn retire_role(&self, role: &str) -> Result<bool, RoleError> {
        let mut assignments = self.assignments.write();
        if !self.catalog.revoke_role(role)? {
            return Ok(false);
        }
        let affected = strip_role(&mut assignments, role);
        debug!(role, affected, "role retired");
        Ok(true)
    }

    /// Drop every assignment for `actor_id`.
    pub fn forget_actor(&self, actor_id: &str) -> bool {
        self.assignments.write().remove(actor_id).is_some()
    }

    /// Ordered listing of all explicit assignments.
    pub fn snapshot(&self) -> Vec<RoleAssignment> {
        let assignments = self.assignments.read();
        let ordered: BTreeMap<&ActorId, &RoleSet> = assignments.iter().collect();
        ordered
            .into_iter()
            .map(|(actor_id, roles)| RoleAssignment {
                actor_id: actor_id.clone(),
                roles: (**roles).clone(),
            })
            .collect()
    }
}

fn strip_role(assignments: &mut HashMap<ActorId, RoleSet>, role: &str) -> usize {
    let affected: Vec<ActorId> = assignments
        .iter()
        .filter(|(_, roles)| roles.contains(role))
        .map(|(actor_id, _)| actor_id.clone())
        .collect();
    for actor_id in &affected {
        if let Some(current) = assignments.get(actor_id) {
            let mut next = (**current).clone();
            next.remove(role);
            if next.is_empty() {
                assignments.remove(actor_id);
            } else {
                assignments.insert(actor_id.clone(), Arc::new(next));
            }
        }
    }
    affected.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RoleAssignmentStore {
        let catalog = Arc::new(RoleCatalog::builtin());
        catalog.define_role("reviewer").unwrap();
        RoleAssignmentStore::new(catalog)
    }

    #[test]
    fn assign_then_remove_round_trips() {
        let store = store();
        store.assign("alice", "reviewer").unwrap();
        store.assign("alice", "reviewer").unwrap();
        assert_eq!(*store.roles_of("alice"), BTreeSet::from(["reviewer".to_string()]));

        store.remove("alice", "reviewer");
        store.remove("alice", "reviewer");
        assert!(store.roles_of("alice").is_empty());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn unknown_role_is_rejected() {
        let store = store();
        assert_eq!(
            store.assign("alice", "ghost"),
            Err(RoleError::UnknownRole("ghost".into()))
        );
        assert!(store.roles_of("alice").is_empty());
    }

    #[test]
    fn default_role_is_never_materialised() {
        let store = store();
        assert!(store.roles_of("nobody").is_empty());
        assert!(store.holders_of("user").is_empty());
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let store = store();
        store.assign("alice", "user").unwrap();
        let before = store.roles_of("alice");
        store.assign("alice", "reviewer").unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(store.roles_of("alice").len(), 2);
    }

    #[test]
    fn bulk_mutations_are_all_or_nothing() {
        let store = store();
        assert_eq!(
            store.assign_many("alice", ["reviewer", "ghost"]),
            Err(RoleError::UnknownRole("ghost".into()))
        );
        assert!(store.roles_of("alice").is_empty());
        store.assign_many("alice", ["reviewer", "user"]).unwrap();
        assert_eq!(store.roles_of("alice").len(), 2);
        store.remove_many("alice", ["reviewer", "user"]);
        assert!(store.roles_of("alice").is_empty());
    }

    #[test]
    fn forget_role_and_actor() {
        let store = store();
        store.assign("alice", "reviewer").unwrap();
        store.assign("bob", "reviewer").unwrap();
        store.assign("bob", "user").unwrap();
        assert_eq!(store.holders_of("reviewer"), vec!["alice", "bob"]);
        assert_eq!(store.forget_role("reviewer"), 2);
        assert!(store.roles_of("alice").is_empty());
        assert_eq!(*store.roles_of("bob"), BTreeSet::from(["user".to_string()]));
        assert!(store.forget_actor("bob"));
        assert!(!store.forget_actor("bob"));
    }

    #[test]
    fn retire_role_removes_definition_and_holders() {
        let store = store();
        store.assign("alice", "reviewer").unwrap();
        assert_eq!(store.retire_role("reviewer"), Ok(true));
        assert!(!store.catalog().contains("reviewer"));
        assert!(store.roles_of("alice").is_empty());
        assert_eq!(store.retire_role("reviewer"), Ok(false));
        assert_eq!(
            store.assign("alice", "reviewer"),
            Err(RoleError::UnknownRole("reviewer".into()))
        );
        assert!(matches!(
            store.retire_role("admin"),
            Err(RoleError::ProtectedRole(_))
        ));
    }

    #[test]
    fn remove_unless_last_keeps_the_only_holder() {
        let store = store();
        store.assign("dave", "admin").unwrap();
        assert!(matches!(
            store.remove_unless_last("dave", "admin"),
            Err(RoleError::LastAdmin { .. })
        ));
        store.assign("erin", "admin").unwrap();
        store.remove_unless_last("dave", "admin").unwrap();
        assert_eq!(store.holders_of("admin"), vec!["erin"]);
        // actors without the role are a no-op
        store.remove_unless_last("dave", "admin").unwrap();
        assert_eq!(store.holders_of("admin"), vec!["erin"]);
    }
}
