//! ---
//! docqa_section: "06-security-access-control"
//! docqa_subsection: "module"
//! docqa_type: "source"
//! docqa_scope: "code"
//! docqa_description: "Authorization policy core and identity utilities."
//! docqa_version: "v0.1.0-alpha"
//! docqa_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Identifier for an authenticated actor.
pub type ActorId = String;

/// Action an actor may attempt against a resource.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    /// Read an object or list a collection.
    Read,
    /// Create or modify an object.
    Write,
    /// Delete an object.
    Delete,
    /// Create, delete and (un)assign roles.
    ManageRoles,
    /// Administer user accounts.
    ManageUsers,
}

/// Closed set of resource categories an action can target.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum ResourceType {
    /// Uploaded document and its indexed chunks.
    Document,
    /// Role definition.
    Role,
    /// User account / profile.
    User,
}

/// Target of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// Collection-level target such as "list documents".
    Type(ResourceType),
    /// Concrete object owned by an actor.
    Instance {
        /// Category of the object.
        resource_type: ResourceType,
        /// Owner identity compared against the actor for self-access.
        owner_id: ActorId,
    },
    /// Tag that did not parse into a known [`ResourceType`]; never granted.
    Unclassified(String),
}

impl Resource {
    /// Collection-level resource.
    pub fn of_type(resource_type: ResourceType) -> Self {
        Self::Type(resource_type)
    }

    /// Owned instance of `resource_type`.
    pub fn instance(resource_type: ResourceType, owner_id: impl Into<ActorId>) -> Self {
        Self::Instance {
            resource_type,
            owner_id: owner_id.into(),
        }
    }

    /// A user profile owned by `user_id`.
    pub fn user(user_id: impl Into<ActorId>) -> Self {
        Self::instance(ResourceType::User, user_id)
    }

    /// Parse a free-form type tag, keeping unknown tags as [`Resource::Unclassified`].
    pub fn from_tag(tag: &str) -> Self {
        match ResourceType::from_str(tag.trim()) {
            Ok(resource_type) => Self::Type(resource_type),
            Err(_) => Self::Unclassified(tag.to_owned()),
        }
    }

    /// Resource category, if known.
    pub fn resource_type(&self) -> Option<ResourceType> {
        match self {
            Self::Type(resource_type) => Some(*resource_type),
            Self::Instance { resource_type, .. } => Some(*resource_type),
            Self::Unclassified(_) => None,
        }
    }

    /// Owner identity for instance resources.
    pub fn owner_id(&self) -> Option<&str> {
        match self {
            Self::Instance { owner_id, .. } => Some(owner_id),
            _ => None,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(resource_type) => write!(f, "{resource_type}"),
            Self::Instance {
                resource_type,
                owner_id,
            } => write!(f, "{resource_type}(owner={owner_id})"),
            Self::Unclassified(tag) => write!(f, "unclassified:{tag}"),
        }
    }
}

/// Snapshot of the authenticated caller. Role assignments are looked up in the
/// assignment store and never carried here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    /// Stable identity.
    pub id: ActorId,
    /// Administrator flag fixed at account creation.
    pub is_admin: bool,
}

impl Actor {
    /// Regular (non-admin) actor.
    pub fn new(id: impl Into<ActorId>) -> Self {
        Self {
            id: id.into(),
            is_admin: false,
        }
    }

    /// Actor carrying the administrator flag.
    pub fn admin(id: impl Into<ActorId>) -> Self {
        Self {
            id: id.into(),
            is_admin: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_use_snake_case_names() {
        assert_eq!(Action::ManageRoles.to_string(), "manage_roles");
        assert_eq!(Action::from_str("manage_users").unwrap(), Action::ManageUsers);
        assert_eq!(
            serde_json::to_string(&Action::ManageRoles).unwrap(),
            "\"manage_roles\""
        );
        assert!(Action::from_str("execute").is_err());
    }

    #[test]
    fn resource_tags_parse_case_insensitively() {
        assert_eq!(Resource::from_tag("document"), Resource::Type(ResourceType::Document));
        assert_eq!(Resource::from_tag("Role"), Resource::Type(ResourceType::Role));
        assert_eq!(
            Resource::from_tag("Invoice"),
            Resource::Unclassified("Invoice".into())
        );
        assert_eq!(Resource::from_tag("Invoice").resource_type(), None);
    }

    #[test]
    fn descriptors_include_owner() {
        assert_eq!(Resource::user("alice").to_string(), "User(owner=alice)");
        assert_eq!(Resource::of_type(ResourceType::Document).to_string(), "Document");
        assert_eq!(Resource::user("alice").owner_id(), Some("alice"));
    }
}
