//! Collection access control
//!
//! Access is decided per collection description. Every resolution consults
//! the policy, including anonymous ones: an owned collection is closed to a
//! request without an identity.

use crate::catalog::CollectionDescription;
use serde::{Deserialize, Serialize};
use tessera_core::types::Identity;

/// Name reported for a caller without an identity
pub const ANONYMOUS: &str = "<anonymous>";

/// Access rule stored on a collection description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum AccessRule {
    /// Any caller may access
    Public,
    /// The owner and the identities it granted access to
    Owner {
        /// Identity that created the collection
        owner: Identity,
        /// Identities granted access by the owner, sorted
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        grants: Vec<Identity>,
    },
}

impl AccessRule {
    /// Rule that admits only `owner`
    pub fn owner(owner: Identity) -> Self {
        AccessRule::Owner {
            owner,
            grants: Vec::new(),
        }
    }

    /// Whether `identity` passes this rule
    pub fn permits(&self, identity: Option<&Identity>) -> bool {
        match (self, identity) {
            (AccessRule::Public, _) => true,
            (AccessRule::Owner { .. }, None) => false,
            (AccessRule::Owner { owner, grants }, Some(id)) => owner == id || grants.contains(id),
        }
    }

    /// Owner of the rule, if any
    pub fn owner_identity(&self) -> Option<&Identity> {
        match self {
            AccessRule::Public => None,
            AccessRule::Owner { owner, .. } => Some(owner),
        }
    }

    /// Add `identity` to the grants; false if it was already there
    pub(crate) fn grant(&mut self, identity: Identity) -> bool {
        match self {
            AccessRule::Public => false,
            AccessRule::Owner { grants, .. } => match grants.binary_search(&identity) {
                Ok(_) => false,
                Err(pos) => {
                    grants.insert(pos, identity);
                    true
                }
            },
        }
    }

    /// Remove `identity` from the grants; false if it was not there
    pub(crate) fn revoke(&mut self, identity: &Identity) -> bool {
        match self {
            AccessRule::Public => false,
            AccessRule::Owner { grants, .. } => match grants.binary_search(identity) {
                Ok(pos) => {
                    grants.remove(pos);
                    true
                }
                Err(_) => false,
            },
        }
    }
}

/// Decides whether a caller may use a collection
pub trait AccessPolicy: Send + Sync {
    /// Return true if `identity` (`None` is anonymous) may access `collection`
    fn check(&self, identity: Option<&Identity>, collection: &CollectionDescription) -> bool;
}

/// Enforces the rule stored on each description; no rule means public
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedPolicy;

impl AccessPolicy for RuleBasedPolicy {
    fn check(&self, identity: Option<&Identity>, collection: &CollectionDescription) -> bool {
        collection
            .rule
            .as_ref()
            .map_or(true, |rule| rule.permits(identity))
    }
}
