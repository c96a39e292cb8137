//! Actor identity attached to every mutation and audit entry.

use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Role of the acting user.
///
/// Roles are deliberately coarse at this layer; fine-grained permissions live
/// with the excluded auth collaborator. The ledger only distinguishes
/// admin-class actors (cross-sheet reporting, overrides) from preparers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Preparer,
    Admin,
    System,
}

impl Role {
    /// Admin-class roles may run cross-sheet reporting queries and overrides.
    pub fn is_admin_class(&self) -> bool {
        matches!(self, Role::Admin | Role::System)
    }
}

/// The acting user of a mutation, recorded verbatim in the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: UserId, name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            name: name.into(),
            role,
        }
    }

    pub fn preparer(name: impl Into<String>) -> Self {
        Self::new(UserId::new(), name, Role::Preparer)
    }

    pub fn admin(name: impl Into<String>) -> Self {
        Self::new(UserId::new(), name, Role::Admin)
    }
}
