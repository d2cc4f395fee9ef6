use serde::{Deserialize, Serialize};

use crate::model::ids::UserId;

//
// ─── ROLE ──────────────────────────────────────────────────────────────────────
//

/// Role claimed by an authenticated caller.
///
/// The core trusts the caller's role claim; authentication itself happens
/// upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    /// Returns the storage representation of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

//
// ─── PRINCIPAL ─────────────────────────────────────────────────────────────────
//

/// An authenticated caller: user identity plus role claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user: UserId,
    pub role: Role,
}

impl Principal {
    #[must_use]
    pub fn new(user: UserId, role: Role) -> Self {
        Self { user, role }
    }

    #[must_use]
    pub fn student(user: UserId) -> Self {
        Self::new(user, Role::Student)
    }

    #[must_use]
    pub fn teacher(user: UserId) -> Self {
        Self::new(user, Role::Teacher)
    }

    #[must_use]
    pub fn is_student(&self) -> bool {
        self.role == Role::Student
    }
}

//
// ─── OWNERSHIP ─────────────────────────────────────────────────────────────────
//

/// Entities with a single owning user.
///
/// Mutation rights are checked uniformly through this trait rather than
/// ad-hoc per-entity attribute inspection.
pub trait Owned {
    fn owner_id(&self) -> UserId;
}

/// Returns true if the principal may modify the owned entity.
///
/// Admins may modify anything; everyone else must own the entity.
#[must_use]
pub fn can_modify(principal: &Principal, entity: &impl Owned) -> bool {
    principal.role == Role::Admin || principal.user == entity.owner_id()
}
