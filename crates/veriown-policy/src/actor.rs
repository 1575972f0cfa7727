//! The identity an action is performed as.

use serde::{Deserialize, Serialize};
use veriown_core::{Role, User, UserId};

/// Who is acting, as supplied by the identity context.
///
/// `vetted` is false for manufacturers and repair providers whose account
/// an administrator has not verified; such actors hold no role capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
    pub vetted: bool,
}

impl Actor {
    pub fn new(id: UserId, role: Role, vetted: bool) -> Self {
        Self { id, role, vetted }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Administrator
    }

    /// Whether the actor holds `role` and may exercise it.
    pub fn acts_as(&self, role: Role) -> bool {
        self.role == role && (self.vetted || !role.requires_verification())
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            role: user.role,
            vetted: user.is_vetted(),
        }
    }
}
