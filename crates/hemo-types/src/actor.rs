use std::fmt;

use serde::{Deserialize, Serialize};

/// Role under which an action was performed.
///
/// Authentication is external; the engine receives an already-resolved
/// identity and role and records them verbatim on the ledger entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Donor,
    BloodBank,
    Hospital,
    Admin,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Donor => "DONOR",
            Self::BloodBank => "BLOODBANK",
            Self::Hospital => "HOSPITAL",
            Self::Admin => "ADMIN",
            Self::System => "SYSTEM",
        };
        f.write_str(s)
    }
}

/// Already-authenticated identity performing a state change.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    /// Opaque identity string resolved by the surrounding layer.
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    /// Actor for internally triggered actions.
    pub fn system() -> Self {
        Self::new("system", Role::System)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.role)
    }
}
