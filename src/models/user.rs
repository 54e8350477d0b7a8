use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Collector,
    Admin,
}

impl Role {
    /// Collectors and admins are the only roles allowed to drive status
    /// transitions.
    pub fn can_transition(self) -> bool {
        match self {
            Role::Collector | Role::Admin => true,
            Role::Customer => false,
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "customer" => Ok(Role::Customer),
            "collector" => Ok(Role::Collector),
            "admin" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

/// Identity and loyalty balance for a known principal. Records are upserted
/// lazily from acting principals; credential handling lives outside this
/// service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub role: Role,
    pub points: u64,
}
