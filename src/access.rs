// 🔐 Access Control - role-based write permissions
//
// Who may change what. Authentication and sessions live outside this crate;
// callers hand us a Role they already trust.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::OkrError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Gestor,
    Operacional,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Gestor => "gestor",
            Role::Operacional => "operacional",
        }
    }
}

impl FromStr for Role {
    type Err = OkrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "gestor" | "manager" => Ok(Role::Gestor),
            "operacional" | "operator" => Ok(Role::Operacional),
            other => Err(OkrError::validation("role", format!("Unknown role '{}'", other))),
        }
    }
}

/// Write operations the API exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ManageObjectives,
    ManageKeyResults,
    RescheduleKeyResult,
    RecordCheckpoint,
    ManageActions,
    UpdateActionStatus,
}

/// Pluggable policy; reads are never gated
pub trait AccessPolicy: Send + Sync {
    fn allows(&self, role: Role, operation: Operation) -> bool;

    /// `Err(OkrError::Forbidden)` instead of a bool, for `?` at call sites
    fn check(&self, role: Role, operation: Operation) -> Result<(), OkrError> {
        if self.allows(role, operation) {
            Ok(())
        } else {
            Err(OkrError::Forbidden(format!(
                "role '{}' cannot perform {:?}",
                role.as_str(),
                operation
            )))
        }
    }
}

/// Default policy: admin and gestor manage everything, operacional only
/// records progress (checkpoint values and action status).
#[derive(Debug, Clone, Copy, Default)]
pub struct RolePolicy;

impl AccessPolicy for RolePolicy {
    fn allows(&self, role: Role, operation: Operation) -> bool {
        match role {
            Role::Admin | Role::Gestor => true,
            Role::Operacional => matches!(
                operation,
                Operation::RecordCheckpoint | Operation::UpdateActionStatus
            ),
        }
    }
}
