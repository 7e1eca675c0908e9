//! Role-based authorization, evaluated first in every access operation.

use super::error::AccessError;

/// Role assigned to an actor by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Clinician,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Clinician => "clinician",
        }
    }

    /// Case-insensitive parse; unknown roles yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "clinician" => Some(Role::Clinician),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated caller, as vouched for by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
}

impl Actor {
    pub fn new(id: i64, role: Role) -> Self {
        Self { id, role }
    }
}

/// What an operation needs from its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Open or close a session.
    Session,
    /// Read or change patients and visits.
    PatientRecords,
    /// Read or verify the audit trail.
    AuditTrail,
}

impl Permission {
    pub fn allows(self, role: Role) -> bool {
        match self {
            Permission::Session | Permission::PatientRecords => {
                matches!(role, Role::Admin | Role::Clinician)
            }
            Permission::AuditTrail => role == Role::Admin,
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Permission::Session => "session",
            Permission::PatientRecords => "patient records",
            Permission::AuditTrail => "audit trail",
        })
    }
}

/// Check `caller` against `permission`, returning the authorized actor.
pub fn authorize(caller: Option<&Actor>, permission: Permission) -> Result<&Actor, AccessError> {
    let actor = caller.ok_or(AccessError::Unauthenticated)?;
    if !permission.allows(actor.role) {
        return Err(AccessError::Forbidden {
            role: actor.role,
            permission,
        });
    }
    Ok(actor)
}
