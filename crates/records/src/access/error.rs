//! Errors produced by the access layer and their mapping to [`ServiceError`].

use common::ServiceError;
use thiserror::Error;

use super::policy::{Permission, Role};
use crate::audit::AuditError;
use crate::crypto::CipherError;

#[derive(Debug, Error)]
pub enum AccessError {
    /// No actor accompanied the call.
    #[error("caller is not authenticated")]
    Unauthenticated,

    /// The actor's role does not grant the permission.
    #[error("role {role} may not access {permission}")]
    Forbidden { role: Role, permission: Permission },

    /// The resource is absent, or is not a child of the stated parent.
    #[error("{0} not found")]
    NotFound(String),

    /// Input failed validation; nothing was touched.
    #[error("invalid input: {0}")]
    Invalid(String),

    /// The audit append failed and the operation was rolled back.
    #[error("audit write failed: {0}")]
    AuditWrite(#[source] AuditError),

    /// Reading or verifying the audit trail failed.
    #[error("audit trail unavailable: {0}")]
    AuditRead(#[source] AuditError),

    /// Sealing a protected attribute failed.
    #[error("encryption failed: {0}")]
    Encryption(#[from] CipherError),

    /// The record store failed.
    #[error("record store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl From<AccessError> for ServiceError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::Unauthenticated => {
                ServiceError::Unauthenticated("an authenticated actor is required".into())
            }
            e @ AccessError::Forbidden { .. } => ServiceError::Forbidden(e.to_string()),
            e @ AccessError::NotFound(_) => ServiceError::NotFound(e.to_string()),
            AccessError::Invalid(msg) => ServiceError::BadRequest(msg),
            AccessError::AuditWrite(_) => ServiceError::AuditWriteFailure(
                "the audit trail could not be written; the operation was not applied".into(),
            ),
            AccessError::AuditRead(_) => {
                ServiceError::Internal("the audit trail could not be read".into())
            }
            AccessError::Encryption(_) => {
                ServiceError::EncryptionFailure("a protected field could not be sealed".into())
            }
            AccessError::Store(sqlx::Error::PoolTimedOut) => {
                ServiceError::Unavailable("record store is busy".into())
            }
            AccessError::Store(_) => ServiceError::Internal("record store error".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_to_expected_statuses() {
        let cases: Vec<(AccessError, u16)> = vec![
            (AccessError::Unauthenticated, 401),
            (
                AccessError::Forbidden {
                    role: Role::Clinician,
                    permission: Permission::AuditTrail,
                },
                403,
            ),
            (AccessError::NotFound("patient 9".into()), 404),
            (AccessError::Invalid("first_name is required".into()), 400),
            (
                AccessError::AuditWrite(AuditError::Append(sqlx::Error::RowNotFound)),
                500,
            ),
            (AccessError::Store(sqlx::Error::PoolTimedOut), 503),
            (AccessError::Store(sqlx::Error::RowNotFound), 500),
        ];
        for (err, status) in cases {
            assert_eq!(ServiceError::from(err).http_status(), status);
        }
    }

    #[test]
    fn audit_write_keeps_its_identity() {
        let e = ServiceError::from(AccessError::AuditWrite(AuditError::Append(
            sqlx::Error::RowNotFound,
        )));
        assert!(matches!(e, ServiceError::AuditWriteFailure(_)));
    }

    #[test]
    fn store_details_are_not_exposed() {
        let e = ServiceError::from(AccessError::Store(sqlx::Error::Protocol(
            "near \"SELECT\": syntax error".into(),
        )));
        assert!(!e.to_string().contains("SELECT"));
    }
}
