//! Common error types shared across crates.

use thiserror::Error;

/// Top-level service error type.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::BadRequest`] → 400
/// - [`ServiceError::Unauthenticated`] → 401
/// - [`ServiceError::Forbidden`] → 403
/// - [`ServiceError::NotFound`] → 404
/// - [`ServiceError::AuditWriteFailure`] → 500
/// - [`ServiceError::EncryptionFailure`] → 500
/// - [`ServiceError::Unavailable`] → 503
///
/// Messages are shown to callers, so they must never carry protected values.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was malformed: a missing field, a blank name or invalid JSON.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// No trusted actor identity accompanied the request.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The actor is authenticated but its role does not permit the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The referenced record does not exist, or does not belong to the stated parent.
    #[error("not found: {0}")]
    NotFound(String),

    /// The audit trail could not be appended; the whole operation was rolled back.
    #[error("audit write failure: {0}")]
    AuditWriteFailure(String),

    /// Encryption of a protected attribute failed.
    #[error("encryption failure: {0}")]
    EncryptionFailure(String),

    /// The record store is temporarily unreachable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::Unauthenticated(_) => 401,
            ServiceError::Forbidden(_) => 403,
            ServiceError::NotFound(_) => 404,
            ServiceError::AuditWriteFailure(_) => 500,
            ServiceError::EncryptionFailure(_) => 500,
            ServiceError::Unavailable(_) => 503,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in error response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::Unauthenticated(_) => "unauthenticated",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::AuditWriteFailure(_) => "audit_write_failed",
            ServiceError::EncryptionFailure(_) => "encryption_failed",
            ServiceError::Unavailable(_) => "service_unavailable",
            ServiceError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_codes() {
        assert_eq!(ServiceError::BadRequest("x".into()).http_status(), 400);
        assert_eq!(ServiceError::Unauthenticated("x".into()).http_status(), 401);
        assert_eq!(ServiceError::Forbidden("x".into()).http_status(), 403);
        assert_eq!(ServiceError::NotFound("x".into()).http_status(), 404);
        assert_eq!(
            ServiceError::AuditWriteFailure("x".into()).http_status(),
            500
        );
        assert_eq!(
            ServiceError::EncryptionFailure("x".into()).http_status(),
            500
        );
        assert_eq!(ServiceError::Unavailable("x".into()).http_status(), 503);
        assert_eq!(ServiceError::Internal("x".into()).http_status(), 500);
    }

    #[test]
    fn audit_failure_has_its_own_code() {
        let e = ServiceError::AuditWriteFailure("insert rejected".into());
        assert_eq!(e.code(), "audit_write_failed");
        assert_ne!(e.code(), ServiceError::Internal("x".into()).code());
    }

    #[test]
    fn display_includes_message() {
        let e = ServiceError::NotFound("visit 7 under patient 3".into());
        assert!(e.to_string().contains("visit 7 under patient 3"));
    }
}
