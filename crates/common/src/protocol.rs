//! Request and response types exchanged over the public HTTP API.
//!
//! Protected attributes (address, phone, medical history, visit reason and
//! notes) appear here only as decrypted display strings. They are never part
//! of an error body or an audit event.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Text shown in place of a protected attribute whose envelope failed to decrypt.
pub const DECRYPTION_ERROR_SENTINEL: &str = "[decryption-error]";

// ---------------------------------------------------------------------------
// Patients
// ---------------------------------------------------------------------------

/// Administrative gender as captured at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }

    /// Parse the storage representation; unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "other" => Some(Gender::Other),
            _ => None,
        }
    }
}

/// Request body for `POST /patients` and `PUT /patients/:patient_id`.
///
/// An update replaces every attribute; omitted protected attributes are cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientInput {
    pub first_name: String,
    pub last_name: String,
    pub dob: NaiveDate,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub medical_history: Option<String>,
}

/// A patient with protected attributes decrypted for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientView {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub dob: NaiveDate,
    pub gender: Option<Gender>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub medical_history: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Visits belonging to this patient, most recent first.
    #[serde(default)]
    pub visits: Vec<VisitView>,
}

/// Search result row: plaintext-searchable attributes only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientSummary {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub dob: NaiveDate,
    pub gender: Option<Gender>,
}

// ---------------------------------------------------------------------------
// Visits
// ---------------------------------------------------------------------------

/// Request body for `POST /patients/:patient_id/visits` and visit updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitInput {
    pub visit_date: NaiveDate,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A visit with protected attributes decrypted for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitView {
    pub id: i64,
    pub patient_id: i64,
    pub clinician_id: Option<i64>,
    pub visit_date: NaiveDate,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// One entry of the audit trail as returned by `GET /admin/audit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEventView {
    /// Insertion sequence number.
    pub id: i64,
    pub actor_id: Option<i64>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Response body for `GET /admin/audit/verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainVerification {
    /// `true` when every event links to its predecessor and its own hash matches.
    pub intact: bool,
    /// Number of events checked before stopping.
    pub events_checked: u64,
    /// Sequence number of the first event whose hash does not verify.
    pub first_broken_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"not_found"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Whether the record store answered a trivial query.
    pub database_ready: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patient_input_defaults_protected_fields_to_none() {
        let input: PatientInput = serde_json::from_value(json!({
            "first_name": "Ada",
            "last_name": "Lovelace",
            "dob": "1815-12-10"
        }))
        .unwrap();
        assert!(input.address.is_none());
        assert!(input.gender.is_none());
        assert_eq!(input.dob, NaiveDate::from_ymd_opt(1815, 12, 10).unwrap());
    }

    #[test]
    fn gender_uses_lowercase_names() {
        let g: Gender = serde_json::from_value(json!("female")).unwrap();
        assert_eq!(g, Gender::Female);
        assert_eq!(Gender::parse(g.as_str()), Some(Gender::Female));
        assert!(serde_json::from_value::<Gender>(json!("unknown")).is_err());
    }

    #[test]
    fn error_response_new() {
        let e = ErrorResponse::new("not_found", "patient 4 not found");
        assert_eq!(e.code, "not_found");
        assert!(e.message.contains("patient 4"));
    }
}
