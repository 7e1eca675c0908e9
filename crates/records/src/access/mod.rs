//! Record access layer: the single entry point for every sensitive-record operation.
//!
//! Each operation runs the same sequence:
//!
//! 1. [`policy::authorize`] the explicit caller. Rejections touch nothing and
//!    are not audited.
//! 2. Open a write transaction ([`db::begin_write`]) and do the domain work,
//!    sealing protected attributes with the [`FieldCipher`] before they are
//!    written. Reads take the write lock too, since they append an event.
//! 3. Append exactly one audit event on the same transaction, then commit.
//!    A failed append drops the transaction, so the domain work never lands
//!    without its audit record.
//!
//! Protected attributes are decrypted only when building views, after the
//! transaction has committed.

pub mod error;
pub mod policy;

pub use error::AccessError;
pub use policy::{authorize, Actor, Permission, Role};

use chrono::{DateTime, Utc};
use common::protocol::{
    ChainVerification, Gender, PatientInput, PatientSummary, PatientView, VisitInput, VisitView,
};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{error, info, instrument, warn};

use crate::audit::{AuditAction, AuditEntry, AuditEvent, AuditRecorder, ResourceType};
use crate::crypto::{Decrypted, FieldCipher};
use crate::db::{
    self,
    patients::{self, PatientRow, SealedPatient},
    visits::{self, SealedVisit, VisitRow},
};

/// Longest accepted first or last name, in characters.
pub const MAX_NAME_LEN: usize = 120;

/// Mediates every patient, visit, session and audit-trail operation.
///
/// Cheap to clone; all fields are shared handles.
#[derive(Clone, Debug)]
pub struct RecordAccess {
    pool: SqlitePool,
    cipher: FieldCipher,
    audit: AuditRecorder,
    audit_page_limit: u32,
}

impl RecordAccess {
    pub fn new(
        pool: SqlitePool,
        cipher: FieldCipher,
        audit: AuditRecorder,
        audit_page_limit: u32,
    ) -> Self {
        Self {
            pool,
            cipher,
            audit,
            audit_page_limit: audit_page_limit.max(1),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Record that `caller` opened a session.
    #[instrument(skip_all)]
    pub async fn login(&self, caller: Option<&Actor>) -> Result<(), AccessError> {
        let actor = authorize(caller, Permission::Session)?;
        let tx = db::begin_write(&self.pool).await?;
        let entry = AuditEntry::new(
            Some(actor.id),
            AuditAction::Login,
            ResourceType::User,
            Some(actor.id),
        )
        .with("role", actor.role.as_str());
        self.commit_audited(tx, entry).await?;
        info!(actor_id = actor.id, "session opened");
        Ok(())
    }

    /// Record that `caller` closed its session.
    #[instrument(skip_all)]
    pub async fn logout(&self, caller: Option<&Actor>) -> Result<(), AccessError> {
        let actor = authorize(caller, Permission::Session)?;
        let tx = db::begin_write(&self.pool).await?;
        let entry = AuditEntry::new(
            Some(actor.id),
            AuditAction::Logout,
            ResourceType::User,
            Some(actor.id),
        );
        self.commit_audited(tx, entry).await?;
        info!(actor_id = actor.id, "session closed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Patients
    // -----------------------------------------------------------------------

    /// Search patients by name. Only plaintext columns are read.
    #[instrument(skip_all)]
    pub async fn search_patients(
        &self,
        caller: Option<&Actor>,
        query: &str,
    ) -> Result<Vec<PatientSummary>, AccessError> {
        let actor = authorize(caller, Permission::PatientRecords)?;
        let query = query.trim();

        let mut tx = db::begin_write(&self.pool).await?;
        let rows = patients::search(&mut tx, query).await?;
        let entry = AuditEntry::new(Some(actor.id), AuditAction::Read, ResourceType::Patient, None)
            .with("query", query);
        self.commit_audited(tx, entry).await?;

        Ok(rows
            .into_iter()
            .map(|r| PatientSummary {
                id: r.id,
                first_name: r.first_name,
                last_name: r.last_name,
                dob: r.dob,
                gender: r.gender.as_deref().and_then(Gender::parse),
            })
            .collect())
    }

    #[instrument(skip_all)]
    pub async fn create_patient(
        &self,
        caller: Option<&Actor>,
        input: PatientInput,
    ) -> Result<PatientView, AccessError> {
        let actor = authorize(caller, Permission::PatientRecords)?;
        let input = validate_patient(input)?;
        let sealed = self.seal_patient(&input)?;
        let now = Utc::now();

        let mut tx = db::begin_write(&self.pool).await?;
        let id = patients::insert(&mut tx, &sealed, now).await?;
        let entry = AuditEntry::new(
            Some(actor.id),
            AuditAction::Create,
            ResourceType::Patient,
            Some(id),
        );
        self.commit_audited(tx, entry).await?;
        info!(actor_id = actor.id, patient_id = id, "patient created");

        Ok(patient_view_from_input(id, input, now, now))
    }

    /// Fetch one patient with its visits, protected attributes decrypted.
    #[instrument(skip_all, fields(patient_id = patient_id))]
    pub async fn get_patient(
        &self,
        caller: Option<&Actor>,
        patient_id: i64,
    ) -> Result<PatientView, AccessError> {
        let actor = authorize(caller, Permission::PatientRecords)?;

        let mut tx = db::begin_write(&self.pool).await?;
        let row = patients::find(&mut tx, patient_id)
            .await?
            .ok_or_else(|| patient_not_found(patient_id))?;
        let visit_rows = visits::list_for_patient(&mut tx, patient_id).await?;
        let entry = AuditEntry::new(
            Some(actor.id),
            AuditAction::Read,
            ResourceType::Patient,
            Some(patient_id),
        )
        .with("visits", visit_rows.len());
        self.commit_audited(tx, entry).await?;

        let visits = visit_rows
            .into_iter()
            .map(|v| self.visit_view(v))
            .collect();
        Ok(self.patient_view(row, visits))
    }

    /// Replace every attribute of a patient. Protected attributes are
    /// re-sealed whole; omitted ones are cleared.
    #[instrument(skip_all, fields(patient_id = patient_id))]
    pub async fn update_patient(
        &self,
        caller: Option<&Actor>,
        patient_id: i64,
        input: PatientInput,
    ) -> Result<(), AccessError> {
        let actor = authorize(caller, Permission::PatientRecords)?;
        let input = validate_patient(input)?;
        let sealed = self.seal_patient(&input)?;

        let mut tx = db::begin_write(&self.pool).await?;
        if !patients::update(&mut tx, patient_id, &sealed, Utc::now()).await? {
            return Err(patient_not_found(patient_id));
        }
        let entry = AuditEntry::new(
            Some(actor.id),
            AuditAction::Update,
            ResourceType::Patient,
            Some(patient_id),
        );
        self.commit_audited(tx, entry).await?;
        info!(actor_id = actor.id, patient_id, "patient updated");
        Ok(())
    }

    /// Delete a patient and, explicitly and in the same transaction, its visits.
    #[instrument(skip_all, fields(patient_id = patient_id))]
    pub async fn delete_patient(
        &self,
        caller: Option<&Actor>,
        patient_id: i64,
    ) -> Result<(), AccessError> {
        let actor = authorize(caller, Permission::PatientRecords)?;

        let mut tx = db::begin_write(&self.pool).await?;
        if !patients::exists(&mut tx, patient_id).await? {
            return Err(patient_not_found(patient_id));
        }
        let visits_deleted = visits::delete_for_patient(&mut tx, patient_id).await?;
        patients::delete(&mut tx, patient_id).await?;
        let entry = AuditEntry::new(
            Some(actor.id),
            AuditAction::Delete,
            ResourceType::Patient,
            Some(patient_id),
        )
        .with("visits_deleted", visits_deleted);
        self.commit_audited(tx, entry).await?;
        info!(actor_id = actor.id, patient_id, visits_deleted, "patient deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Visits (always scoped to their patient)
    // -----------------------------------------------------------------------

    /// Add a visit to a patient; the caller is recorded as the clinician.
    #[instrument(skip_all, fields(patient_id = patient_id))]
    pub async fn create_visit(
        &self,
        caller: Option<&Actor>,
        patient_id: i64,
        input: VisitInput,
    ) -> Result<VisitView, AccessError> {
        let actor = authorize(caller, Permission::PatientRecords)?;
        let sealed = self.seal_visit(&input)?;

        let mut tx = db::begin_write(&self.pool).await?;
        if !patients::exists(&mut tx, patient_id).await? {
            return Err(patient_not_found(patient_id));
        }
        let id = visits::insert(&mut tx, patient_id, actor.id, &sealed, Utc::now()).await?;
        let entry = AuditEntry::new(
            Some(actor.id),
            AuditAction::Create,
            ResourceType::Visit,
            Some(id),
        )
        .with("patient_id", patient_id);
        self.commit_audited(tx, entry).await?;
        info!(actor_id = actor.id, patient_id, visit_id = id, "visit created");

        Ok(VisitView {
            id,
            patient_id,
            clinician_id: Some(actor.id),
            visit_date: input.visit_date,
            reason: input.reason,
            notes: input.notes,
        })
    }

    #[instrument(skip_all, fields(patient_id = patient_id, visit_id = visit_id))]
    pub async fn get_visit(
        &self,
        caller: Option<&Actor>,
        patient_id: i64,
        visit_id: i64,
    ) -> Result<VisitView, AccessError> {
        let actor = authorize(caller, Permission::PatientRecords)?;

        let mut tx = db::begin_write(&self.pool).await?;
        let row = visits::find_scoped(&mut tx, patient_id, visit_id)
            .await?
            .ok_or_else(|| visit_not_found(patient_id, visit_id))?;
        let entry = AuditEntry::new(
            Some(actor.id),
            AuditAction::Read,
            ResourceType::Visit,
            Some(visit_id),
        )
        .with("patient_id", patient_id);
        self.commit_audited(tx, entry).await?;

        Ok(self.visit_view(row))
    }

    #[instrument(skip_all, fields(patient_id = patient_id, visit_id = visit_id))]
    pub async fn update_visit(
        &self,
        caller: Option<&Actor>,
        patient_id: i64,
        visit_id: i64,
        input: VisitInput,
    ) -> Result<(), AccessError> {
        let actor = authorize(caller, Permission::PatientRecords)?;
        let sealed = self.seal_visit(&input)?;

        let mut tx = db::begin_write(&self.pool).await?;
        if !visits::update_scoped(&mut tx, patient_id, visit_id, &sealed).await? {
            return Err(visit_not_found(patient_id, visit_id));
        }
        let entry = AuditEntry::new(
            Some(actor.id),
            AuditAction::Update,
            ResourceType::Visit,
            Some(visit_id),
        )
        .with("patient_id", patient_id);
        self.commit_audited(tx, entry).await?;
        info!(actor_id = actor.id, patient_id, visit_id, "visit updated");
        Ok(())
    }

    /// Delete a visit. A visit that belongs to another patient is not found.
    #[instrument(skip_all, fields(patient_id = patient_id, visit_id = visit_id))]
    pub async fn delete_visit(
        &self,
        caller: Option<&Actor>,
        patient_id: i64,
        visit_id: i64,
    ) -> Result<(), AccessError> {
        let actor = authorize(caller, Permission::PatientRecords)?;

        let mut tx = db::begin_write(&self.pool).await?;
        if !visits::delete_scoped(&mut tx, patient_id, visit_id).await? {
            return Err(visit_not_found(patient_id, visit_id));
        }
        let entry = AuditEntry::new(
            Some(actor.id),
            AuditAction::Delete,
            ResourceType::Visit,
            Some(visit_id),
        )
        .with("patient_id", patient_id);
        self.commit_audited(tx, entry).await?;
        info!(actor_id = actor.id, patient_id, visit_id, "visit deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Audit trail
    // -----------------------------------------------------------------------

    /// Most recent audit events, newest first.
    ///
    /// `limit` is clamped to `1..=audit_page_limit`; `None` means the maximum.
    pub async fn recent_audit_events(
        &self,
        caller: Option<&Actor>,
        limit: Option<u32>,
    ) -> Result<Vec<AuditEvent>, AccessError> {
        authorize(caller, Permission::AuditTrail)?;
        let limit = limit
            .unwrap_or(self.audit_page_limit)
            .clamp(1, self.audit_page_limit);
        let mut conn = self.pool.acquire().await?;
        self.audit
            .recent(&mut conn, limit)
            .await
            .map_err(AccessError::AuditRead)
    }

    /// Recompute the audit hash chain end to end.
    pub async fn verify_audit_chain(
        &self,
        caller: Option<&Actor>,
    ) -> Result<ChainVerification, AccessError> {
        authorize(caller, Permission::AuditTrail)?;
        let mut conn = self.pool.acquire().await?;
        self.audit
            .verify_chain(&mut conn)
            .await
            .map_err(AccessError::AuditRead)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Append `entry` on `tx` and commit. On append failure `tx` is dropped,
    /// rolling back everything done on it.
    async fn commit_audited(
        &self,
        mut tx: Transaction<'static, Sqlite>,
        entry: AuditEntry,
    ) -> Result<(), AccessError> {
        let action = entry.action;
        let resource_type = entry.resource_type;
        if let Err(e) = self.audit.record(&mut tx, entry).await {
            error!(
                error = %e,
                %action,
                %resource_type,
                "audit append failed; rolling back operation"
            );
            return Err(AccessError::AuditWrite(e));
        }
        tx.commit().await?;
        Ok(())
    }

    fn seal_patient(&self, input: &PatientInput) -> Result<SealedPatient, AccessError> {
        Ok(SealedPatient {
            first_name: input.first_name.clone(),
            last_name: input.last_name.clone(),
            dob: input.dob,
            gender: input.gender.map(|g| g.as_str()),
            address_enc: self.cipher.encrypt(input.address.as_deref())?,
            phone_enc: self.cipher.encrypt(input.phone.as_deref())?,
            medical_history_enc: self.cipher.encrypt(input.medical_history.as_deref())?,
        })
    }

    fn seal_visit(&self, input: &VisitInput) -> Result<SealedVisit, AccessError> {
        Ok(SealedVisit {
            visit_date: input.visit_date,
            reason_enc: self.cipher.encrypt(input.reason.as_deref())?,
            notes_enc: self.cipher.encrypt(input.notes.as_deref())?,
        })
    }

    fn patient_view(&self, row: PatientRow, visits: Vec<VisitView>) -> PatientView {
        let address = self.cipher.decrypt(row.address_enc.as_deref());
        let phone = self.cipher.decrypt(row.phone_enc.as_deref());
        let medical_history = self.cipher.decrypt(row.medical_history_enc.as_deref());
        let failed = [&address, &phone, &medical_history]
            .into_iter()
            .filter(|d| decrypt_failed(d))
            .count();
        if failed > 0 {
            warn!(patient_id = row.id, failed, "protected patient fields failed to decrypt");
        }

        PatientView {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            dob: row.dob,
            gender: row.gender.as_deref().and_then(Gender::parse),
            address: address.map(|d| d.into_display()),
            phone: phone.map(|d| d.into_display()),
            medical_history: medical_history.map(|d| d.into_display()),
            created_at: row.created_at,
            updated_at: row.updated_at,
            visits,
        }
    }

    fn visit_view(&self, row: VisitRow) -> VisitView {
        let reason = self.cipher.decrypt(row.reason_enc.as_deref());
        let notes = self.cipher.decrypt(row.notes_enc.as_deref());
        if decrypt_failed(&reason) || decrypt_failed(&notes) {
            warn!(visit_id = row.id, "protected visit fields failed to decrypt");
        }

        VisitView {
            id: row.id,
            patient_id: row.patient_id,
            clinician_id: row.clinician_id,
            visit_date: row.visit_date,
            reason: reason.map(|d| d.into_display()),
            notes: notes.map(|d| d.into_display()),
        }
    }
}

fn decrypt_failed(value: &Option<Decrypted>) -> bool {
    value.as_ref().is_some_and(Decrypted::is_failed)
}

fn validate_patient(mut input: PatientInput) -> Result<PatientInput, AccessError> {
    input.first_name = validate_name("first_name", &input.first_name)?;
    input.last_name = validate_name("last_name", &input.last_name)?;
    Ok(input)
}

fn validate_name(field: &str, value: &str) -> Result<String, AccessError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AccessError::Invalid(format!("{field} is required")));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(AccessError::Invalid(format!(
            "{field} must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_owned())
}

fn patient_view_from_input(
    id: i64,
    input: PatientInput,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
) -> PatientView {
    PatientView {
        id,
        first_name: input.first_name,
        last_name: input.last_name,
        dob: input.dob,
        gender: input.gender,
        address: input.address,
        phone: input.phone,
        medical_history: input.medical_history,
        created_at,
        updated_at,
        visits: Vec::new(),
    }
}

fn patient_not_found(patient_id: i64) -> AccessError {
    AccessError::NotFound(format!("patient {patient_id}"))
}

fn visit_not_found(patient_id: i64, visit_id: i64) -> AccessError {
    AccessError::NotFound(format!("visit {visit_id} of patient {patient_id}"))
}
