//! Audit recorder: append-only, hash-chained trail of every mediated access.
//!
//! # Lifecycle
//!
//! 1. The access layer opens a store transaction and performs its domain work.
//! 2. It calls [`AuditRecorder::record`] on the **same** connection.
//! 3. Only then is the transaction committed; if the append fails the caller
//!    drops the transaction and the domain work rolls back with it.
//!
//! # Invariants
//!
//! - Events are never updated or deleted (enforced by store triggers).
//! - Timestamps strictly increase: a new event is stamped at least one
//!   microsecond after the chain tip, so timestamp order is insertion order.
//! - Metadata holds ids, counts and search terms on plaintext columns only;
//!   protected values never reach this module.

pub mod chain;

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use common::protocol::{AuditEventView, ChainVerification};
use hmac::Mac;
use serde_json::{Map, Value};
use sqlx::SqliteConnection;
use thiserror::Error;
use tracing::{debug, warn};

use crate::crypto::{KeyError, KeyMaterial};
use crate::db::audit_events::{self, AuditEventRow, NewAuditEvent};
use chain::{link_hash, verify_link, ChainMac, LinkFields, GENESIS_HASH};

/// Label under which the chain key is derived from the field key.
pub const CHAIN_KEY_LABEL: &[u8] = b"records/audit-chain/v1";

/// Kind of access being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Read,
    Create,
    Update,
    Delete,
    Login,
    Logout,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Read => "read",
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Login => "login",
            AuditAction::Logout => "logout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(AuditAction::Read),
            "create" => Some(AuditAction::Create),
            "update" => Some(AuditAction::Update),
            "delete" => Some(AuditAction::Delete),
            "login" => Some(AuditAction::Login),
            "logout" => Some(AuditAction::Logout),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of resource an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Patient,
    Visit,
    User,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Patient => "patient",
            ResourceType::Visit => "visit",
            ResourceType::User => "user",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event about to be appended.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub actor_id: Option<i64>,
    pub action: AuditAction,
    pub resource_type: ResourceType,
    pub resource_id: Option<i64>,
    pub metadata: Map<String, Value>,
}

impl AuditEntry {
    pub fn new(
        actor_id: Option<i64>,
        action: AuditAction,
        resource_type: ResourceType,
        resource_id: Option<i64>,
    ) -> Self {
        Self {
            actor_id,
            action,
            resource_type,
            resource_id,
            metadata: Map::new(),
        }
    }

    /// Attach one metadata key.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_owned(), value.into());
        self
    }
}

/// A stored event read back from the trail.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    /// Insertion sequence number.
    pub id: i64,
    pub actor_id: Option<i64>,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    fn from_row(row: AuditEventRow) -> Result<Self, AuditError> {
        let corrupt = |reason: &str| AuditError::Corrupt {
            id: row.id,
            reason: reason.to_owned(),
        };
        let action = AuditAction::parse(&row.action).ok_or_else(|| corrupt("unknown action"))?;
        let metadata =
            serde_json::from_str(&row.metadata).map_err(|_| corrupt("metadata is not JSON"))?;
        let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
            .map_err(|_| corrupt("timestamp is not RFC 3339"))?
            .with_timezone(&Utc);
        Ok(Self {
            id: row.id,
            actor_id: row.actor_id,
            action,
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            metadata,
            timestamp,
        })
    }

    pub fn into_view(self) -> AuditEventView {
        AuditEventView {
            id: self.id,
            actor_id: self.actor_id,
            action: self.action.as_str().to_owned(),
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            metadata: self.metadata,
            timestamp: self.timestamp,
        }
    }
}

/// Errors produced by the audit layer.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The event could not be appended to the store.
    #[error("audit append failed: {0}")]
    Append(#[source] sqlx::Error),

    /// Reading the trail failed.
    #[error("audit query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// Metadata could not be serialised.
    #[error("audit metadata could not be serialised: {0}")]
    Metadata(#[from] serde_json::Error),

    /// A stored event could not be decoded.
    #[error("audit event {id} is corrupt: {reason}")]
    Corrupt { id: i64, reason: String },
}

/// Appends events to, and reads them back from, the audit trail.
///
/// Holds the keyed chain MAC built once at startup; cloning is cheap.
#[derive(Clone)]
pub struct AuditRecorder {
    mac: ChainMac,
}

impl AuditRecorder {
    /// Build a recorder whose chain is keyed by `chain_key`.
    pub fn new(chain_key: &KeyMaterial) -> Result<Self, KeyError> {
        let mac = ChainMac::new_from_slice(chain_key.as_bytes()).map_err(|_| KeyError::Derivation)?;
        Ok(Self { mac })
    }

    /// Derive the chain key from the field key and build a recorder.
    pub fn from_field_key(field_key: &KeyMaterial) -> Result<Self, KeyError> {
        Self::new(&field_key.derive(CHAIN_KEY_LABEL)?)
    }

    /// Append one event on `conn`, returning its sequence number.
    ///
    /// Durable only once the caller commits the surrounding transaction.
    pub async fn record(
        &self,
        conn: &mut SqliteConnection,
        entry: AuditEntry,
    ) -> Result<i64, AuditError> {
        let metadata = serde_json::to_string(&Value::Object(entry.metadata))?;
        let tip = audit_events::tip(&mut *conn)
            .await
            .map_err(AuditError::Append)?;

        let now = Utc::now().trunc_subsecs(6);
        let (prev_hash, stamped) = match tip {
            Some(tip) => {
                let stamped = match DateTime::parse_from_rfc3339(&tip.timestamp) {
                    Ok(last) => now.max(last.with_timezone(&Utc) + Duration::microseconds(1)),
                    Err(_) => now,
                };
                (tip.hash, stamped)
            }
            None => (GENESIS_HASH.to_owned(), now),
        };
        let timestamp = format_timestamp(stamped);
        let resource_id = entry.resource_id.map(|id| id.to_string());

        let fields = LinkFields {
            actor_id: entry.actor_id,
            action: entry.action.as_str(),
            resource_type: entry.resource_type.as_str(),
            resource_id: resource_id.as_deref(),
            metadata: &metadata,
            timestamp: &timestamp,
        };
        let hash = link_hash(&self.mac, &prev_hash, &fields);

        let id = audit_events::insert(
            &mut *conn,
            &NewAuditEvent {
                actor_id: fields.actor_id,
                action: fields.action,
                resource_type: fields.resource_type,
                resource_id: fields.resource_id,
                metadata: fields.metadata,
                timestamp: fields.timestamp,
                prev_hash: &prev_hash,
                hash: &hash,
            },
        )
        .await
        .map_err(AuditError::Append)?;

        debug!(
            audit_id = id,
            action = %entry.action,
            resource_type = %entry.resource_type,
            "audit event appended"
        );
        Ok(id)
    }

    /// The `limit` most recent events, newest first.
    pub async fn recent(
        &self,
        conn: &mut SqliteConnection,
        limit: u32,
    ) -> Result<Vec<AuditEvent>, AuditError> {
        audit_events::recent(conn, i64::from(limit))
            .await
            .map_err(AuditError::Query)?
            .into_iter()
            .map(AuditEvent::from_row)
            .collect()
    }

    /// Walk the whole trail in insertion order and check every link.
    ///
    /// Stops at the first event whose `prev_hash` does not match its
    /// predecessor or whose own hash does not recompute.
    pub async fn verify_chain(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<ChainVerification, AuditError> {
        let rows = audit_events::all_in_sequence(conn)
            .await
            .map_err(AuditError::Query)?;

        let mut expected_prev = GENESIS_HASH.to_owned();
        let mut checked = 0u64;
        for row in rows {
            checked += 1;
            let fields = LinkFields {
                actor_id: row.actor_id,
                action: &row.action,
                resource_type: &row.resource_type,
                resource_id: row.resource_id.as_deref(),
                metadata: &row.metadata,
                timestamp: &row.timestamp,
            };
            let linked = row.prev_hash == expected_prev;
            if !linked || !verify_link(&self.mac, &row.prev_hash, &fields, &row.hash) {
                warn!(audit_id = row.id, "audit chain broken");
                return Ok(ChainVerification {
                    intact: false,
                    events_checked: checked,
                    first_broken_id: Some(row.id),
                });
            }
            expected_prev = row.hash;
        }

        Ok(ChainVerification {
            intact: true,
            events_checked: checked,
            first_broken_id: None,
        })
    }
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuditRecorder([REDACTED])")
    }
}

/// Fixed-width UTC form, so text order in the store equals time order.
fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}
