//! Shared fixtures for unit tests.

use sqlx::SqlitePool;

use crate::access::{Actor, RecordAccess, Role};
use crate::audit::AuditRecorder;
use crate::crypto::{key::KEY_LEN, FieldCipher, KeyMaterial};
use crate::db;

pub const TEST_KEY: [u8; KEY_LEN] = [7u8; KEY_LEN];

pub const ADMIN: Actor = Actor {
    id: 1,
    role: Role::Admin,
};

pub const CLINICIAN: Actor = Actor {
    id: 2,
    role: Role::Clinician,
};

/// A [`RecordAccess`] over a fresh in-memory store keyed with [`TEST_KEY`].
pub async fn record_access() -> RecordAccess {
    record_access_on(db::memory_pool().await, &TEST_KEY)
}

/// A [`RecordAccess`] over an existing pool with its own key.
pub fn record_access_on(pool: SqlitePool, key: &[u8; KEY_LEN]) -> RecordAccess {
    let key = KeyMaterial::from_bytes(key).unwrap();
    RecordAccess::new(
        pool,
        FieldCipher::new(&key).unwrap(),
        AuditRecorder::from_field_key(&key).unwrap(),
        500,
    )
}
