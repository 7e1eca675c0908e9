//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use axum::http::HeaderMap;

use crate::access::{Actor, RecordAccess, Role};

/// Application state shared across all request handlers.
///
/// All fields are cheaply cloneable so Axum can clone the state per request.
#[derive(Clone)]
pub struct AppState {
    /// The record access layer; every patient, visit and audit route goes through it.
    pub records: RecordAccess,
    /// Trusted header carrying the caller's numeric id.
    pub actor_id_header: Arc<String>,
    /// Trusted header carrying the caller's role.
    pub actor_role_header: Arc<String>,
}

impl AppState {
    pub fn new(records: RecordAccess, actor_id_header: String, actor_role_header: String) -> Self {
        Self {
            records,
            actor_id_header: Arc::new(actor_id_header),
            actor_role_header: Arc::new(actor_role_header),
        }
    }

    /// The caller vouched for by the identity headers.
    ///
    /// A missing, non-ASCII or malformed id or role yields `None`, which the
    /// access layer treats as unauthenticated.
    pub fn caller(&self, headers: &HeaderMap) -> Option<Actor> {
        let id = headers
            .get(self.actor_id_header.as_str())?
            .to_str()
            .ok()?
            .trim()
            .parse::<i64>()
            .ok()?;
        let role = Role::parse(headers.get(self.actor_role_header.as_str())?.to_str().ok()?)?;
        Some(Actor::new(id, role))
    }
}
