//! Axum HTTP server, routing, and middleware.
//!
//! The identity provider is represented by two trusted request headers; the
//! handlers turn them into an explicit caller for the access layer.

pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
