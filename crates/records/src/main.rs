//! `records`: patient records service entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (tracing + optional OTLP).
//! 3. Decode the field key and build the [`FieldCipher`] and [`AuditRecorder`].
//! 4. Open the record store and bring its schema up to date.
//! 5. Build the Axum router around [`RecordAccess`] and start serving.

mod access;
mod audit;
mod config;
mod crypto;
mod db;
mod server;
mod telemetry;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use tracing::info;

use access::RecordAccess;
use audit::AuditRecorder;
use config::Config;
use crypto::FieldCipher;
use server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        "records starting"
    );

    // -----------------------------------------------------------------------
    // 3. Key material
    // -----------------------------------------------------------------------
    let field_key = cfg.field_key()?;
    let cipher = FieldCipher::new(&field_key).context("failed to initialise field cipher")?;
    let audit = AuditRecorder::from_field_key(&field_key)
        .context("failed to derive audit chain key")?;
    drop(field_key);

    // -----------------------------------------------------------------------
    // 4. Record store
    // -----------------------------------------------------------------------
    let pool = db::connect(&cfg.database_url, cfg.database_max_connections)
        .await
        .context("failed to open record store")?;

    // -----------------------------------------------------------------------
    // 5. HTTP server
    // -----------------------------------------------------------------------
    let records = RecordAccess::new(pool, cipher, audit, cfg.audit_page_limit);
    let state = AppState::new(
        records,
        cfg.actor_id_header.clone(),
        cfg.actor_role_header.clone(),
    );
    let router = server::router::build(state);

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
