//! Configuration loading and validation for the records service.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any required variable is missing or invalid.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::crypto::KeyMaterial;

/// Validated service configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Base64 encoding of the 32-byte field key. **Required.**
    pub field_key: String,

    /// SQLite database URL.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Upper bound on pooled store connections.
    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,

    /// Port the HTTP server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Trusted header carrying the caller's id.
    #[serde(default = "default_actor_id_header")]
    pub actor_id_header: String,

    /// Trusted header carrying the caller's role.
    #[serde(default = "default_actor_role_header")]
    pub actor_role_header: String,

    /// Most audit events returned by one query.
    #[serde(default = "default_audit_page_limit")]
    pub audit_page_limit: u32,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OTLP endpoint for span export; spans stay local when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,
}

fn default_database_url() -> String {
    "sqlite://records.db".into()
}
fn default_database_max_connections() -> u32 {
    5
}
fn default_listen_port() -> u16 {
    8080
}
fn default_actor_id_header() -> String {
    "X-Actor-Id".into()
}
fn default_actor_role_header() -> String {
    "X-Actor-Role".into()
}
fn default_audit_page_limit() -> u32 {
    500
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Decode the field key. Called once at startup.
    pub fn field_key(&self) -> Result<KeyMaterial> {
        KeyMaterial::from_base64(&self.field_key).context("FIELD_KEY is invalid")
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        self.field_key()?;
        ensure_non_empty(&self.database_url, "DATABASE_URL")?;
        ensure_non_empty(&self.actor_id_header, "ACTOR_ID_HEADER")?;
        ensure_non_empty(&self.actor_role_header, "ACTOR_ROLE_HEADER")?;

        if self.database_max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be > 0");
        }
        if self.audit_page_limit == 0 {
            anyhow::bail!("AUDIT_PAGE_LIMIT must be > 0");
        }
        if let Some(endpoint) = &self.otel_exporter_otlp_endpoint {
            ensure_non_empty(endpoint, "OTEL_EXPORTER_OTLP_ENDPOINT")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("field_key", &"[REDACTED]")
            .field("database_url", &self.database_url)
            .field("database_max_connections", &self.database_max_connections)
            .field("listen_port", &self.listen_port)
            .field("actor_id_header", &self.actor_id_header)
            .field("actor_role_header", &self.actor_role_header)
            .field("audit_page_limit", &self.audit_page_limit)
            .field("log_level", &self.log_level)
            .field("otel_exporter_otlp_endpoint", &self.otel_exporter_otlp_endpoint)
            .finish()
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // base64 of 32 bytes of 0x07
    const KEY_B64: &str = "BwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwc=";

    fn config(field_key: &str) -> Config {
        Config {
            field_key: field_key.into(),
            database_url: default_database_url(),
            database_max_connections: default_database_max_connections(),
            listen_port: default_listen_port(),
            actor_id_header: default_actor_id_header(),
            actor_role_header: default_actor_role_header(),
            audit_page_limit: default_audit_page_limit(),
            log_level: default_log_level(),
            otel_exporter_otlp_endpoint: None,
        }
    }

    #[test]
    fn defaults_are_correct() {
        assert_eq!(default_database_url(), "sqlite://records.db");
        assert_eq!(default_database_max_connections(), 5);
        assert_eq!(default_listen_port(), 8080);
        assert_eq!(default_actor_id_header(), "X-Actor-Id");
        assert_eq!(default_actor_role_header(), "X-Actor-Role");
        assert_eq!(default_audit_page_limit(), 500);
        assert_eq!(default_log_level(), "info");
    }

    #[test]
    fn validate_accepts_a_well_formed_key() {
        assert!(config(KEY_B64).validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_or_short_key() {
        assert!(config("").validate().is_err());
        assert!(config("c2hvcnQ=").validate().is_err());
        assert!(config("not base64 at all!").validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let mut cfg = config(KEY_B64);
        cfg.audit_page_limit = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = config(KEY_B64);
        cfg.database_max_connections = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn debug_redacts_the_key() {
        let rendered = format!("{:?}", config(KEY_B64));
        assert!(!rendered.contains(KEY_B64));
        assert!(rendered.contains("[REDACTED]"));
    }
}
