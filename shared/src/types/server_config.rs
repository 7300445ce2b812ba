use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::types::qr::TokenClass;

/// Environment variable that overrides `qr.secret`.
pub const SECRET_ENV_VAR: &str = "QR_TOKEN_SECRET";

/// Minimum accepted HMAC key length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_admin_port")]
    pub port_admin: Option<u16>,
    #[serde(default = "default_client_port")]
    pub port_client: Option<u16>,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// SQLite file holding the replay records.  `:memory:` is accepted but
    /// loses every record on restart.
    pub path: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QrConfig {
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_attendance_ttl")]
    pub attendance_ttl_secs: u64,
    /// Upper bound for any requested TTL.  Read once at startup.
    #[serde(default = "default_max_ttl")]
    pub max_ttl_secs: u64,
    /// HMAC key used to sign and verify QR tokens.
    ///
    /// Prefer loading this via the `QR_TOKEN_SECRET` environment variable.
    /// **Hot-reload safe:** NO — rotating it invalidates every outstanding
    /// QR code, so the server only reads it at startup.
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub qr: QrConfig,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl ServerConfig {
    /// Full bind address for the redemption server, e.g. `"0.0.0.0:1337"`
    pub fn client_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port_client.unwrap_or(1337))
    }

    /// Full bind address for the issuing (gateway-facing) server, e.g. `"127.0.0.1:1338"`
    pub fn admin_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port_admin.unwrap_or(1338))
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl QrConfig {
    /// Default TTL for a token class.
    pub fn ttl_for(&self, class: TokenClass) -> Duration {
        match class {
            TokenClass::Session => Duration::from_secs(self.session_ttl_secs),
            TokenClass::Attendance => Duration::from_secs(self.attendance_ttl_secs),
        }
    }

    pub fn max_ttl(&self) -> Duration {
        Duration::from_secs(self.max_ttl_secs)
    }

    /// Resolve the signing secret with `QR_TOKEN_SECRET` taking priority over
    /// the config file field.
    ///
    /// Returns `None` when neither source is set (startup treats this as a
    /// hard error).
    pub fn resolved_secret(&self) -> Option<String> {
        std::env::var(SECRET_ENV_VAR)
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.secret.clone())
            .filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

pub fn default_admin_port() -> Option<u16> {
    Some(1338)
}

pub fn default_client_port() -> Option<u16> {
    Some(1337)
}

pub fn default_max_body_bytes() -> usize {
    4096
}

pub fn default_busy_timeout_ms() -> u64 {
    5000
}

pub fn default_session_ttl() -> u64 {
    600
}

pub fn default_attendance_ttl() -> u64 {
    300
}

pub fn default_max_ttl() -> u64 {
    3600
}
