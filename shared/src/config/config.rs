use std::fs;
use tracing::{debug, error, info};

use crate::types::server_config::{AppConfig, ConfigError, MIN_SECRET_LEN};
use crate::types::qr::TokenClass;

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    info!("Loading configuration from: {}", path);

    let contents = fs::read_to_string(path)?;
    debug!("Processing file: {}", path);

    parse_config(&contents)
}

/// Parse and validate a config document.  Split out of [`load_config`] so
/// SIGHUP reloads and tests share the exact same checks.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    if contents.trim().is_empty() {
        error!("Configuration file is empty");
        return Err(ConfigError::InvalidConfig("empty file".into()));
    }

    let config: AppConfig = toml::from_str(contents)?;

    // The secret is deliberately not printed.
    debug!(
        "Config: server={:?} database={:?} session_ttl={}s attendance_ttl={}s max_ttl={}s",
        config.server,
        config.database,
        config.qr.session_ttl_secs,
        config.qr.attendance_ttl_secs,
        config.qr.max_ttl_secs
    );

    validate_config(&config)?;

    info!("Config validated");

    Ok(config)
}

fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.bind.is_empty() {
        return Err(ConfigError::InvalidConfig("bind cannot be empty".into()));
    }

    if config.server.max_body_bytes == 0 {
        return Err(ConfigError::InvalidConfig(
            "max_body_bytes must be greater than 0".into(),
        ));
    }

    if config.database.path.is_empty() {
        return Err(ConfigError::InvalidConfig(
            "database.path cannot be empty".into(),
        ));
    }

    if config.qr.max_ttl_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "max_ttl_secs must be greater than 0".into(),
        ));
    }

    for (class, name) in [
        (TokenClass::Session, "session_ttl_secs"),
        (TokenClass::Attendance, "attendance_ttl_secs"),
    ] {
        let ttl = config.qr.ttl_for(class);
        if ttl.is_zero() {
            return Err(ConfigError::InvalidConfig(format!(
                "{} must be greater than 0",
                name
            )));
        }
        if ttl > config.qr.max_ttl() {
            return Err(ConfigError::InvalidConfig(format!(
                "{} must not exceed max_ttl_secs",
                name
            )));
        }
    }

    // Checked here too so a SIGHUP reload with a bad secret is refused.
    match config.qr.resolved_secret() {
        None => {
            return Err(ConfigError::InvalidConfig(
                "secret must be set via the QR_TOKEN_SECRET env var or qr.secret config field"
                    .into(),
            ));
        }
        Some(secret) if secret.len() < MIN_SECRET_LEN => {
            return Err(ConfigError::InvalidConfig(format!(
                "secret must be at least {} bytes long",
                MIN_SECRET_LEN
            )));
        }
        _ => {}
    }

    Ok(())
}
