pub mod config;

pub use self::config::{load_config, parse_config};

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::types::qr::TokenClass;
use crate::types::server_config::{AppConfig, ConfigError};

/// A cheaply-cloneable, live config handle.
///
/// All clones share the same underlying `RwLock<AppConfig>`, so a call to
/// [`LiveConfig::reload`] is immediately visible to every request handler
/// holding a clone.
///
/// Only the class TTLs are actually re-read per request; the signing secret,
/// `max_ttl_secs`, listener addresses and database path are fixed at startup.
///
/// # Usage
/// ```rust,no_run
/// // Read (short-lived guard, do not hold across .await points)
/// // let ttl = state.config.read().await.qr.ttl_for(TokenClass::Session);
///
/// // Hot-reload from the SIGHUP handler
/// // state.config.reload(new_app_config).await?;
/// ```
#[derive(Clone, Debug)]
pub struct LiveConfig(Arc<RwLock<AppConfig>>);

impl LiveConfig {
    /// Wrap an `AppConfig` in a new `LiveConfig`.
    pub fn new(config: AppConfig) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    /// Acquire a read guard. Keep it short-lived; never hold across `.await`.
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, AppConfig> {
        self.0.read().await
    }

    /// Swap in a reloaded config.  All existing clones see the new class
    /// TTLs on their next `.read()` call.
    ///
    /// The class TTLs must fit the running `max_ttl_secs`, since that is the
    /// bound the issuer enforces; otherwise the reload is refused and nothing
    /// changes.  Startup-only values (listeners, database, `max_ttl_secs`,
    /// secret) are carried over from the running config, with a warning when
    /// the new file tries to change them.
    pub async fn reload(&self, mut new: AppConfig) -> Result<(), ConfigError> {
        let mut current = self.0.write().await;

        for (class, name) in [
            (TokenClass::Session, "session_ttl_secs"),
            (TokenClass::Attendance, "attendance_ttl_secs"),
        ] {
            if new.qr.ttl_for(class) > current.qr.max_ttl() {
                return Err(ConfigError::InvalidConfig(format!(
                    "{} exceeds the running max_ttl_secs ({})",
                    name, current.qr.max_ttl_secs
                )));
            }
        }

        if new.qr.max_ttl_secs != current.qr.max_ttl_secs {
            warn!("max_ttl_secs changed; restart the server to apply it");
        }
        // `current.qr.secret` holds the secret resolved at startup.
        if new.qr.resolved_secret() != current.qr.secret {
            warn!("QR signing secret changed; restart the server to apply it");
        }
        if new.database.path != current.database.path {
            warn!("database.path changed; restart the server to apply it");
        }
        if new.server.client_addr() != current.server.client_addr()
            || new.server.admin_addr() != current.server.admin_addr()
        {
            warn!("listener addresses changed; restart the server to apply them");
        }

        new.qr.max_ttl_secs = current.qr.max_ttl_secs;
        new.qr.secret = current.qr.secret.clone();
        new.database = current.database.clone();
        new.server.bind = current.server.bind.clone();
        new.server.port_admin = current.server.port_admin;
        new.server.port_client = current.server.port_client;

        *current = new;
        Ok(())
    }
}
