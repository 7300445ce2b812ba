pub mod cli;
pub mod database;
pub mod handlers;
pub mod qr;

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpListener;
use tracing::{error, info};

use shared::config::LiveConfig;
use shared::types::AppConfig;

use crate::handlers::http::routes::Router;
use crate::qr::{IssuanceService, RedemptionService, ReplayStore, SqliteReplayStore};

/// Everything a request handler needs.  Cheap to clone per connection.
#[derive(Clone)]
pub struct AppState {
    pub config: LiveConfig,
    pub issuer: Arc<IssuanceService>,
    pub redeemer: Arc<RedemptionService>,
}

impl AppState {
    pub fn new(config: LiveConfig, issuer: IssuanceService, redeemer: RedemptionService) -> Self {
        Self {
            config,
            issuer: Arc::new(issuer),
            redeemer: Arc::new(redeemer),
        }
    }

    /// Open the replay database named in `config` and build the QR services.
    pub async fn from_config(mut config: AppConfig) -> Result<Self> {
        let secret = config
            .qr
            .resolved_secret()
            .ok_or_else(|| anyhow!("QR signing secret is not configured"))?;

        let conn = database::open_database(&config.database.path, config.database.busy_timeout())
            .await
            .with_context(|| format!("Failed to open database {}", config.database.path))?;
        info!("Replay store ready at {}", config.database.path);

        let store: Arc<dyn ReplayStore> = Arc::new(SqliteReplayStore::new(conn));
        let (issuer, redeemer) = qr::build_services(secret.as_bytes(), store, config.qr.max_ttl());

        // Keep the key actually in use, so reloads can tell when it changes.
        config.qr.secret = Some(secret);

        Ok(Self::new(LiveConfig::new(config), issuer, redeemer))
    }
}

/// Accept connections forever, one task per connection.
pub async fn serve(listener: TcpListener, router: Arc<Router>, state: AppState) -> Result<()> {
    let local = listener.local_addr().context("Listener has no local address")?;
    info!("Listening on http://{}", local);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to accept connection on {}: {}", local, e);
                continue;
            }
        };

        let io = TokioIo::new(stream);
        let router = router.clone();
        let state = state.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let router = router.clone();
                let state = state.clone();
                async move { Ok::<_, Infallible>(router.dispatch(req, state).await) }
            });

            if let Err(err) = http1::Builder::new()
                .timer(TokioTimer::new())
                .serve_connection(io, service)
                .await
            {
                error!("Error serving connection from {}: {:?}", peer, err);
            }
        });
    }
}
