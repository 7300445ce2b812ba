use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use server::cli::Cli;
use server::handlers::http::routes::{admin_router, client_router};
use server::{AppState, serve};
use shared::config::load_config;
use shared::types::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load(&cli)?;

    let admin_addr = config.server.admin_addr();
    let client_addr = config.server.client_addr();

    let state = AppState::from_config(config).await?;

    let admin_listener = TcpListener::bind(&admin_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", admin_addr))?;
    let client_listener = TcpListener::bind(&client_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", client_addr))?;

    // Issuing lives on its own port so it can stay behind the gateway while
    // scanners reach the redemption port directly.
    info!(
        "Listening on http://{} and (issuing) http://{}",
        client_addr, admin_addr
    );

    let admin_serv = tokio::spawn(serve(
        admin_listener,
        Arc::new(admin_router()),
        state.clone(),
    ));
    let client_serv = tokio::spawn(serve(
        client_listener,
        Arc::new(client_router()),
        state.clone(),
    ));

    #[cfg(unix)]
    tokio::spawn(reload_on_sighup(cli.config.clone(), cli.database.clone(), state.config.clone()));

    tokio::select! {
        res = admin_serv => log_exit("issuing", res),
        res = client_serv => log_exit("redemption", res),
        _ = tokio::signal::ctrl_c() => info!("Ctrl-C received, shutting down"),
    }

    info!("Both servers closed!");
    Ok(())
}

/// Load the config file and apply command-line overrides.
fn load(cli: &Cli) -> Result<AppConfig> {
    let mut config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config))?;
    if let Some(path) = &cli.database {
        info!("Database path overridden on the command line: {}", path);
        config.database.path = path.clone();
    }
    Ok(config)
}

fn log_exit(name: &str, res: Result<Result<()>, tokio::task::JoinError>) {
    match res {
        Ok(Ok(())) => info!("{} server stopped", name),
        Ok(Err(e)) => error!("{} server failed: {:#}", name, e),
        Err(e) => error!("{} server task panicked: {}", name, e),
    }
}

/// Re-read the config file on every SIGHUP.  Only the class TTLs take effect;
/// the secret, `max_ttl_secs`, listeners and database stay as started.
#[cfg(unix)]
async fn reload_on_sighup(
    path: String,
    database: Option<String>,
    live: shared::config::LiveConfig,
) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            warn!("Cannot listen for SIGHUP, hot reload disabled: {}", e);
            return;
        }
    };

    while hup.recv().await.is_some() {
        info!("SIGHUP received, reloading {}", path);
        let mut new = match load_config(&path) {
            Ok(c) => c,
            Err(e) => {
                error!("Reload rejected, keeping current config: {}", e);
                continue;
            }
        };
        if let Some(db) = &database {
            new.database.path = db.clone();
        }

        if let Err(e) = live.reload(new).await {
            error!("Reload rejected, keeping current config: {}", e);
            continue;
        }
        info!("Configuration reloaded");
    }
}
