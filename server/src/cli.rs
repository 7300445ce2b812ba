use clap::Parser;

/// QR attendance token server.
#[derive(Debug, Parser)]
#[command(name = "qr-server", version, about)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,

    /// Override `database.path` from the config file.
    #[arg(long)]
    pub database: Option<String>,
}
