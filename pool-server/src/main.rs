use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod routes;

use config::ServerConfig;

/// pool-server - HTTP front-end for the whisper-server worker pool manager
#[derive(Parser)]
#[command(name = "pool-server")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file. Defaults to
    /// `~/.pool-server/config.toml` if it exists.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind the HTTP listener to, overriding the config file.
    #[arg(short, long)]
    bind: Option<String>,

    /// Enable verbose (debug) logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(ServerConfig::default_path);
    let config = ServerConfig::load(Some(&config_path), cli.bind.as_deref())?;

    let manager = pool_core::PoolManager::new(config.pool.clone());
    manager.init().await?;

    let app = routes::router(manager.clone());
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "pool-server listening");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, draining pool");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    manager.dispose().await;
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
