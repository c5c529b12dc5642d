//! gangway-server: session-multiplexed terminal tunnel.
//!
//! Accepts WebSocket connections and bridges each one to an interactive
//! shell on a pseudo-terminal, injecting a per-session remote-host alias
//! configuration for the secure-shell client.

mod config;
mod events;
mod server;
mod session;
mod transport;

use clap::Parser;
use config::ServerConfig;
use events::LogEvents;
use server::GangwayServer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// gangway-server: terminal tunnel server
#[derive(Parser, Debug)]
#[command(name = "gangway-server", version, about = "Terminal tunnel server")]
struct Cli {
    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Shell to spawn for each session (default: $SHELL)
    #[arg(long)]
    shell: Option<String>,

    /// Config file path
    #[arg(long, default_value = "~/.gangway/config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting gangway-server");

    let config_path = PathBuf::from(&cli.config);
    let server_config =
        match ServerConfig::load(Some(&config_path), cli.port, cli.shell.as_deref()) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!(error = %e, "failed to load config");
                std::process::exit(1);
            }
        };

    let server = GangwayServer::new(server_config, Arc::new(LogEvents));

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    info!("gangway-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
