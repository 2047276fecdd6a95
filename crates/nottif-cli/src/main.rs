mod send;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use nottif_config::ConfigStore;
use nottif_cron::TokioCronEngine;
use nottif_gateway::Orchestrator;
use nottif_notifier::ReqwestTransport;

#[derive(Parser)]
#[command(name = "nottif", version, about = "Webhook notification service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the notification server with the HTTP API and cron scheduler
    Serve {
        /// Config file (defaults to ~/.nottif/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: IpAddr,

        /// Port to listen on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
    /// Send a single message to the webhook and exit
    Send {
        /// Message to send; read from stdin when omitted
        message: Option<String>,

        /// Webhook URL (overrides NOTTIF_WEBHOOK and the config file)
        #[arg(short, long)]
        webhook: Option<String>,

        /// Config file (defaults to ~/.nottif/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, host, port } => {
            let config_path = resolve_config_path(config)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_serve(config_path, SocketAddr::new(host, port)))?;
        }
        Commands::Send {
            message,
            webhook,
            config,
        } => {
            let config_path = resolve_config_path(config)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(send::run_send(message, webhook, &config_path))?;
        }
    }

    Ok(())
}

fn resolve_config_path(flag: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match flag {
        Some(path) => Ok(path),
        None => Ok(nottif_config::config_file_path()?),
    }
}

async fn run_serve(config_path: PathBuf, addr: SocketAddr) -> anyhow::Result<()> {
    let store = ConfigStore::load(&config_path)
        .await
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    info!("Loaded config from {}", config_path.display());

    let orchestrator = Arc::new(
        Orchestrator::new(
            Arc::new(store),
            Arc::new(ReqwestTransport::new()),
            Arc::new(TokioCronEngine::new()),
        )
        .await,
    );
    let registered = orchestrator.start().await;
    info!("Cron jobs scheduled: {registered}");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                signal.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {e}"),
        }
    });

    let result = nottif_gateway::start_gateway(orchestrator.clone(), addr, shutdown).await;
    orchestrator.shutdown().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["nottif", "serve"]).unwrap();
        match cli.command {
            Commands::Serve { config, host, port } => {
                assert!(config.is_none());
                assert_eq!(host.to_string(), "0.0.0.0");
                assert_eq!(port, 8080);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_send_args() {
        let cli =
            Cli::try_parse_from(["nottif", "send", "hello", "-w", "http://hook"]).unwrap();
        match cli.command {
            Commands::Send {
                message, webhook, ..
            } => {
                assert_eq!(message.as_deref(), Some("hello"));
                assert_eq!(webhook.as_deref(), Some("http://hook"));
            }
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn test_bad_host_rejected() {
        assert!(Cli::try_parse_from(["nottif", "serve", "--host", "not-an-ip"]).is_err());
    }

    #[test]
    fn test_explicit_config_path() {
        let path = resolve_config_path(Some(PathBuf::from("/tmp/n.json"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/n.json"));
    }
}
