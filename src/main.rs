//! Caching reverse proxy.
//!
//! Forwards each request to the upstream host named by its `__host` query
//! parameter and keeps successful responses in memory for a configurable TTL.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────────┐
//!                        │                   CACHING PROXY                       │
//!                        │                                                       │
//!     Client Request     │  ┌─────────┐    ┌──────────┐    ┌──────────────────┐  │
//!     ───────────────────┼─▶│  http   │───▶│ routing  │───▶│ proxy::transport │  │
//!                        │  │ server  │    │ rewrite  │    │  key → lookup    │  │
//!                        │  └─────────┘    └──────────┘    └───┬─────────┬────┘  │
//!                        │                                 hit │         │ miss  │
//!                        │                            ┌────────▼──┐  ┌───▼─────┐ │
//!     Client Response    │  ┌─────────┐               │   cache   │  │upstream │─┼──▶ Upstream
//!     ◀──────────────────┼──│  CORS   │◀──────────────│store+codec│◀─│ client  │ │
//!                        │  └─────────┘               └───────────┘  └─────────┘ │
//!                        │                                                       │
//!                        │  config · observability · lifecycle (sweeper, signals) │
//!                        └──────────────────────────────────────────────────────┘
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use caching_proxy::config::{load_config, validation::validate_config, ConfigError, ProxyConfig};
use caching_proxy::observability::{logging, metrics};
use caching_proxy::{HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "caching-proxy")]
#[command(about = "Caching reverse proxy for allowlisted upstream APIs", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Interface to listen on.
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Port to listen on.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Allowed upstream host; repeat to allow several. Replaces the configured list.
    #[arg(long = "allowed-host")]
    allowed_hosts: Vec<String>,
}

impl Cli {
    fn load(&self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ProxyConfig::default(),
        };

        if self.host.is_some() || self.port.is_some() {
            let current = config.listener.bind_address.parse::<SocketAddr>().ok();
            let host = self
                .host
                .clone()
                .or_else(|| current.map(|addr| addr.ip().to_string()))
                .unwrap_or_else(|| "0.0.0.0".to_string());
            let port = self.port.or(current.map(|addr| addr.port())).unwrap_or(8080);
            config.listener.bind_address = match host.parse::<IpAddr>() {
                Ok(ip) => SocketAddr::new(ip, port).to_string(),
                Err(_) => format!("{}:{}", host, port),
            };
        }

        if !self.allowed_hosts.is_empty() {
            config.upstream.allowed_hosts = self.allowed_hosts.clone();
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    logging::init_logging(&config.observability);

    tracing::info!("caching-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        allowed_hosts = ?config.upstream.allowed_hosts,
        cache_ttl_secs = config.cache.ttl_secs,
        sweep_interval_secs = config.cache.sweep_interval_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
