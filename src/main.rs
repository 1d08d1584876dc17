//! proxy-connect
//!
//! Opens a tunnel to `HOST:PORT` through an HTTP CONNECT proxy and relays
//! stdin/stdout over it, e.g. as an SSH `ProxyCommand`:
//!
//! ```text
//! ssh -o ProxyCommand='proxy-connect --proxy proxy.corp:3128 %h:%p' server
//! ```
//!
//! ```text
//!   stdin ──▶ ┌───────────────┐  CONNECT host:port  ┌───────┐        ┌─────────────┐
//!             │ proxy-connect │ ──────────────────▶ │ proxy │ ─────▶ │ destination │
//!  stdout ◀── └───────────────┘ ◀──── tunnel ─────▶ └───────┘ ◀───── └─────────────┘
//! ```
//!
//! Logs go to stderr; stdout carries only tunnel bytes.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;

use proxy_tunnel::config::{load_config, validate_config, ConfigError, TunnelConfig};
use proxy_tunnel::handshake::DestinationTarget;
use proxy_tunnel::lifecycle::{spawn_signal_listener, Shutdown};
use proxy_tunnel::net::{ProxyConnector, Tunnel};
use proxy_tunnel::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "proxy-connect", version)]
#[command(about = "Tunnel stdin/stdout to HOST:PORT through an HTTP CONNECT proxy", long_about = None)]
struct Cli {
    /// Destination as HOST:PORT ([v6]:PORT for IPv6 literals)
    destination: String,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Proxy address as HOST:PORT
    #[arg(short, long)]
    proxy: Option<String>,

    /// Tunnel scheme: http or https
    #[arg(long)]
    scheme: Option<String>,

    /// Proxy username (Basic authentication)
    #[arg(short, long)]
    user: Option<String>,

    /// Proxy password (Basic authentication)
    #[arg(long, env = "PROXY_CONNECT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// TCP connect timeout in milliseconds (0 = none)
    #[arg(long)]
    connect_timeout_ms: Option<u64>,

    /// Handshake timeout in milliseconds (0 = none)
    #[arg(long)]
    handshake_timeout_ms: Option<u64>,

    /// Resolve the destination locally and CONNECT to the IP address
    #[arg(long)]
    resolve: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "proxy-connect failed");
            eprintln!("proxy-connect: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&cli)?;
    logging::init_logging(&config.observability.log_level);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut destination = DestinationTarget::parse(&cli.destination)?;
    if cli.resolve && !destination.is_resolved() {
        destination = resolve(&destination).await?;
    }

    let connector = ProxyConnector::from_config(&config)?;
    tracing::info!(
        proxy = %connector.proxy(),
        destination = %destination,
        handshake_timeout_ms = config.timeouts.handshake_ms,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let _signals = spawn_signal_listener(shutdown.clone());

    let tunnel = connector
        .connect_with(destination, None, Some(shutdown.subscribe()))
        .await?;
    tracing::info!(
        proxy = %tunnel.event().proxy,
        destination = %tunnel.event().destination,
        "Relaying stdin/stdout"
    );

    let (sent, received) = relay(tunnel, shutdown.subscribe()).await?;
    tracing::info!(sent, received, "Tunnel closed");
    Ok(())
}

/// File (if any), then flags; the result is validated as a whole.
fn build_config(cli: &Cli) -> Result<TunnelConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => TunnelConfig::default(),
    };

    if let Some(proxy) = &cli.proxy {
        config.proxy.address = proxy.clone();
    }
    if let Some(scheme) = &cli.scheme {
        config.proxy.scheme = scheme.clone();
    }
    if cli.user.is_some() {
        config.proxy.username = cli.user.clone();
    }
    if cli.password.is_some() {
        config.proxy.password = cli.password.clone();
    }
    if let Some(ms) = cli.connect_timeout_ms {
        config.timeouts.connect_ms = ms;
    }
    if let Some(ms) = cli.handshake_timeout_ms {
        config.timeouts.handshake_ms = ms;
    }
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

async fn resolve(destination: &DestinationTarget) -> io::Result<DestinationTarget> {
    let host = destination.host();
    let addr = tokio::net::lookup_host((host.as_str(), destination.port()))
        .await?
        .next()
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{host} did not resolve"))
        })?;
    tracing::debug!(host = %host, address = %addr, "Resolved destination locally");
    Ok(DestinationTarget::Resolved(addr))
}

/// Copy stdin into the tunnel and the tunnel into stdout until the far end
/// closes. Returns bytes sent and received.
async fn relay<S>(tunnel: Tunnel<S>, mut shutdown: broadcast::Receiver<()>) -> io::Result<(u64, u64)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut from_tunnel, mut to_tunnel) = tokio::io::split(tunnel);
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();

    let upstream = async {
        let n = tokio::io::copy(&mut stdin, &mut to_tunnel).await?;
        to_tunnel.shutdown().await?;
        Ok::<_, io::Error>(n)
    };
    let downstream = async {
        let n = tokio::io::copy(&mut from_tunnel, &mut stdout).await?;
        stdout.flush().await?;
        Ok::<_, io::Error>(n)
    };
    tokio::pin!(upstream);
    tokio::pin!(downstream);

    let mut sent = None;
    loop {
        tokio::select! {
            res = &mut upstream, if sent.is_none() => sent = Some(res?),
            res = &mut downstream => return Ok((sent.unwrap_or(0), res?)),
            _ = shutdown.recv() => {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "relay interrupted by shutdown"));
            }
        }
    }
}
