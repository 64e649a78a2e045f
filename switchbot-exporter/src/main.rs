// SwitchBot Exporter - Prometheus exporter for SwitchBot devices
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # SwitchBot Exporter
//!
//! Polls every supported SwitchBot device on a fixed interval and exposes
//! the latest readings as Prometheus gauges.
//!
//! ## Usage
//!
//! ```bash
//! # Credentials from the SwitchBot app (Profile > Preferences > Developer Options)
//! switchbot-exporter --token "$TOKEN" --secret "$SECRET"
//!
//! # Or through the environment, on a custom port
//! SWITCHBOT_TOKEN=... SWITCHBOT_SECRET=... switchbot-exporter --port 9100
//! ```

mod server;

use clap::Parser;
use prometheus::Registry;
use server::AppState;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchbot_metrics::{
    DeviceRegistry, Error, GaugeBinder, PollLoop, PollMetrics, Result, SwitchBotClient,
    DEFAULT_API_URL,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// SwitchBot Prometheus Exporter
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to bind
    #[arg(short, long, default_value = "9257")]
    port: u16,

    /// The SwitchBot open token
    #[arg(long, env = "SWITCHBOT_TOKEN", default_value = "", hide_env_values = true)]
    token: String,

    /// The SwitchBot secret key
    #[arg(long, env = "SWITCHBOT_SECRET", default_value = "", hide_env_values = true)]
    secret: String,

    /// Poll interval in seconds
    #[arg(short, long, default_value = "60")]
    interval: u64,

    /// SwitchBot API base URL
    #[arg(long, default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Validated exporter configuration
#[derive(Debug, Clone)]
struct ExporterConfig {
    port: u16,
    token: String,
    secret: String,
    interval: Duration,
    api_url: String,
}

impl TryFrom<Args> for ExporterConfig {
    type Error = Error;

    fn try_from(args: Args) -> Result<Self> {
        if args.token.is_empty() {
            return Err(Error::config("open token is required"));
        }
        if args.secret.is_empty() {
            return Err(Error::config("secret token is required"));
        }
        if args.interval == 0 {
            return Err(Error::config("poll interval must be at least one second"));
        }

        Ok(Self {
            port: args.port,
            token: args.token,
            secret: args.secret,
            interval: Duration::from_secs(args.interval),
            api_url: args.api_url,
        })
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level);

    info!("SwitchBot Exporter v{}", env!("CARGO_PKG_VERSION"));

    let result = match ExporterConfig::try_from(args) {
        Ok(config) => run(config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ExporterConfig) -> Result<()> {
    let client =
        SwitchBotClient::new(config.token, config.secret)?.with_base_url(config.api_url);

    let prometheus = Registry::new();
    let binder = GaugeBinder::new(prometheus.clone());
    let registry = DeviceRegistry::discover(&client, &binder).await?;
    if registry.is_empty() {
        warn!("no supported devices found; only exporter metrics will be exposed");
    }
    let device_count = registry.len();

    let metrics = PollMetrics::register(&prometheus)?;
    let poller = PollLoop::new(client, registry, config.interval)?.with_metrics(metrics);
    let poll_state = poller.state();
    tokio::spawn(poller.run());

    let state = Arc::new(AppState {
        registry: prometheus,
        poll_state,
        device_count,
        start_time: Instant::now(),
    });
    let app = server::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting server on http://{}", addr);
    info!("Metrics endpoint: http://{}/metrics", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
