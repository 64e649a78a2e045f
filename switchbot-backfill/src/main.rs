// SwitchBot Backfill - Remote-write backfill for SwitchBot meter history
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # SwitchBot Backfill
//!
//! Reads a meter's CSV export (as produced by the SwitchBot app) and writes
//! temperature and humidity as time series to a Prometheus remote-write
//! endpoint, labelled the same way the exporter labels live readings.
//!
//! ## Usage
//!
//! ```bash
//! switchbot-backfill \
//!     --device-id C271111EC0AB --device-name "Meter 0A" \
//!     --csv meter.csv --timezone Asia/Tokyo \
//!     --remote-write-url http://localhost:8428/api/v1/write
//! ```
//!
//! Any error aborts the run; batches already written stay written, so a
//! failed backfill is restarted from the beginning of the file.

use chrono_tz::Tz;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use switchbot_metrics::queue::DEFAULT_CAPACITY;
use switchbot_metrics::{
    backfill, BatchUploader, CapabilityKind, Error, RemoteWriteClient, Result,
    DEFAULT_BATCH_SIZE, DEFAULT_REMOTE_WRITE_URL,
};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// SwitchBot remote-write backfill
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The remote write URL
    #[arg(long, default_value = DEFAULT_REMOTE_WRITE_URL)]
    remote_write_url: String,

    /// SwitchBot device type
    #[arg(long, default_value = "Meter")]
    device_type: String,

    /// SwitchBot device ID
    #[arg(long, default_value = "")]
    device_id: String,

    /// SwitchBot device name
    #[arg(long, default_value = "")]
    device_name: String,

    /// CSV file path
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Time zone the CSV timestamps are recorded in
    #[arg(long, default_value = "Asia/Tokyo")]
    timezone: String,

    /// Points per remote-write request
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Validated backfill configuration
#[derive(Debug, Clone)]
struct BackfillConfig {
    remote_write_url: String,
    device_id: String,
    device_name: String,
    csv: PathBuf,
    timezone: Tz,
    batch_size: usize,
}

impl TryFrom<Args> for BackfillConfig {
    type Error = Error;

    fn try_from(args: Args) -> Result<Self> {
        if args.remote_write_url.is_empty() {
            return Err(Error::config("remote write URL is required"));
        }
        if !CapabilityKind::from_device_type(&args.device_type).is_climate_sensor() {
            return Err(Error::config(format!(
                "unsupported device type: {}",
                args.device_type
            )));
        }
        if args.device_id.is_empty() {
            return Err(Error::config("device ID is required"));
        }
        if args.device_name.is_empty() {
            return Err(Error::config("device name is required"));
        }
        let csv = match args.csv {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => return Err(Error::config("csv file path is required")),
        };
        let timezone: Tz = args
            .timezone
            .parse()
            .map_err(|_| Error::config(format!("unknown time zone: {}", args.timezone)))?;
        if args.batch_size == 0 {
            return Err(Error::config("batch size must be positive"));
        }

        Ok(Self {
            remote_write_url: args.remote_write_url,
            device_id: args.device_id,
            device_name: args.device_name,
            csv,
            timezone,
            batch_size: args.batch_size,
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

    info!("SwitchBot Backfill v{}", env!("CARGO_PKG_VERSION"));

    let result = match BackfillConfig::try_from(args) {
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

async fn run(config: BackfillConfig) -> Result<()> {
    let client = RemoteWriteClient::new(&config.remote_write_url)?;
    let uploader = BatchUploader::new(client, &config.device_id, &config.device_name)
        .with_batch_size(config.batch_size)?;

    info!(
        remote_write_url = %config.remote_write_url,
        csv = %config.csv.display(),
        timezone = config.timezone.name(),
        "start backfilling"
    );
    let summary =
        backfill::run_csv(&config.csv, config.timezone, uploader, DEFAULT_CAPACITY).await?;
    info!(
        records = summary.records,
        points = summary.points,
        "backfilling completed"
    );
    Ok(())
}
