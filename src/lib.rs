// SwitchBot Metrics - Telemetry synchronisation for SwitchBot devices
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # SwitchBot Metrics
//!
//! Turns SwitchBot device readings into Prometheus time series, along two
//! paths:
//!
//! - **Live collection**: a [`DeviceRegistry`] binds one gauge per metric per
//!   device, and a [`PollLoop`] refreshes them on a fixed interval for a
//!   pull-based `/metrics` endpoint.
//! - **Backfill**: a [`RecordReader`] streams a meter's CSV history through a
//!   bounded [`queue`] into a [`BatchUploader`], which pushes fixed-size
//!   batches to a remote-write endpoint.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use switchbot_metrics::{DeviceRegistry, GaugeBinder, PollLoop, SwitchBotClient};
//! use std::time::Duration;
//!
//! # async fn example() -> switchbot_metrics::Result<()> {
//! let client = SwitchBotClient::new("token", "secret")?;
//! let binder = GaugeBinder::new(prometheus::Registry::new());
//! let registry = DeviceRegistry::discover(&client, &binder).await?;
//!
//! let poller = PollLoop::new(client, registry, Duration::from_secs(60))?;
//! tokio::spawn(poller.run());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`device`]: Device model, capability kinds, and the device-source trait
//! - [`registry`]: Device registry and gauge binding
//! - [`poller`]: Fixed-interval poll loop
//! - [`client`]: SwitchBot Open API client
//! - [`record`]: Meter CSV reader
//! - [`queue`]: Bounded producer/consumer queue
//! - [`batch`]: Batch accumulation and upload
//! - [`remote_write`]: Prometheus remote-write client
//! - [`backfill`]: Reader → queue → uploader pipeline

pub mod backfill;
pub mod batch;
pub mod client;
pub mod device;
pub mod error;
pub mod poller;
pub mod queue;
pub mod record;
pub mod registry;
pub mod remote_write;

// Re-exports for convenient access
pub use batch::{Batch, BatchUploader, UploadSummary, DEFAULT_BATCH_SIZE};
pub use client::{SwitchBotClient, DEFAULT_API_URL};
pub use device::{CapabilityKind, Device, DeviceSource, DiscoveredDevice, Metric, StatusSample};
pub use error::{Error, Result};
pub use poller::{PollLoop, PollMetrics, PollReport, PollState, DEFAULT_POLL_INTERVAL};
pub use queue::{Consumer, Producer};
pub use record::{MeterRecord, RecordReader};
pub use registry::{BoundDevice, DeviceRegistry, GaugeBinder, MetricBinding};
pub use remote_write::{RemoteWriteClient, RemoteWriteSink, TimeSeries, DEFAULT_REMOTE_WRITE_URL};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
