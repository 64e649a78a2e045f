// SwitchBot Metrics - Telemetry synchronisation for SwitchBot devices
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for SwitchBot Metrics
//!
//! Every boundary (device API, CSV input, queue, remote write) has its own
//! variants so callers can tell a recoverable per-device failure from a
//! fatal one by where it was raised.

use thiserror::Error;

/// Result type alias for SwitchBot Metrics operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// HTTP transport failure talking to the device API
    #[error("Device API request failed: {0}")]
    DeviceHttp(#[source] reqwest::Error),

    /// Device API answered with a non-success status code
    #[error("Device API error (status {code}): {message}")]
    DeviceApi { code: i64, message: String },

    /// CSV header lacks one of the required columns
    #[error("Missing CSV column(s): {}", .0.join(", "))]
    MissingColumns(Vec<&'static str>),

    /// Low-level CSV read failure
    #[error("Reading CSV file: {0}")]
    Csv(#[from] csv::Error),

    /// Record shorter than the resolved column layout
    #[error("Line {line}: missing field '{column}'")]
    MissingField { line: u64, column: &'static str },

    /// Timestamp cell could not be parsed in the configured zone
    #[error("Line {line}: parsing timestamp '{value}': {reason}")]
    Timestamp {
        line: u64,
        value: String,
        reason: String,
    },

    /// Numeric cell could not be parsed
    #[error("Line {line}: parsing {column} '{value}'")]
    Number {
        line: u64,
        column: &'static str,
        value: String,
    },

    /// Consumer side of the record queue went away
    #[error("Record queue disconnected")]
    QueueDisconnected,

    /// Producer side of the record queue went away without closing it
    #[error("Record queue aborted before end of input")]
    QueueAborted,

    /// HTTP transport failure talking to the remote-write endpoint
    #[error("Writing to remote write: {0}")]
    RemoteWriteHttp(#[source] reqwest::Error),

    /// Remote-write endpoint rejected the batch
    #[error("Writing to remote write: status {status}: {body}")]
    RemoteWriteStatus { status: u16, body: String },

    /// Snappy compression of the write request failed
    #[error("Encoding write request: {0}")]
    Compression(#[from] snap::Error),

    /// Gauge creation or registration failed
    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Background task failed to complete
    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
