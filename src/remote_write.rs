// SwitchBot Metrics - Telemetry synchronisation for SwitchBot devices
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus remote-write client
//!
//! Implements the 0.1.0 protocol: a protobuf `WriteRequest`, snappy block
//! compressed, POSTed in one request per batch. A batch is accepted or
//! rejected as a whole.

use crate::error::{Error, Result};
use async_trait::async_trait;
use prost::Message;
use std::time::Duration;

/// Default remote-write endpoint (VictoriaMetrics single-node)
pub const DEFAULT_REMOTE_WRITE_URL: &str = "http://localhost:8428/api/v1/write";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Label name carrying the metric name
pub const METRIC_NAME_LABEL: &str = "__name__";

/// A label pair
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct Label {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A single value at a millisecond timestamp
#[derive(Clone, PartialEq, prost::Message)]
pub struct Sample {
    #[prost(double, tag = "1")]
    pub value: f64,
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
}

/// A labelled series with its samples
#[derive(Clone, PartialEq, prost::Message)]
pub struct TimeSeries {
    #[prost(message, repeated, tag = "1")]
    pub labels: Vec<Label>,
    #[prost(message, repeated, tag = "2")]
    pub samples: Vec<Sample>,
}

impl TimeSeries {
    /// A series holding one sample
    pub fn point(labels: Vec<Label>, timestamp_ms: i64, value: f64) -> Self {
        Self {
            labels,
            samples: vec![Sample {
                value,
                timestamp: timestamp_ms,
            }],
        }
    }
}

/// Top-level remote-write message
#[derive(Clone, PartialEq, prost::Message)]
pub struct WriteRequest {
    #[prost(message, repeated, tag = "1")]
    pub timeseries: Vec<TimeSeries>,
}

/// Serialize and snappy-compress a batch
pub fn encode_request(series: &[TimeSeries]) -> Result<Vec<u8>> {
    let request = WriteRequest {
        timeseries: series.to_vec(),
    };
    let raw = request.encode_to_vec();
    Ok(snap::raw::Encoder::new().compress_vec(&raw)?)
}

/// Destination for batches of time series
#[async_trait]
pub trait RemoteWriteSink: Send + Sync {
    /// Write one batch; all-or-nothing
    async fn write(&self, series: &[TimeSeries]) -> Result<()>;
}

/// HTTP remote-write client
#[derive(Debug, Clone)]
pub struct RemoteWriteClient {
    http: reqwest::Client,
    url: String,
}

impl RemoteWriteClient {
    /// Create a client posting to `url`
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(Error::RemoteWriteHttp)?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RemoteWriteSink for RemoteWriteClient {
    async fn write(&self, series: &[TimeSeries]) -> Result<()> {
        let body = encode_request(series)?;

        let response = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_ENCODING, "snappy")
            .header(reqwest::header::CONTENT_TYPE, "application/x-protobuf")
            .header("X-Prometheus-Remote-Write-Version", "0.1.0")
            .body(body)
            .send()
            .await
            .map_err(Error::RemoteWriteHttp)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RemoteWriteStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
