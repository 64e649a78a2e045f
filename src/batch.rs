// SwitchBot Metrics - Telemetry synchronisation for SwitchBot devices
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Batch accumulation and upload
//!
//! Each [`MeterRecord`] expands into two points (temperature and humidity)
//! sharing the record's timestamp and the device's labels. Points accumulate
//! in a [`Batch`] that is written out as soon as it holds `batch_size`
//! points, and once more at end of input for whatever remains.

use crate::device::Metric;
use crate::error::{Error, Result};
use crate::queue::Consumer;
use crate::record::MeterRecord;
use crate::registry::{DEVICE_ID_LABEL, DEVICE_NAME_LABEL};
use crate::remote_write::{Label, RemoteWriteSink, TimeSeries, METRIC_NAME_LABEL};
use tracing::info;

/// Default number of points per upload
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Points awaiting upload; append-only until taken
#[derive(Debug)]
pub struct Batch {
    series: Vec<TimeSeries>,
    limit: usize,
}

impl Batch {
    /// Create an empty batch holding at most `limit` points.
    ///
    /// A zero limit is rejected with [`Error::Config`].
    pub fn new(limit: usize) -> Result<Self> {
        if limit == 0 {
            return Err(Error::config("batch size must be positive"));
        }
        Ok(Self::with_limit(limit))
    }

    fn with_limit(limit: usize) -> Self {
        Self {
            series: Vec::with_capacity(limit),
            limit,
        }
    }

    /// Append a point
    pub fn push(&mut self, point: TimeSeries) {
        debug_assert!(!self.is_full());
        self.series.push(point);
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.series.len() >= self.limit
    }

    pub fn as_slice(&self) -> &[TimeSeries] {
        &self.series
    }

    /// Drop every point, keeping the allocation
    pub fn clear(&mut self) {
        self.series.clear();
    }
}

/// Totals of a finished upload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    /// Records consumed
    pub records: u64,
    /// Points written
    pub points: u64,
    /// Write calls made
    pub batches: u64,
}

/// Consumes meter records and writes them to a remote-write sink
pub struct BatchUploader<S> {
    sink: S,
    temperature_labels: Vec<Label>,
    humidity_labels: Vec<Label>,
    batch: Batch,
    summary: UploadSummary,
}

impl<S: RemoteWriteSink> BatchUploader<S> {
    /// Create an uploader labelling points with the given device identity
    pub fn new(sink: S, device_id: &str, device_name: &str) -> Self {
        let labels = |metric: Metric| {
            vec![
                Label::new(METRIC_NAME_LABEL, metric.name()),
                Label::new(DEVICE_ID_LABEL, device_id),
                Label::new(DEVICE_NAME_LABEL, device_name),
            ]
        };

        Self {
            sink,
            temperature_labels: labels(Metric::Temperature),
            humidity_labels: labels(Metric::Humidity),
            batch: Batch::with_limit(DEFAULT_BATCH_SIZE),
            summary: UploadSummary::default(),
        }
    }

    /// Use a different batch size; zero is rejected
    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self> {
        self.batch = Batch::new(batch_size)?;
        Ok(self)
    }

    /// Drain `consumer` until it is closed, then flush the remainder.
    ///
    /// If the queue is aborted the pending partial batch is not written.
    pub async fn run(mut self, mut consumer: Consumer<MeterRecord>) -> Result<UploadSummary> {
        while let Some(record) = consumer.pop().await? {
            self.push(record).await?;
        }
        self.finish().await
    }

    /// Add one record, writing the batch whenever it fills up
    pub async fn push(&mut self, record: MeterRecord) -> Result<()> {
        let timestamp_ms = record.timestamp.timestamp_millis();
        self.summary.records += 1;

        self.push_point(TimeSeries::point(
            self.temperature_labels.clone(),
            timestamp_ms,
            record.temperature,
        ))
        .await?;
        self.push_point(TimeSeries::point(
            self.humidity_labels.clone(),
            timestamp_ms,
            record.humidity,
        ))
        .await
    }

    /// Write whatever is pending and return the totals
    pub async fn finish(mut self) -> Result<UploadSummary> {
        if !self.batch.is_empty() {
            self.flush().await?;
        }
        Ok(self.summary)
    }

    async fn push_point(&mut self, point: TimeSeries) -> Result<()> {
        self.batch.push(point);
        self.summary.points += 1;
        if self.batch.is_full() {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        info!(
            batch_points = self.batch.len(),
            total_points = self.summary.points,
            "writing records"
        );
        self.sink.write(self.batch.as_slice()).await?;
        self.summary.batches += 1;
        self.batch.clear();
        Ok(())
    }
}
