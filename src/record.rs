// SwitchBot Metrics - Telemetry synchronisation for SwitchBot devices
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Meter CSV reader
//!
//! Reads the CSV export of a meter's history. The header row is resolved once
//! into a column layout; a missing timestamp, temperature, or humidity column
//! fails before any data row is read. Any row that does not parse aborts the
//! whole read.
//!
//! ```text
//! Timestamp,Temperature_Celsius(°C),Relative_Humidity(%)
//! "Jan 01, 2024 00:00:00",20.1,55
//! ```

use crate::error::{Error, Result};
use crate::queue::Producer;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use csv::StringRecord;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Header of the timestamp column
pub const TIMESTAMP_COLUMN: &str = "Timestamp";
/// Header of the temperature column
pub const TEMPERATURE_COLUMN: &str = "Temperature_Celsius(°C)";
/// Header of the humidity column
pub const HUMIDITY_COLUMN: &str = "Relative_Humidity(%)";

/// Timestamp cell format, e.g. `Jan 02, 2006 15:04:05`
pub const TIMESTAMP_FORMAT: &str = "%b %d, %Y %H:%M:%S";

/// One parsed CSV row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterRecord {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
}

/// Column indices resolved from the header row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnLayout {
    timestamp: usize,
    temperature: usize,
    humidity: usize,
}

impl ColumnLayout {
    fn resolve(header: &StringRecord) -> Result<Self> {
        let find = |name: &str| header.iter().position(|col| col.trim() == name);

        let timestamp = find(TIMESTAMP_COLUMN);
        let temperature = find(TEMPERATURE_COLUMN);
        let humidity = find(HUMIDITY_COLUMN);

        match (timestamp, temperature, humidity) {
            (Some(timestamp), Some(temperature), Some(humidity)) => Ok(Self {
                timestamp,
                temperature,
                humidity,
            }),
            _ => {
                let missing = [
                    (timestamp, TIMESTAMP_COLUMN),
                    (temperature, TEMPERATURE_COLUMN),
                    (humidity, HUMIDITY_COLUMN),
                ]
                .into_iter()
                .filter(|(index, _)| index.is_none())
                .map(|(_, name)| name)
                .collect();
                Err(Error::MissingColumns(missing))
            }
        }
    }
}

/// Streaming reader of meter records
pub struct RecordReader<R> {
    reader: csv::Reader<R>,
    layout: ColumnLayout,
    tz: Tz,
    record: StringRecord,
}

impl RecordReader<File> {
    /// Open a CSV file and resolve its header
    pub fn from_path(path: impl AsRef<Path>, tz: Tz) -> Result<Self> {
        let reader = csv::Reader::from_path(path)?;
        Self::with_csv_reader(reader, tz)
    }
}

impl<R: Read> RecordReader<R> {
    /// Wrap any reader and resolve its header
    pub fn from_reader(rdr: R, tz: Tz) -> Result<Self> {
        Self::with_csv_reader(csv::Reader::from_reader(rdr), tz)
    }

    fn with_csv_reader(mut reader: csv::Reader<R>, tz: Tz) -> Result<Self> {
        let header = reader.headers()?.clone();
        let layout = ColumnLayout::resolve(&header)?;
        debug!(?layout, timezone = tz.name(), "resolved CSV header");

        Ok(Self {
            reader,
            layout,
            tz,
            record: StringRecord::new(),
        })
    }

    /// Read and parse the next row; `Ok(None)` at end of input.
    pub fn next_record(&mut self) -> Result<Option<MeterRecord>> {
        if !self.reader.read_record(&mut self.record)? {
            return Ok(None);
        }

        let line = self.record.position().map(|p| p.line()).unwrap_or(0);
        let field = |index: usize, column: &'static str| {
            self.record
                .get(index)
                .ok_or(Error::MissingField { line, column })
        };

        let raw_timestamp = field(self.layout.timestamp, "timestamp")?;
        let timestamp =
            parse_timestamp(raw_timestamp, self.tz).map_err(|reason| Error::Timestamp {
                line,
                value: raw_timestamp.to_string(),
                reason,
            })?;
        let temperature = parse_number(
            field(self.layout.temperature, "temperature")?,
            line,
            "temperature",
        )?;
        let humidity = parse_number(field(self.layout.humidity, "humidity")?, line, "humidity")?;

        Ok(Some(MeterRecord {
            timestamp,
            temperature,
            humidity,
        }))
    }

    /// Push every record into `producer`, then close it.
    ///
    /// On error the producer is dropped without closing, which the consumer
    /// observes as an aborted queue. Returns the number of records pushed.
    pub fn stream_into(mut self, producer: Producer<MeterRecord>) -> Result<u64> {
        let mut count = 0;
        while let Some(record) = self.next_record()? {
            producer.push(record)?;
            count += 1;
        }
        producer.close()?;
        debug!(records = count, "finished reading CSV");
        Ok(count)
    }
}

/// Parse a timestamp cell as local time in `tz`.
///
/// Ambiguous local times (DST fall-back) resolve to the earlier instant;
/// local times skipped by a DST jump are rejected.
pub fn parse_timestamp(value: &str, tz: Tz) -> std::result::Result<DateTime<Utc>, String> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
        .map_err(|e| e.to_string())?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| format!("local time does not exist in {}", tz.name()))
}

fn parse_number(value: &str, line: u64, column: &'static str) -> Result<f64> {
    value.trim().parse::<f64>().map_err(|_| Error::Number {
        line,
        column,
        value: value.to_string(),
    })
}
