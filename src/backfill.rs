// SwitchBot Metrics - Telemetry synchronisation for SwitchBot devices
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Backfill pipeline
//!
//! ```text
//! RecordReader ──push──► bounded queue ──pop──► BatchUploader ──► remote write
//!  (blocking thread)      (back-pressure)        (async task)
//! ```

use crate::batch::{BatchUploader, UploadSummary};
use crate::error::{Error, Result};
use crate::queue;
use crate::record::RecordReader;
use crate::remote_write::RemoteWriteSink;
use chrono_tz::Tz;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Open the CSV at `path` and run it through `uploader`.
///
/// The header is resolved before the uploader sees anything, so a file
/// missing a required column fails without a single write.
pub async fn run_csv<S>(
    path: impl AsRef<Path>,
    tz: Tz,
    uploader: BatchUploader<S>,
    capacity: usize,
) -> Result<UploadSummary>
where
    S: RemoteWriteSink,
{
    let reader = RecordReader::from_path(path, tz)?;
    run(reader, uploader, capacity).await
}

/// Run reader and uploader to completion, connected by a queue of `capacity`.
///
/// The reader's header has already been resolved, so a bad header never gets
/// this far. A read error is reported in preference to the aborted queue it
/// causes downstream; an upload error in preference to the disconnected queue
/// it causes upstream.
pub async fn run<R, S>(
    reader: RecordReader<R>,
    uploader: BatchUploader<S>,
    capacity: usize,
) -> Result<UploadSummary>
where
    R: Read + Send + 'static,
    S: RemoteWriteSink,
{
    let (producer, consumer) = queue::bounded(capacity)?;
    let producer_task = tokio::task::spawn_blocking(move || reader.stream_into(producer));

    let uploaded = uploader.run(consumer).await;
    let read = producer_task.await?;

    match (read, uploaded) {
        (Err(read_err), Err(Error::QueueAborted)) => Err(read_err),
        (_, Err(upload_err)) => Err(upload_err),
        (Err(read_err), Ok(_)) => Err(read_err),
        (Ok(records), Ok(summary)) => {
            info!(
                records,
                points = summary.points,
                batches = summary.batches,
                "backfill finished"
            );
            Ok(summary)
        }
    }
}
