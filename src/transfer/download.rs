//! Ranged download into a local file

use super::{ProgressFn, ProgressTracker, TransferEngine};
use crate::error::{Error, Result};
use crate::store::{ByteRange, ObjectStore};
use crate::types::{RemoteObject, TransferDirection};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

impl TransferEngine {
    /// Download `object` into `destination`, one byte range per request
    ///
    /// The destination is created (or truncated) before the first request. Any store
    /// or I/O error aborts the download at once; retrying is the caller's decision.
    /// Returns the number of bytes written.
    pub async fn download(
        &self,
        store: &dyn ObjectStore,
        object: &RemoteObject,
        destination: &Path,
        progress: &mut ProgressFn<'_>,
    ) -> Result<u64> {
        let mut file = tokio::fs::File::create(destination).await?;
        let mut total = object.size;
        let mut tracker = ProgressTracker::new(TransferDirection::Download, total);
        let mut offset = 0u64;

        debug!(
            object_id = %object.id,
            destination = %destination.display(),
            total_bytes = ?total,
            chunk_size = self.chunk_size,
            "starting download"
        );

        loop {
            self.check_cancelled()?;
            if total.is_some_and(|t| offset >= t) {
                break;
            }

            let mut end = offset + self.chunk_size - 1;
            if let Some(t) = total {
                end = end.min(t - 1);
            }
            let range = ByteRange { start: offset, end };
            let chunk = store.fetch_range(object, range).await?;

            if chunk.total_size.is_some() {
                total = chunk.total_size;
                tracker.set_total(total);
            }
            if chunk.data.is_empty() {
                break;
            }

            file.write_all(&chunk.data).await?;
            offset += chunk.data.len() as u64;
            progress(tracker.record(offset));

            // Without a known size a short read is the only end-of-object signal
            if total.is_none() && (chunk.data.len() as u64) < range.byte_count() {
                break;
            }
        }

        file.flush().await?;
        file.sync_all().await?;

        if let Some(t) = total {
            if offset < t {
                return Err(Error::Protocol(format!(
                    "store returned {offset} of {t} bytes for object {}",
                    object.id
                )));
            }
        }
        if let Some(last) = tracker.finish(offset) {
            progress(last);
        }

        info!(object_id = %object.id, bytes = offset, "download complete");
        Ok(offset)
    }
}
