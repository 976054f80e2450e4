//! Resumable upload with bounded retry
//!
//! Every transient failure (session start, chunk or status query) consumes one retry
//! from a single per-upload budget. After the backoff the service is asked which
//! offset it has persisted and sending continues from there.

use super::{ProgressFn, ProgressTracker, TransferEngine};
use crate::error::{Error, Result};
use crate::publisher::{ChunkAck, PublishTarget, UploadSession};
use crate::retry::IsRetryable;
use crate::types::{PublishRequest, TransferDirection};
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

/// Consecutive acknowledged chunks that may leave the offset unchanged
const MAX_STALLED_CHUNKS: u32 = 3;

impl TransferEngine {
    /// Upload the file at `source` as a new published item described by `request`
    ///
    /// Returns the identifier the service assigned. Empty files are rejected before a
    /// session is opened.
    pub async fn upload(
        &self,
        target: &dyn PublishTarget,
        source: &Path,
        request: &PublishRequest,
        progress: &mut ProgressFn<'_>,
    ) -> Result<String> {
        let mut file = tokio::fs::File::open(source).await?;
        let total = file.metadata().await?.len();
        if total == 0 {
            return Err(Error::EmptyUpload(source.to_path_buf()));
        }

        let mut retries = 0u32;
        let session = loop {
            self.check_cancelled()?;
            match target.start_session(request, total).await {
                Ok(session) => break session,
                Err(e) => self.back_off(&mut retries, e).await?,
            }
        };
        info!(
            service = target.name(),
            title = %request.title,
            total_bytes = total,
            "upload session opened"
        );

        let mut tracker = ProgressTracker::new(TransferDirection::Upload, Some(total));
        let mut buffer = vec![0u8; self.chunk_size.min(total) as usize];
        let mut offset = 0u64;
        let mut stalled = 0u32;

        loop {
            self.check_cancelled()?;
            if offset >= total {
                return Err(Error::Protocol(format!(
                    "service acknowledged all {total} bytes without completing the upload"
                )));
            }

            let len = self.chunk_size.min(total - offset) as usize;
            file.seek(SeekFrom::Start(offset)).await?;
            file.read_exact(&mut buffer[..len]).await?;
            let chunk = Bytes::copy_from_slice(&buffer[..len]);

            let ack = match target.send_chunk(&session, offset, chunk, total).await {
                Ok(ChunkAck::Incomplete { next_offset }) if next_offset <= offset => {
                    stalled += 1;
                    if stalled > MAX_STALLED_CHUNKS {
                        return Err(Error::Protocol(format!(
                            "service stopped accepting bytes at offset {offset}"
                        )));
                    }
                    ChunkAck::Incomplete { next_offset }
                }
                Ok(ack) => {
                    stalled = 0;
                    ack
                }
                Err(e) => {
                    self.back_off(&mut retries, e).await?;
                    self.resume(target, &session, total, &mut retries).await?
                }
            };

            match ack {
                ChunkAck::Complete { remote_id } => {
                    if let Some(last) = tracker.finish(total) {
                        progress(last);
                    }
                    info!(remote_id = %remote_id, retries, "upload complete");
                    return Ok(remote_id);
                }
                ChunkAck::Incomplete { next_offset } => {
                    if next_offset > total {
                        return Err(Error::Protocol(format!(
                            "service acknowledged offset {next_offset} beyond {total} bytes"
                        )));
                    }
                    offset = next_offset;
                    progress(tracker.record(offset));
                }
            }
        }
    }

    /// Ask the service where to continue after a failed chunk
    async fn resume(
        &self,
        target: &dyn PublishTarget,
        session: &UploadSession,
        total: u64,
        retries: &mut u32,
    ) -> Result<ChunkAck> {
        loop {
            self.check_cancelled()?;
            match target.query_status(session, total).await {
                Ok(ack) => {
                    if let ChunkAck::Incomplete { next_offset } = &ack {
                        debug!(next_offset, "resuming upload from acknowledged offset");
                    }
                    return Ok(ack);
                }
                Err(e) => self.back_off(retries, e).await?,
            }
        }
    }

    /// Wait before the next attempt, or give up
    ///
    /// Fatal errors are returned as-is. Transient errors beyond the retry budget become
    /// [`Error::RetriesExhausted`].
    async fn back_off(&self, retries: &mut u32, error: Error) -> Result<()> {
        if !error.is_retryable() {
            return Err(error);
        }
        if *retries >= self.retry.max_attempts {
            warn!(error = %error, attempts = *retries, "upload retry budget exhausted");
            return Err(Error::RetriesExhausted {
                attempts: *retries,
                last: Box::new(error),
            });
        }

        *retries += 1;
        let delay = self.retry.delay_for_attempt(*retries);
        warn!(
            error = %error,
            attempt = *retries,
            max_attempts = self.retry.max_attempts,
            delay_ms = delay.as_millis(),
            "transient upload failure, retrying"
        );

        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
