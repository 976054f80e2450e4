//! Chunked transfer engine -- ranged downloads and resumable uploads.
//!
//! Split into focused submodules:
//! - [`download`] - Sequential byte-range reads from an [`ObjectStore`](crate::store::ObjectStore)
//! - [`upload`] - Resumable chunked upload to a [`PublishTarget`](crate::publisher::PublishTarget)
//!   with bounded retry and resynchronisation
//!
//! Both directions run one chunk at a time on the calling task and report a
//! [`TransferProgress`] after every chunk.

mod download;
mod upload;


use crate::config::{RetryConfig, TransferConfig};
use crate::error::{Error, Result};
use crate::types::{TransferDirection, TransferProgress};
use tokio_util::sync::CancellationToken;

/// Progress callback invoked after every chunk
pub type ProgressFn<'a> = dyn FnMut(TransferProgress) + Send + 'a;

/// Moves bytes between the remote store, the local disk and the publishing service
#[derive(Clone, Debug)]
pub struct TransferEngine {
    chunk_size: u64,
    retry: RetryConfig,
    cancel: CancellationToken,
}

impl TransferEngine {
    /// Engine using the chunk size from `config` and `retry` for upload failures
    pub fn new(config: &TransferConfig, retry: RetryConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1) as u64,
            retry,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort transfers with [`Error::Cancelled`] once `token` is cancelled
    ///
    /// The token is checked between chunks and interrupts backoff waits.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Bytes per request
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Turns byte counts into monotone progress snapshots
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    direction: TransferDirection,
    total: Option<u64>,
    chunks: u64,
    last_fraction: f64,
    last_bytes: u64,
}

impl ProgressTracker {
    pub(crate) fn new(direction: TransferDirection, total: Option<u64>) -> Self {
        Self {
            direction,
            total,
            chunks: 0,
            last_fraction: 0.0,
            last_bytes: 0,
        }
    }

    pub(crate) fn set_total(&mut self, total: Option<u64>) {
        if total.is_some() {
            self.total = total;
        }
    }

    /// Snapshot after a chunk that left `bytes` transferred
    ///
    /// With an unknown total the fraction after `n` chunks is `n / (n + 1)`.
    pub(crate) fn record(&mut self, bytes: u64) -> TransferProgress {
        self.chunks += 1;
        let fraction = match self.total {
            Some(0) => 1.0,
            Some(total) => (bytes as f64 / total as f64).clamp(0.0, 1.0),
            None => self.chunks as f64 / (self.chunks + 1) as f64,
        };
        self.last_fraction = self.last_fraction.max(fraction);
        self.last_bytes = bytes;
        self.snapshot()
    }

    /// Final snapshot, or `None` if the last one already reported completion
    pub(crate) fn finish(&mut self, bytes: u64) -> Option<TransferProgress> {
        if self.last_fraction >= 1.0 && self.last_bytes == bytes && self.chunks > 0 {
            return None;
        }
        self.chunks += 1;
        self.last_fraction = 1.0;
        self.last_bytes = bytes;
        Some(self.snapshot())
    }

    fn snapshot(&self) -> TransferProgress {
        TransferProgress {
            direction: self.direction,
            bytes_transferred: self.last_bytes,
            total_bytes: self.total,
            fraction: self.last_fraction,
        }
    }
}
