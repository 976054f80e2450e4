//! Remote object store and the object locator
//!
//! [`ObjectStore`] is the seam between the pipeline and the store's REST API: listing
//! candidates, reading byte ranges, and deleting. [`ObjectLocator`] picks the single
//! newest candidate on top of it.

mod drive;

pub use drive::DriveClient;

use crate::config::RetryConfig;
use crate::error::Result;
use crate::retry::with_retry;
use crate::types::{ObjectFilter, RemoteObject};
use async_trait::async_trait;
use bytes::Bytes;
use std::cmp::Ordering;
use tracing::{debug, info};

/// Inclusive byte range
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte
    pub start: u64,
    /// Last byte, inclusive
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered
    pub fn byte_count(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }

    /// `Range` request header value
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Bytes returned for a range request
#[derive(Clone, Debug, Default)]
pub struct RangeChunk {
    /// The bytes; empty once the range starts past the end of the object
    pub data: Bytes,
    /// Object size reported by the store, when it reported one
    pub total_size: Option<u64>,
}

/// Remote object store operations the pipeline consumes
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Newest object matching `filter`, or `None` when nothing matches
    ///
    /// Ties on creation time are broken by ascending identifier so repeated calls
    /// against an unchanged store return the same object.
    async fn find_latest(&self, filter: &ObjectFilter) -> Result<Option<RemoteObject>>;

    /// Read one byte range of `object`
    ///
    /// A store that ignores the range may return everything from `range.start` to the
    /// end of the object, with `total_size` set to the object size.
    async fn fetch_range(&self, object: &RemoteObject, range: ByteRange) -> Result<RangeChunk>;

    /// Delete `object`
    async fn delete(&self, object: &RemoteObject) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Order candidates newest first, ties by ascending id
pub fn newest_first(a: &RemoteObject, b: &RemoteObject) -> Ordering {
    b.created_time
        .cmp(&a.created_time)
        .then_with(|| a.id.cmp(&b.id))
}

/// Pick the newest candidate
pub fn select_latest(candidates: impl IntoIterator<Item = RemoteObject>) -> Option<RemoteObject> {
    candidates.into_iter().min_by(newest_first)
}

/// Finds the single object a job should process
pub struct ObjectLocator<'a> {
    store: &'a dyn ObjectStore,
    retry: &'a RetryConfig,
}

impl<'a> ObjectLocator<'a> {
    /// Locator over `store`, retrying transient query failures with `retry`
    pub fn new(store: &'a dyn ObjectStore, retry: &'a RetryConfig) -> Self {
        Self { store, retry }
    }

    /// The newest object matching `filter`
    ///
    /// `Ok(None)` is the normal "nothing to do" result, not an error.
    pub async fn find_latest(&self, filter: &ObjectFilter) -> Result<Option<RemoteObject>> {
        debug!(
            store = self.store.name(),
            parent = %filter.parent_id,
            mime_type = %filter.mime_type,
            "querying for newest object"
        );
        let found = with_retry(self.retry, || self.store.find_latest(filter)).await?;
        match &found {
            Some(object) => info!(
                object_id = %object.id,
                name = %object.name,
                created = %object.created_time,
                "located newest object"
            ),
            None => info!(parent = %filter.parent_id, "no matching objects"),
        }
        Ok(found)
    }
}
