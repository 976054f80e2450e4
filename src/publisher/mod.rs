//! Publishing service interface
//!
//! A publish is a resumable upload: open a session carrying the metadata, then send
//! the payload in sequential chunks. After an interruption the service is asked how
//! much it has, and sending resumes from there.

mod youtube;

pub use youtube::YouTubeClient;

use crate::error::Result;
use crate::types::PublishRequest;
use async_trait::async_trait;
use bytes::Bytes;

/// An open resumable upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadSession {
    /// Session URI returned by the service; chunks are sent here
    pub uri: String,
}

/// What the service acknowledged after a chunk or status query
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkAck {
    /// More bytes are expected, starting at `next_offset`
    Incomplete {
        /// First byte the service has not persisted
        next_offset: u64,
    },
    /// All bytes arrived and the published item was created
    Complete {
        /// Identifier assigned by the service
        remote_id: String,
    },
}

/// Remote publishing service operations the pipeline consumes
#[async_trait]
pub trait PublishTarget: Send + Sync {
    /// Open a resumable upload for `total_size` bytes described by `request`
    async fn start_session(&self, request: &PublishRequest, total_size: u64)
    -> Result<UploadSession>;

    /// Send `chunk`, which starts at byte `offset` of a `total_size`-byte payload
    async fn send_chunk(
        &self,
        session: &UploadSession,
        offset: u64,
        chunk: Bytes,
        total_size: u64,
    ) -> Result<ChunkAck>;

    /// Ask how much of the payload the service has persisted
    async fn query_status(&self, session: &UploadSession, total_size: u64) -> Result<ChunkAck>;

    /// Public URL for a published item, if the service has one
    fn public_url(&self, _remote_id: &str) -> Option<String> {
        None
    }

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
