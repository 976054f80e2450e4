//! In-memory fakes of the remote services for unit tests.

use crate::auth::{AccessToken, CredentialProvider};
use crate::error::{Error, Result};
use crate::publisher::{ChunkAck, PublishTarget, UploadSession};
use crate::store::{ByteRange, ObjectStore, RangeChunk, select_latest};
use crate::types::{ObjectFilter, PublishRequest, RemoteObject};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// A remote object with the given id, name and creation time, size unknown
pub(crate) fn remote_object(id: &str, name: &str, created_time: DateTime<Utc>) -> RemoteObject {
    RemoteObject {
        id: id.to_string(),
        name: name.to_string(),
        created_time,
        size: None,
        mime_type: Some("video/mp4".to_string()),
    }
}

/// An API error with the given status, as a Google service would report it
pub(crate) fn api_error(service: &'static str, status: u16) -> Error {
    Error::Api {
        service,
        status,
        reason: None,
        message: format!("simulated {status}"),
    }
}

/// Credential provider handing out fixed tokens
pub(crate) struct StaticCredentials {
    token: Mutex<String>,
    refreshed: String,
    available: bool,
    refreshes: AtomicU32,
}

impl StaticCredentials {
    pub(crate) fn new(token: &str) -> Self {
        Self::with_refresh(token, token)
    }

    /// Starts with `current` and switches to `refreshed` on refresh
    pub(crate) fn with_refresh(current: &str, refreshed: &str) -> Self {
        Self {
            token: Mutex::new(current.to_string()),
            refreshed: refreshed.to_string(),
            available: true,
            refreshes: AtomicU32::new(0),
        }
    }

    /// Fails every call with [`Error::AuthUnavailable`]
    pub(crate) fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new("")
        }
    }

    pub(crate) fn refresh_count(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn get_token(&self) -> Result<AccessToken> {
        if !self.available {
            return Err(Error::AuthUnavailable("no token stored".into()));
        }
        Ok(AccessToken::new(self.token.lock().unwrap().clone(), None))
    }

    async fn refresh(&self) -> Result<AccessToken> {
        if !self.available {
            return Err(Error::AuthUnavailable("no refresh token".into()));
        }
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let mut token = self.token.lock().unwrap();
        *token = self.refreshed.clone();
        Ok(AccessToken::new(token.clone(), None))
    }
}

/// Object store holding objects in memory
#[derive(Default)]
pub(crate) struct FakeStore {
    objects: Mutex<Vec<(RemoteObject, Vec<u8>)>>,
    deleted: Mutex<Vec<String>>,
    find_failures: Mutex<VecDeque<u16>>,
    fetch_failure: Mutex<Option<(u32, u16)>>,
    delete_failure: Mutex<Option<u16>>,
    ignore_ranges: std::sync::atomic::AtomicBool,
    find_calls: AtomicU32,
    fetch_calls: AtomicU32,
    delete_calls: AtomicU32,
}

impl FakeStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, object: RemoteObject, data: Vec<u8>) {
        self.objects.lock().unwrap().push((object, data));
    }

    /// Fail the next listing calls with these statuses, in order
    pub(crate) fn fail_find_with(&self, statuses: &[u16]) {
        self.find_failures.lock().unwrap().extend(statuses);
    }

    /// Fail the `call`-th range request (0-based) with `status`
    pub(crate) fn fail_fetch_at(&self, call: u32, status: u16) {
        *self.fetch_failure.lock().unwrap() = Some((call, status));
    }

    pub(crate) fn fail_delete_with(&self, status: u16) {
        *self.delete_failure.lock().unwrap() = Some(status);
    }

    /// Answer every range request with the whole object
    pub(crate) fn ignore_ranges(&self) {
        self.ignore_ranges.store(true, Ordering::SeqCst);
    }

    pub(crate) fn find_calls(&self) -> u32 {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn delete_calls(&self) -> u32 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn deleted_ids(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.objects.lock().unwrap().iter().any(|(o, _)| o.id == id)
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn find_latest(&self, filter: &ObjectFilter) -> Result<Option<RemoteObject>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.find_failures.lock().unwrap().pop_front() {
            return Err(api_error("drive", status));
        }
        let objects = self.objects.lock().unwrap();
        Ok(select_latest(
            objects
                .iter()
                .map(|(o, _)| o.clone())
                .filter(|o| filter.accepts(o)),
        ))
    }

    async fn fetch_range(&self, object: &RemoteObject, range: ByteRange) -> Result<RangeChunk> {
        let call = self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((at, status)) = *self.fetch_failure.lock().unwrap() {
            if at == call {
                return Err(api_error("drive", status));
            }
        }

        let objects = self.objects.lock().unwrap();
        let data = objects
            .iter()
            .find(|(o, _)| o.id == object.id)
            .map(|(_, d)| d.clone())
            .ok_or_else(|| api_error("drive", 404))?;
        let len = data.len() as u64;

        if self.ignore_ranges.load(Ordering::SeqCst) {
            return Ok(RangeChunk {
                data: Bytes::from(data),
                total_size: Some(len),
            });
        }
        if range.start >= len {
            return Ok(RangeChunk {
                data: Bytes::new(),
                total_size: Some(len),
            });
        }
        let end = (range.end + 1).min(len);
        Ok(RangeChunk {
            data: Bytes::copy_from_slice(&data[range.start as usize..end as usize]),
            total_size: Some(len),
        })
    }

    async fn delete(&self, object: &RemoteObject) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = *self.delete_failure.lock().unwrap() {
            return Err(api_error("drive", status));
        }
        self.objects.lock().unwrap().retain(|(o, _)| o.id != object.id);
        self.deleted.lock().unwrap().push(object.id.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake-store"
    }
}

/// What a [`FakeTarget`] does with one chunk request
#[derive(Clone, Copy, Debug)]
pub(crate) enum ChunkFault {
    /// Reject the chunk with this status, persisting nothing
    Fail(u16),
    /// Persist the chunk, then report this status as if the response was lost
    PersistThenFail(u16),
}

/// Publishing service that keeps the uploaded bytes in memory
pub(crate) struct FakeTarget {
    remote_id: String,
    received: Mutex<Vec<u8>>,
    requests: Mutex<Vec<PublishRequest>>,
    session_failures: Mutex<VecDeque<u16>>,
    chunk_faults: Mutex<VecDeque<Option<ChunkFault>>>,
    status_failures: Mutex<VecDeque<u16>>,
    sessions: AtomicU32,
    chunk_calls: AtomicU32,
    status_queries: AtomicU32,
    bytes_sent: AtomicU64,
}

impl FakeTarget {
    pub(crate) fn new() -> Self {
        Self {
            remote_id: "video-1".to_string(),
            received: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            session_failures: Mutex::new(VecDeque::new()),
            chunk_faults: Mutex::new(VecDeque::new()),
            status_failures: Mutex::new(VecDeque::new()),
            sessions: AtomicU32::new(0),
            chunk_calls: AtomicU32::new(0),
            status_queries: AtomicU32::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    pub(crate) fn fail_sessions_with(&self, statuses: &[u16]) {
        self.session_failures.lock().unwrap().extend(statuses);
    }

    /// Script the next chunk requests; `None` lets a request through
    pub(crate) fn script_chunks(&self, faults: Vec<Option<ChunkFault>>) {
        self.chunk_faults.lock().unwrap().extend(faults);
    }

    /// Fail the next `count` chunk requests with `status`
    pub(crate) fn fail_chunks(&self, count: usize, status: u16) {
        self.script_chunks(vec![Some(ChunkFault::Fail(status)); count]);
    }

    pub(crate) fn fail_status_queries_with(&self, statuses: &[u16]) {
        self.status_failures.lock().unwrap().extend(statuses);
    }

    pub(crate) fn received(&self) -> Vec<u8> {
        self.received.lock().unwrap().clone()
    }

    pub(crate) fn requests(&self) -> Vec<PublishRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn sessions(&self) -> u32 {
        self.sessions.load(Ordering::SeqCst)
    }

    pub(crate) fn chunk_calls(&self) -> u32 {
        self.chunk_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn status_queries(&self) -> u32 {
        self.status_queries.load(Ordering::SeqCst)
    }

    pub(crate) fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::SeqCst)
    }

    fn ack(&self, total_size: u64) -> ChunkAck {
        let persisted = self.received.lock().unwrap().len() as u64;
        if persisted == total_size {
            ChunkAck::Complete {
                remote_id: self.remote_id.clone(),
            }
        } else {
            ChunkAck::Incomplete {
                next_offset: persisted,
            }
        }
    }

    fn persist(&self, offset: u64, chunk: &[u8]) -> Result<()> {
        let mut received = self.received.lock().unwrap();
        if offset > received.len() as u64 {
            return Err(api_error("youtube", 400));
        }
        received.truncate(offset as usize);
        received.extend_from_slice(chunk);
        Ok(())
    }
}

#[async_trait]
impl PublishTarget for FakeTarget {
    async fn start_session(
        &self,
        request: &PublishRequest,
        _total_size: u64,
    ) -> Result<UploadSession> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.session_failures.lock().unwrap().pop_front() {
            return Err(api_error("youtube", status));
        }
        self.requests.lock().unwrap().push(request.clone());
        Ok(UploadSession {
            uri: "fake://upload/session-1".to_string(),
        })
    }

    async fn send_chunk(
        &self,
        _session: &UploadSession,
        offset: u64,
        chunk: Bytes,
        total_size: u64,
    ) -> Result<ChunkAck> {
        self.chunk_calls.fetch_add(1, Ordering::SeqCst);
        self.bytes_sent
            .fetch_add(chunk.len() as u64, Ordering::SeqCst);
        let fault = self.chunk_faults.lock().unwrap().pop_front().flatten();
        match fault {
            Some(ChunkFault::Fail(status)) => Err(api_error("youtube", status)),
            Some(ChunkFault::PersistThenFail(status)) => {
                self.persist(offset, &chunk)?;
                Err(api_error("youtube", status))
            }
            None => {
                self.persist(offset, &chunk)?;
                Ok(self.ack(total_size))
            }
        }
    }

    async fn query_status(&self, _session: &UploadSession, total_size: u64) -> Result<ChunkAck> {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.status_failures.lock().unwrap().pop_front() {
            return Err(api_error("youtube", status));
        }
        Ok(self.ack(total_size))
    }

    fn public_url(&self, remote_id: &str) -> Option<String> {
        Some(format!("https://videos.example/{remote_id}"))
    }

    fn name(&self) -> &'static str {
        "fake-target"
    }
}
