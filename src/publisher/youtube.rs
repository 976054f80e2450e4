//! YouTube Data API v3 resumable upload client

use super::{ChunkAck, PublishTarget, UploadSession};
use crate::auth::CredentialProvider;
use crate::error::{Error, Result};
use crate::google::{api_error, endpoint, send_authorized};
use crate::types::PublishRequest;
use crate::utils::next_offset_from_range;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_RANGE, LOCATION, RANGE};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use url::Url;

const SERVICE: &str = "youtube";
const UPLOAD_PATH: &str = "/upload/youtube/v3/videos";
const UPLOAD_CONTENT_TYPE: &str = "video/*";

#[derive(Deserialize)]
struct VideoResource {
    id: String,
}

/// YouTube client implementing [`PublishTarget`]
///
/// The service answers unfinished chunks with `308 Resume Incomplete`, so the
/// `reqwest::Client` handed in should not follow redirects.
pub struct YouTubeClient {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    base: String,
}

impl YouTubeClient {
    /// Client against the API at `base` (normally `https://www.googleapis.com`)
    pub fn new(
        http: reqwest::Client,
        credentials: Arc<dyn CredentialProvider>,
        base: impl Into<String>,
    ) -> Self {
        Self {
            http,
            credentials,
            base: base.into(),
        }
    }

    /// Request body for `videos.insert`
    pub(crate) fn video_resource(request: &PublishRequest) -> serde_json::Value {
        json!({
            "snippet": {
                "title": request.title,
                "description": request.description,
                "tags": request.tags,
                "categoryId": request.category_id,
            },
            "status": {
                "privacyStatus": request.privacy.as_str(),
                "selfDeclaredMadeForKids": request.made_for_kids,
            }
        })
    }

    async fn parse_ack(response: Response) -> Result<ChunkAck> {
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                let video: VideoResource = response.json().await?;
                Ok(ChunkAck::Complete { remote_id: video.id })
            }
            StatusCode::PERMANENT_REDIRECT => {
                // No Range header means nothing has been persisted yet
                let next_offset = response
                    .headers()
                    .get(RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(next_offset_from_range)
                    .unwrap_or(0);
                Ok(ChunkAck::Incomplete { next_offset })
            }
            _ => Err(api_error(SERVICE, response).await),
        }
    }
}

#[async_trait]
impl PublishTarget for YouTubeClient {
    async fn start_session(
        &self,
        request: &PublishRequest,
        total_size: u64,
    ) -> Result<UploadSession> {
        let mut url = Url::parse(&endpoint(&self.base, UPLOAD_PATH))
            .map_err(|e| Error::config("endpoints.youtube_base", e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("uploadType", "resumable")
            .append_pair("part", "snippet,status");
        let body = Self::video_resource(request);

        let response = send_authorized(self.credentials.as_ref(), |token| {
            self.http
                .post(url.clone())
                .bearer_auth(token)
                .header("X-Upload-Content-Length", total_size.to_string())
                .header("X-Upload-Content-Type", UPLOAD_CONTENT_TYPE)
                .json(&body)
        })
        .await?;

        if !response.status().is_success() {
            return Err(api_error(SERVICE, response).await);
        }
        let uri = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::Protocol("upload session response has no Location".into()))?
            .to_string();
        debug!(title = %request.title, "opened resumable upload session");
        Ok(UploadSession { uri })
    }

    async fn send_chunk(
        &self,
        session: &UploadSession,
        offset: u64,
        chunk: Bytes,
        total_size: u64,
    ) -> Result<ChunkAck> {
        let end = offset + chunk.len() as u64 - 1;
        let content_range = format!("bytes {offset}-{end}/{total_size}");

        let response = send_authorized(self.credentials.as_ref(), |token| {
            self.http
                .put(&session.uri)
                .bearer_auth(token)
                .header(CONTENT_RANGE, content_range.as_str())
                .body(chunk.clone())
        })
        .await?;
        Self::parse_ack(response).await
    }

    async fn query_status(&self, session: &UploadSession, total_size: u64) -> Result<ChunkAck> {
        let content_range = format!("bytes */{total_size}");
        let response = send_authorized(self.credentials.as_ref(), |token| {
            self.http
                .put(&session.uri)
                .bearer_auth(token)
                .header(CONTENT_RANGE, content_range.as_str())
                .body(Bytes::new())
        })
        .await?;
        Self::parse_ack(response).await
    }

    fn public_url(&self, remote_id: &str) -> Option<String> {
        Some(format!("https://youtu.be/{remote_id}"))
    }

    fn name(&self) -> &'static str {
        "youtube"
    }
}
