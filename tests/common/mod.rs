//! Common test utilities for tube-relay integration tests
//!
//! One wiremock server stands in for the Drive API, the YouTube upload endpoint and the
//! OAuth token endpoint.

#[allow(dead_code)]
pub mod responders;

#[allow(unused_imports)]
pub use responders::*;

use chrono::{Duration, Utc};
use std::sync::Arc;
use tempfile::TempDir;
use tube_relay::auth::{ClientSecrets, MemoryTokenStore, OAuthCredentialProvider, StoredToken};
use tube_relay::config::RetryConfig;
use tube_relay::{Config, DriveClient, PublishJob, YouTubeClient};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Access token the mocked token endpoint hands out
pub const FRESH_TOKEN: &str = "ya29.fresh";

/// Everything a test needs to run one job against the mock server
pub struct Fixture {
    pub server: MockServer,
    pub work_dir: TempDir,
    pub token_store: Arc<MemoryTokenStore>,
}

impl Fixture {
    /// Start the server and mount the token endpoint
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": FRESH_TOKEN,
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        // Expired an hour ago, so the first call goes through the refresh grant
        let token_store = Arc::new(MemoryTokenStore::new(Some(StoredToken {
            token: Some("ya29.stale".into()),
            refresh_token: Some("1//refresh".into()),
            token_uri: None,
            client_id: None,
            client_secret: None,
            scopes: None,
            expiry: Some(Utc::now() - Duration::hours(1)),
        })));

        Self {
            server,
            work_dir: TempDir::new().unwrap(),
            token_store,
        }
    }

    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.source.folder_id = "folder-1".into();
        config.transfer.work_dir = self.work_dir.path().to_path_buf();
        config.transfer.chunk_size = 256;
        config.retry = RetryConfig::immediate(3);
        config.endpoints.drive_base = self.server.uri();
        config.endpoints.youtube_base = self.server.uri();
        config.endpoints.token_uri = Some(format!("{}/token", self.server.uri()));
        config
    }

    /// Wire the real clients against the mock server
    pub fn job(&self) -> PublishJob {
        let config = self.config();
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        let credentials = Arc::new(OAuthCredentialProvider::new(
            http.clone(),
            ClientSecrets {
                client_id: "client-id".into(),
                client_secret: "client-secret".into(),
                token_uri: "http://unused.invalid/token".into(),
            },
            self.token_store.clone(),
            config.endpoints.token_uri.clone(),
            config.retry.clone(),
        ));
        let drive = DriveClient::new(
            http.clone(),
            credentials.clone(),
            config.endpoints.drive_base.as_str(),
        );
        let youtube = YouTubeClient::new(
            http,
            credentials.clone(),
            config.endpoints.youtube_base.as_str(),
        );
        PublishJob::new(config, credentials, Arc::new(drive), Arc::new(youtube))
    }

    /// URI the upload session endpoint hands out
    pub fn session_uri(&self) -> String {
        format!("{}/upload/session/1", self.server.uri())
    }
}

/// Deterministic test payload
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

/// Drive `files.list` body for `(id, name, createdTime)` entries
pub fn file_list(files: &[(&str, &str, &str)]) -> serde_json::Value {
    serde_json::json!({
        "files": files
            .iter()
            .map(|(id, name, created)| serde_json::json!({
                "id": id,
                "name": name,
                "createdTime": created,
                "mimeType": "video/mp4"
            }))
            .collect::<Vec<_>>()
    })
}
