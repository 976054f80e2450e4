//! OAuth refresh-token credential provider

use super::token_store::{StoredToken, TokenStore, decode_document};
use super::traits::{AccessToken, CredentialProvider};
use crate::config::{CredentialsConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::retry::with_retry;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Token endpoint used when the client document does not name one
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// The application-identity document
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ClientSecrets {
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Token endpoint
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretsDocument {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ClientSecrets {
    /// Parse a client document in either the `installed` or `web` layout
    ///
    /// Base64-encoded documents are accepted too.
    pub fn from_document(raw: &str) -> Result<Self> {
        let json = decode_document(raw)?;
        let document: ClientSecretsDocument = serde_json::from_str(&json)
            .map_err(|e| Error::AuthUnavailable(format!("invalid client document: {e}")))?;
        document.installed.or(document.web).ok_or_else(|| {
            Error::AuthUnavailable("client document has neither 'installed' nor 'web'".into())
        })
    }

    /// Load from the configured file, falling back to the configured env var
    pub fn load(config: &CredentialsConfig) -> Result<Self> {
        match &config.client_secrets_path {
            Some(path) => Self::from_file(path),
            None => {
                let raw = std::env::var(&config.client_secrets_env).map_err(|_| {
                    Error::AuthUnavailable(format!(
                        "environment variable {} is not set",
                        config.client_secrets_env
                    ))
                })?;
                Self::from_document(&raw)
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::AuthUnavailable(format!("cannot read client document {}: {e}", path.display()))
        })?;
        Self::from_document(&raw)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Credential provider that refreshes through the OAuth token endpoint
///
/// The stored token is loaded lazily on first use and cached for the rest of the run.
/// Refreshes are serialised by a mutex so concurrent callers share one refresh.
pub struct OAuthCredentialProvider {
    http: reqwest::Client,
    secrets: ClientSecrets,
    token_uri: String,
    store: Arc<dyn TokenStore>,
    retry: RetryConfig,
    cached: Mutex<Option<StoredToken>>,
}

impl OAuthCredentialProvider {
    /// Create a provider
    ///
    /// `token_uri` overrides the endpoint named in the client document.
    pub fn new(
        http: reqwest::Client,
        secrets: ClientSecrets,
        store: Arc<dyn TokenStore>,
        token_uri: Option<String>,
        retry: RetryConfig,
    ) -> Self {
        let token_uri = token_uri.unwrap_or_else(|| secrets.token_uri.clone());
        Self {
            http,
            secrets,
            token_uri,
            store,
            retry,
            cached: Mutex::new(None),
        }
    }

    async fn load_cached(&self, cached: &mut Option<StoredToken>) -> Result<StoredToken> {
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = self.store.load().await?.ok_or_else(|| {
            Error::AuthUnavailable(format!("no token in {} store", self.store.name()))
        })?;
        debug!(store = self.store.name(), "loaded stored token");
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn refresh_locked(&self, cached: &mut Option<StoredToken>) -> Result<AccessToken> {
        let mut token = self.load_cached(cached).await?;
        let refresh_token = token.refresh_token.clone().ok_or_else(|| {
            Error::AuthUnavailable("access token expired and no refresh token is stored".into())
        })?;

        let refresh_token = refresh_token.as_str();
        let response = with_retry(&self.retry, || self.request_refresh(refresh_token)).await?;

        token.token = Some(response.access_token.clone());
        token.expiry = response
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        if let Some(rotated) = response.refresh_token {
            token.refresh_token = Some(rotated);
        }
        if let Some(scope) = response.scope {
            token.scopes = Some(scope.split_whitespace().map(str::to_string).collect());
        }

        if let Err(e) = self.store.save(&token).await {
            warn!(store = self.store.name(), error = %e, "failed to persist refreshed token");
        }
        info!(expires_at = ?token.expiry, "access token refreshed");

        let access = AccessToken::new(response.access_token, token.expiry);
        *cached = Some(token);
        Ok(access)
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<TokenErrorResponse>(&body) {
            Ok(err) if err.error == "invalid_grant" || err.error == "invalid_client" => {
                Err(Error::AuthUnavailable(format!(
                    "refresh rejected: {}{}",
                    err.error,
                    err.error_description
                        .map(|d| format!(" ({d})"))
                        .unwrap_or_default()
                )))
            }
            Ok(err) => Err(Error::Api {
                service: "oauth",
                status: status.as_u16(),
                reason: Some(err.error),
                message: err.error_description.unwrap_or_default(),
            }),
            Err(_) => Err(Error::Api {
                service: "oauth",
                status: status.as_u16(),
                reason: None,
                message: body,
            }),
        }
    }
}

#[async_trait]
impl CredentialProvider for OAuthCredentialProvider {
    async fn get_token(&self) -> Result<AccessToken> {
        let mut cached = self.cached.lock().await;
        let token = self.load_cached(&mut cached).await?;
        let Some(secret) = token.access_token() else {
            debug!("no access token stored, refreshing");
            return self.refresh_locked(&mut cached).await;
        };
        let access = AccessToken::new(secret, token.expiry);
        if access.needs_refresh(Utc::now()) {
            debug!(expires_at = ?access.expires_at(), "access token expired, refreshing");
            return self.refresh_locked(&mut cached).await;
        }
        Ok(access)
    }

    async fn refresh(&self) -> Result<AccessToken> {
        let mut cached = self.cached.lock().await;
        self.refresh_locked(&mut cached).await
    }
}
