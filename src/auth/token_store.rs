//! Persistence for the user token document
//!
//! The provider reads the token once per run and writes it back after every refresh.
//! Where it lives is up to the [`TokenStore`] implementation: a JSON file, an
//! environment variable, or memory.

use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// The user token document
///
/// Field names follow the authorized-user JSON that Google's client libraries write,
/// so a token produced by the usual consent flow can be used unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    /// Current access token; absent until the first refresh
    #[serde(default, alias = "access_token", skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Long-lived refresh credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token endpoint recorded alongside the token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,

    /// Client id recorded alongside the token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Client secret recorded alongside the token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Granted scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,

    /// Access token expiry; absent means unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// The access token, if one is stored and non-empty
    pub fn access_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Parse a token document, raw or base64-encoded
pub fn parse_token_document(raw: &str) -> Result<StoredToken> {
    let json = decode_document(raw)?;
    serde_json::from_str(&json)
        .map_err(|e| Error::AuthUnavailable(format!("invalid token document: {e}")))
}

/// Decode a credential document supplied either as raw JSON or base64-encoded JSON
pub fn decode_document(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return Ok(trimmed.to_string());
    }
    let bytes = STANDARD
        .decode(trimmed)
        .map_err(|e| Error::AuthUnavailable(format!("document is neither JSON nor base64: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| Error::AuthUnavailable(format!("decoded document is not UTF-8: {e}")))
}

/// Storage backend for the user token
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the stored token, `None` if there is none
    async fn load(&self) -> Result<Option<StoredToken>>;

    /// Persist a refreshed token
    async fn save(&self, token: &StoredToken) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Token stored as a JSON file, replaced atomically on save
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Store backed by the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the token file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<StoredToken>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(Some(parse_token_document(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, token: &StoredToken) -> Result<()> {
        let json = serde_json::to_vec_pretty(token)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = ?self.path, "saved refreshed token");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Token read from an environment variable
///
/// The environment cannot be written back, so refreshed tokens are only kept in memory
/// for the rest of the run and the next run refreshes again from the refresh token.
#[derive(Debug)]
pub struct EnvTokenStore {
    var: String,
    raw: Option<String>,
    refreshed: Mutex<Option<StoredToken>>,
    warned: AtomicBool,
}

impl EnvTokenStore {
    /// Store reading the environment variable `var`
    pub fn from_env(var: impl Into<String>) -> Self {
        let var = var.into();
        let raw = std::env::var(&var).ok();
        Self::with_value(var, raw)
    }

    /// Store with an explicit value, as if `var` held `raw`
    pub fn with_value(var: impl Into<String>, raw: Option<String>) -> Self {
        Self {
            var: var.into(),
            raw,
            refreshed: Mutex::new(None),
            warned: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl TokenStore for EnvTokenStore {
    async fn load(&self) -> Result<Option<StoredToken>> {
        if let Ok(guard) = self.refreshed.lock() {
            if let Some(token) = guard.as_ref() {
                return Ok(Some(token.clone()));
            }
        }
        match self.raw.as_deref() {
            Some(raw) if !raw.trim().is_empty() => Ok(Some(parse_token_document(raw)?)),
            _ => Ok(None),
        }
    }

    async fn save(&self, token: &StoredToken) -> Result<()> {
        if !self.warned.swap(true, Ordering::Relaxed) {
            warn!(
                var = %self.var,
                "token comes from the environment; the refreshed token is kept for this run only"
            );
        }
        let mut guard = self
            .refreshed
            .lock()
            .map_err(|_| Error::Other("token store lock poisoned".into()))?;
        *guard = Some(token.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "env"
    }
}

/// Token kept in memory only
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<StoredToken>>,
    saves: std::sync::atomic::AtomicUsize,
}

impl MemoryTokenStore {
    /// Store holding `token`
    pub fn new(token: Option<StoredToken>) -> Self {
        Self {
            token: Mutex::new(token),
            saves: Default::default(),
        }
    }

    /// How many times a token was saved
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// The currently stored token
    pub fn current(&self) -> Option<StoredToken> {
        self.token.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<StoredToken>> {
        Ok(self.current())
    }

    async fn save(&self, token: &StoredToken) -> Result<()> {
        let mut guard = self
            .token
            .lock()
            .map_err(|_| Error::Other("token store lock poisoned".into()))?;
        *guard = Some(token.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
