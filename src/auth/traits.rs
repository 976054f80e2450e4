//! Credential provider interface

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Tokens this many seconds from expiry are refreshed before use
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// A bearer token for the remote services
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    secret: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Create a token; `expires_at = None` means the expiry is unknown
    pub fn new(secret: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    /// The raw bearer value
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// When the token stops being accepted, if known
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the token should be refreshed before use at `now`
    ///
    /// Tokens with an unknown expiry are used until a service rejects them.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at - Duration::seconds(REFRESH_MARGIN_SECS) <= now)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Supplies valid access tokens to the API clients and the pipeline
///
/// Implementations own refresh-on-expiry and persistence of refreshed tokens. Both
/// methods fail with [`crate::Error::AuthUnavailable`] when no valid token can be
/// produced, which is fatal to the job.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return a token that is valid now, refreshing it first if it is about to expire
    async fn get_token(&self) -> crate::Result<AccessToken>;

    /// Force a refresh, e.g. after a service rejected the current token with 401
    async fn refresh(&self) -> crate::Result<AccessToken>;
}
