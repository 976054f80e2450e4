//! Configuration types for tube-relay
//!
//! Every field has a serde default so a config file only needs the settings that differ
//! from the defaults; in practice that is just `source.folder_id`.

use crate::error::{Error, Result};
use crate::types::PrivacyStatus;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "TUBE_RELAY_";

/// YouTube requires every chunk except the last to be a multiple of 256 KiB
pub const CHUNK_ALIGNMENT: usize = 256 * 1024;

/// Where to look for candidate videos
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Drive folder whose direct children are considered
    #[serde(default)]
    pub folder_id: String,

    /// MIME type a candidate must have (default: "video/mp4")
    #[serde(default = "default_mime_type")]
    pub mime_type: String,

    /// How many of the newest candidates to fetch when locating (default: 10)
    ///
    /// Only the newest is processed; the extra entries let ties on creation time be
    /// broken by identifier. The tie-break only sees this one page, so if more than
    /// `page_size` objects share the newest creation time the smallest identifier may
    /// not be among them.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            folder_id: String::new(),
            mime_type: default_mime_type(),
            page_size: default_page_size(),
        }
    }
}

/// Static metadata applied to every published video
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Video description (default: "Uploaded via automation.")
    #[serde(default = "default_description")]
    pub description: String,

    /// Tags attached to every upload (default: ["shorts"])
    #[serde(default = "default_tags")]
    pub tags: Vec<String>,

    /// YouTube category id (default: "22", People & Blogs)
    #[serde(default = "default_category_id")]
    pub category_id: String,

    /// Visibility of the published video (default: public)
    #[serde(default)]
    pub privacy: PrivacyStatus,

    /// Declare the video as made for kids (default: false)
    #[serde(default)]
    pub made_for_kids: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            description: default_description(),
            tags: default_tags(),
            category_id: default_category_id(),
            privacy: PrivacyStatus::default(),
            made_for_kids: false,
        }
    }
}

/// Chunked transfer settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Directory the working copy is written to (default: ".")
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Bytes per chunk for both directions (default: 8 MiB)
    ///
    /// Must be a positive multiple of 256 KiB.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Per-request timeout (default: 300 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            chunk_size: default_chunk_size(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Retry policy for transient remote failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 5 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each retry (default: 1.0, a fixed delay)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// A policy that retries `max_attempts` times without waiting
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

/// Where the two credential documents come from
///
/// A file path takes precedence over the corresponding environment variable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Path to the OAuth client document (`{"installed": {...}}`)
    #[serde(default)]
    pub client_secrets_path: Option<PathBuf>,

    /// Env var holding the OAuth client document, base64 or raw JSON (default: "CREDENTIALS_JSON")
    #[serde(default = "default_client_secrets_env")]
    pub client_secrets_env: String,

    /// Path to the user token document; refreshed tokens are written back here
    #[serde(default)]
    pub token_path: Option<PathBuf>,

    /// Env var holding the user token document, base64 or raw JSON (default: "TOKEN_JSON")
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            client_secrets_path: None,
            client_secrets_env: default_client_secrets_env(),
            token_path: None,
            token_env: default_token_env(),
        }
    }
}

/// Base URLs of the remote services, overridable for testing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Drive API base (default: "https://www.googleapis.com")
    #[serde(default = "default_google_api_base")]
    pub drive_base: String,

    /// YouTube API base (default: "https://www.googleapis.com")
    #[serde(default = "default_google_api_base")]
    pub youtube_base: String,

    /// OAuth token endpoint; when unset the `token_uri` from the client document is used
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            drive_base: default_google_api_base(),
            youtube_base: default_google_api_base(),
            token_uri: None,
        }
    }
}

/// Main configuration for a relay job
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Candidate selection
    #[serde(default)]
    pub source: SourceConfig,

    /// Metadata for published videos
    #[serde(default)]
    pub publish: PublishConfig,

    /// Chunked transfer settings
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Retry policy for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Credential document locations
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Remote service endpoints
    #[serde(default)]
    pub endpoints: EndpointConfig,
}

impl Config {
    /// Load configuration from an optional TOML file merged with `TUBE_RELAY_` env vars
    ///
    /// Nested keys use a double underscore: `TUBE_RELAY_SOURCE__FOLDER_ID`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::Config {
                    message: format!("config file {} not found", path.display()),
                    key: None,
                });
            }
            figment = figment.merge(Toml::file(path));
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| Error::Config {
                message: e.to_string(),
                key: None,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string without consulting the environment
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .map_err(|e| Error::Config {
                message: e.to_string(),
                key: None,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the job cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.source.folder_id.trim().is_empty() {
            return Err(Error::config("source.folder_id", "must not be empty"));
        }
        if self.source.mime_type.trim().is_empty() {
            return Err(Error::config("source.mime_type", "must not be empty"));
        }
        if !(1..=1000).contains(&self.source.page_size) {
            return Err(Error::config(
                "source.page_size",
                format!("must be between 1 and 1000, got {}", self.source.page_size),
            ));
        }
        let chunk = self.transfer.chunk_size;
        if chunk == 0 || chunk % CHUNK_ALIGNMENT != 0 {
            return Err(Error::config(
                "transfer.chunk_size",
                format!("must be a positive multiple of {CHUNK_ALIGNMENT} bytes, got {chunk}"),
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                "must be at least 1.0",
            ));
        }
        Ok(())
    }
}

fn default_mime_type() -> String {
    "video/mp4".to_string()
}

fn default_page_size() -> u32 {
    10
}

fn default_description() -> String {
    "Uploaded via automation.".to_string()
}

fn default_tags() -> Vec<String> {
    vec!["shorts".to_string()]
}

fn default_category_id() -> String {
    "22".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_chunk_size() -> usize {
    32 * CHUNK_ALIGNMENT
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_client_secrets_env() -> String {
    "CREDENTIALS_JSON".to_string()
}

fn default_token_env() -> String {
    "TOKEN_JSON".to_string()
}

fn default_google_api_base() -> String {
    "https://www.googleapis.com".to_string()
}

/// Durations as seconds, fractions allowed (`initial_delay = 0.25`)
mod duration_serde {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_u64(duration.as_secs())
        } else {
            serializer.serialize_f64(duration.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid duration {secs}: {e}")))
    }
}
