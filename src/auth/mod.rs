//! Credential provider and token persistence
//!
//! The pipeline and the API clients only see [`CredentialProvider`]. The OAuth
//! implementation refreshes through the token endpoint and writes refreshed tokens to a
//! [`TokenStore`], so persistence can be a file, the environment, or memory in tests.

mod oauth;
mod token_store;
mod traits;

pub use oauth::{ClientSecrets, DEFAULT_TOKEN_URI, OAuthCredentialProvider};
pub use token_store::{
    EnvTokenStore, FileTokenStore, MemoryTokenStore, StoredToken, TokenStore, decode_document,
    parse_token_document,
};
pub use traits::{AccessToken, CredentialProvider, REFRESH_MARGIN_SECS};

use crate::config::CredentialsConfig;
use std::sync::Arc;

/// Pick the token store named by the configuration
///
/// A configured `token_path` wins; otherwise the token is read from `token_env`.
pub fn token_store_from_config(config: &CredentialsConfig) -> Arc<dyn TokenStore> {
    match &config.token_path {
        Some(path) => Arc::new(FileTokenStore::new(path.clone())),
        None => Arc::new(EnvTokenStore::from_env(config.token_env.clone())),
    }
}
