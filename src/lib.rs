//! # tube-relay
//!
//! Unattended relay that publishes the newest video from a Google Drive folder to
//! YouTube, then removes the Drive original.
//!
//! ## Design
//!
//! - **One job per run** - locate, download, upload, clean up; schedule it externally
//! - **Source is sacred** - the Drive file is only deleted after YouTube accepted the video
//! - **Resumable** - uploads are chunked and resume from the acknowledged offset after
//!   transient failures
//! - **Event-driven** - embedders subscribe to job events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tube_relay::auth::{ClientSecrets, OAuthCredentialProvider, token_store_from_config};
//! use tube_relay::{Config, DriveClient, PublishJob, YouTubeClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(Some(std::path::Path::new("tube-relay.toml")))?;
//!     let http = reqwest::Client::builder()
//!         .redirect(reqwest::redirect::Policy::none())
//!         .build()?;
//!
//!     let credentials = Arc::new(OAuthCredentialProvider::new(
//!         http.clone(),
//!         ClientSecrets::load(&config.credentials)?,
//!         token_store_from_config(&config.credentials),
//!         config.endpoints.token_uri.clone(),
//!         config.retry.clone(),
//!     ));
//!     let drive = DriveClient::new(http.clone(), credentials.clone(), &config.endpoints.drive_base);
//!     let youtube = YouTubeClient::new(http, credentials.clone(), &config.endpoints.youtube_base);
//!
//!     let job = PublishJob::new(config, credentials, Arc::new(drive), Arc::new(youtube));
//!     let report = job.run().await?;
//!     println!("{:?}", report.outcome);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// OAuth credentials and token persistence
pub mod auth;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Publish orchestrator and cleanup stage
pub mod pipeline;
/// Publishing service interface and the YouTube client
pub mod publisher;
/// Retry policy for transient failures
pub mod retry;
/// Remote object store interface, the Drive client and the object locator
pub mod store;
/// Chunked download and resumable upload
pub mod transfer;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

mod google;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use auth::{CredentialProvider, OAuthCredentialProvider};
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::PublishJob;
pub use publisher::{PublishTarget, YouTubeClient};
pub use store::{DriveClient, ObjectLocator, ObjectStore};
pub use transfer::TransferEngine;
pub use types::{
    CleanupReport, Event, JobOutcome, JobReport, JobState, LocalCleanup, PublishRequest,
    RemoteObject, SourceCleanup, TransferProgress,
};

/// Cancel `token` when the process receives a termination signal
///
/// Spawn this next to a job created with
/// [`PublishJob::with_cancellation`]; the in-flight transfer then stops at the next
/// chunk boundary and the job reports a download or upload failure.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let token = CancellationToken::new();
/// tokio::spawn(tube_relay::cancel_on_signal(token.clone()));
/// # }
/// ```
pub async fn cancel_on_signal(token: tokio_util::sync::CancellationToken) {
    tokio::select! {
        _ = wait_for_signal() => {
            tracing::warn!("cancelling in-flight transfer");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    fn register(kind: SignalKind, name: &str) -> Option<Signal> {
        signal(kind)
            .inspect_err(|e| tracing::warn!(error = %e, signal = name, "could not register handler"))
            .ok()
    }

    async fn next(signal: Option<&mut Signal>) {
        match signal {
            Some(signal) => {
                signal.recv().await;
            }
            None => std::future::pending().await,
        }
    }

    let mut sigterm = register(SignalKind::terminate(), "SIGTERM");
    let mut sigint = register(SignalKind::interrupt(), "SIGINT");

    if sigterm.is_none() && sigint.is_none() {
        tracing::error!("no signal handlers registered, falling back to ctrl_c");
        tokio::signal::ctrl_c().await.ok();
        return;
    }

    tokio::select! {
        _ = next(sigterm.as_mut()) => tracing::info!("received SIGTERM"),
        _ = next(sigint.as_mut()) => tracing::info!("received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not listen for ctrl_c");
        std::future::pending::<()>().await;
    }
    tracing::info!("received ctrl_c");
}
