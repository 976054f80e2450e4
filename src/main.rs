use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tube_relay::auth::{ClientSecrets, OAuthCredentialProvider, token_store_from_config};
use tube_relay::{Config, DriveClient, JobOutcome, PublishJob, YouTubeClient, cancel_on_signal};

/// Config file read when `TUBE_RELAY_CONFIG` is unset and the file exists
const DEFAULT_CONFIG_FILE: &str = "tube-relay.toml";

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is normal in production
    dotenvy::dotenv().ok();
    init_tracing();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let json = std::env::var("TUBE_RELAY_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn config_path() -> Option<PathBuf> {
    match std::env::var_os("TUBE_RELAY_CONFIG") {
        Some(path) => Some(PathBuf::from(path)),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.exists().then_some(default)
        }
    }
}

/// Run one job; `Ok(true)` when it published or had nothing to do
async fn run() -> Result<bool> {
    let path = config_path();
    match &path {
        Some(p) => info!("Loading configuration from {:?}", p),
        None => info!("No config file, using environment only"),
    }
    let config = Config::load(path.as_deref()).context("Failed to load configuration")?;

    // The resumable upload protocol answers with 308, which must not be followed
    let http = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(config.transfer.request_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let secrets =
        ClientSecrets::load(&config.credentials).context("Failed to load OAuth client secrets")?;
    let credentials = Arc::new(OAuthCredentialProvider::new(
        http.clone(),
        secrets,
        token_store_from_config(&config.credentials),
        config.endpoints.token_uri.clone(),
        config.retry.clone(),
    ));

    let drive = DriveClient::new(
        http.clone(),
        credentials.clone(),
        config.endpoints.drive_base.as_str(),
    )
    .with_page_size(config.source.page_size);
    let youtube = YouTubeClient::new(
        http,
        credentials.clone(),
        config.endpoints.youtube_base.as_str(),
    );

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    info!(folder = %config.source.folder_id, "starting publish job");
    let job = PublishJob::new(config, credentials, Arc::new(drive), Arc::new(youtube))
        .with_cancellation(cancel.clone());
    let report = job.run().await.context("Publish job could not start")?;
    // Stops the signal watcher
    cancel.cancel();

    match &report.outcome {
        JobOutcome::Published { remote_id, url } => info!(
            remote_id = %remote_id,
            url = url.as_deref().unwrap_or("-"),
            "job finished: published"
        ),
        JobOutcome::NothingToDo => info!("job finished: nothing to do"),
        other => warn!(outcome = ?other, "job finished with failure"),
    }
    if let Ok(summary) = serde_json::to_string(&report) {
        info!(report = %summary, "job report");
    }

    Ok(report.outcome.is_success())
}
