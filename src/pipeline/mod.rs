//! Publish orchestrator -- one locate, download, upload and cleanup cycle.
//!
//! [`PublishJob::run`] drives the state machine
//!
//! ```text
//! Idle -> Located -> Downloaded -> Uploaded -> CleanedUp
//!           |            |            |
//!     LocateFailed  DownloadFailed  UploadFailed
//! ```
//!
//! The remote source is only ever deleted after the publishing service has accepted
//! the video. Stage failures are reported in the returned [`JobReport`]; only a
//! credential failure before the first remote call is returned as an error.

pub mod cleanup;


use crate::auth::CredentialProvider;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::publisher::PublishTarget;
use crate::store::{ObjectLocator, ObjectStore};
use crate::transfer::TransferEngine;
use crate::types::{
    CleanupReport, Event, JobOutcome, JobReport, JobState, ObjectFilter, PublishRequest,
    RemoteObject, TransferProgress,
};
use crate::utils::local_file_name;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// One unattended publish run
///
/// A job is not reentrant: two concurrent runs against the same working directory
/// would share the working file.
pub struct PublishJob {
    config: Config,
    credentials: Arc<dyn CredentialProvider>,
    store: Arc<dyn ObjectStore>,
    target: Arc<dyn PublishTarget>,
    engine: TransferEngine,
    event_tx: broadcast::Sender<Event>,
}

/// Mutable bookkeeping for a single [`PublishJob::run`]
struct RunState {
    state: JobState,
    object: Option<RemoteObject>,
    bytes_downloaded: Option<u64>,
    cleanup: CleanupReport,
}

impl PublishJob {
    /// Create a job over the given services
    pub fn new(
        config: Config,
        credentials: Arc<dyn CredentialProvider>,
        store: Arc<dyn ObjectStore>,
        target: Arc<dyn PublishTarget>,
    ) -> Self {
        let engine = TransferEngine::new(&config.transfer, config.retry.clone());
        let (event_tx, _rx) = broadcast::channel(1000);
        Self {
            config,
            credentials,
            store,
            target,
            engine,
            event_tx,
        }
    }

    /// Abort in-flight transfers once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.engine = self.engine.with_cancellation(token);
        self
    }

    /// Subscribe to job events
    ///
    /// Multiple subscribers each receive every event emitted after they subscribed.
    /// Slow subscribers may miss events once the channel buffer (1000 events) fills.
    ///
    /// ```no_run
    /// # use tube_relay::PublishJob;
    /// # fn example(job: &PublishJob) {
    /// let mut events = job.subscribe();
    /// tokio::spawn(async move {
    ///     while let Ok(event) = events.recv().await {
    ///         tracing::info!(?event, "job event");
    ///     }
    /// });
    /// # }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The configuration this job runs with
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine
        self.event_tx.send(event).ok();
    }

    fn transition(&self, run: &mut RunState, to: JobState) {
        let from = run.state;
        run.state = to;
        info!(from = %from, to = %to, "job state changed");
        self.emit_event(Event::StateChanged { from, to });
    }

    /// Enter a terminal failure state and build the report
    fn fail(&self, mut run: RunState, to: JobState, error: &Error) -> JobReport {
        error!(
            state = %to,
            error = %error,
            code = error.error_code(),
            object_id = run.object.as_ref().map(|o| o.id.as_str()).unwrap_or("-"),
            "publish job failed"
        );
        self.transition(&mut run, to);
        self.emit_event(Event::Failed {
            state: to,
            error: error.to_string(),
        });
        JobReport {
            outcome: JobOutcome::failed(to, error),
            object: run.object,
            bytes_downloaded: run.bytes_downloaded,
            cleanup: run.cleanup,
        }
    }

    fn report_progress(&self, progress: TransferProgress) {
        info!(
            direction = %progress.direction,
            bytes = progress.bytes_transferred,
            total = ?progress.total_bytes,
            percent = progress.percent(),
            "transfer progress"
        );
        self.emit_event(Event::Progress(progress));
    }

    /// Where the working copy of `object` is written
    pub fn local_path(&self, object: &RemoteObject) -> PathBuf {
        self.config
            .transfer
            .work_dir
            .join(local_file_name(&object.name, &object.id))
    }

    /// Run the job to completion
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthUnavailable`] (or another credential error) when no access
    /// token can be obtained; no remote call is made in that case. Every later failure
    /// is reported through [`JobReport::outcome`].
    pub async fn run(&self) -> Result<JobReport> {
        self.credentials.get_token().await.inspect_err(|e| {
            error!(error = %e, "no usable credentials, job not attempted");
        })?;

        let mut run = RunState {
            state: JobState::Idle,
            object: None,
            bytes_downloaded: None,
            cleanup: CleanupReport::default(),
        };

        // Idle -> Located
        let filter = ObjectFilter::new(
            self.config.source.folder_id.as_str(),
            self.config.source.mime_type.as_str(),
        );
        let locator = ObjectLocator::new(self.store.as_ref(), &self.config.retry);
        let object = match locator.find_latest(&filter).await {
            Ok(Some(object)) => object,
            Ok(None) => {
                info!(folder = %filter.parent_id, "nothing to publish");
                self.emit_event(Event::NothingToDo);
                return Ok(JobReport {
                    outcome: JobOutcome::NothingToDo,
                    object: None,
                    bytes_downloaded: None,
                    cleanup: run.cleanup,
                });
            }
            Err(e) => return Ok(self.fail(run, JobState::LocateFailed, &e)),
        };
        run.object = Some(object.clone());
        self.transition(&mut run, JobState::Located);
        self.emit_event(Event::Located {
            id: object.id.clone(),
            name: object.name.clone(),
        });

        // Located -> Downloaded
        let local_path = self.local_path(&object);
        let bytes = match self.download(&object, &local_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                run.cleanup.local = cleanup::discard_partial(&local_path).await;
                return Ok(self.fail(run, JobState::DownloadFailed, &e));
            }
        };
        run.bytes_downloaded = Some(bytes);
        self.transition(&mut run, JobState::Downloaded);
        self.emit_event(Event::Downloaded {
            path: local_path.clone(),
            bytes,
        });

        // Downloaded -> Uploaded
        let request = PublishRequest::from_object(&self.config.publish, &object);
        let mut on_progress = |p: TransferProgress| self.report_progress(p);
        let uploaded = self
            .engine
            .upload(self.target.as_ref(), &local_path, &request, &mut on_progress)
            .await;
        let remote_id = match uploaded {
            Ok(id) => id,
            Err(e) => {
                // The source stays in place for the next run
                run.cleanup.local = Some(cleanup::delete_local(&local_path).await);
                return Ok(self.fail(run, JobState::UploadFailed, &e));
            }
        };
        let url = self.target.public_url(&remote_id);
        info!(
            remote_id = %remote_id,
            url = url.as_deref().unwrap_or("-"),
            title = %request.title,
            "video published"
        );
        self.transition(&mut run, JobState::Uploaded);
        self.emit_event(Event::Published {
            remote_id: remote_id.clone(),
            url: url.clone(),
        });

        // Uploaded -> CleanedUp; both steps run whatever the other's result
        let source = cleanup::delete_source(self.store.as_ref(), &object).await;
        self.emit_event(Event::SourceCleanup(source.clone()));
        run.cleanup.source = Some(source);

        let local = cleanup::delete_local(&local_path).await;
        self.emit_event(Event::LocalCleanup(local.clone()));
        run.cleanup.local = Some(local);

        self.transition(&mut run, JobState::CleanedUp);
        Ok(JobReport {
            outcome: JobOutcome::Published { remote_id, url },
            object: run.object,
            bytes_downloaded: run.bytes_downloaded,
            cleanup: run.cleanup,
        })
    }

    async fn download(&self, object: &RemoteObject, local_path: &Path) -> Result<u64> {
        if let Some(dir) = local_path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }
        let mut on_progress = |p: TransferProgress| self.report_progress(p);
        self.engine
            .download(self.store.as_ref(), object, local_path, &mut on_progress)
            .await
    }
}
