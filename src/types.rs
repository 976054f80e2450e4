//! Core types for tube-relay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::config::PublishConfig;
use crate::utils::title_from_file_name;

/// An object in the remote store
///
/// Created by the store and only ever read by the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    /// Opaque identifier, unique within the store
    pub id: String,
    /// Display name, used for the working file and the published title
    pub name: String,
    /// Creation time, used for ordering candidates
    pub created_time: DateTime<Utc>,
    /// Size in bytes when the store reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// MIME type when the store reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Which objects are eligible for publishing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectFilter {
    /// Container the object must be a direct child of
    pub parent_id: String,
    /// Exact MIME type the object must have
    pub mime_type: String,
}

impl ObjectFilter {
    /// Create a filter for a parent container and MIME type
    pub fn new(parent_id: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Whether `object` satisfies the MIME constraint
    ///
    /// Objects without a reported MIME type are accepted; the store query already
    /// filtered on it.
    pub fn accepts(&self, object: &RemoteObject) -> bool {
        object
            .mime_type
            .as_deref()
            .is_none_or(|m| m == self.mime_type)
    }
}

/// Visibility of a published video
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    /// Visible to everyone
    #[default]
    Public,
    /// Visible to anyone with the link
    Unlisted,
    /// Visible to the owner only
    Private,
}

impl PrivacyStatus {
    /// Wire value used by the publishing API
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyStatus::Public => "public",
            PrivacyStatus::Unlisted => "unlisted",
            PrivacyStatus::Private => "private",
        }
    }
}

/// Metadata sent when creating the published video
///
/// Built once from static configuration plus the object's display name and never
/// modified afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PublishRequest {
    /// Video title
    pub title: String,
    /// Video description
    pub description: String,
    /// Tag list
    pub tags: Vec<String>,
    /// Category code
    pub category_id: String,
    /// Visibility
    pub privacy: PrivacyStatus,
    /// "Made for kids" self-declaration
    pub made_for_kids: bool,
}

impl PublishRequest {
    /// Derive the request for `object` from the publish configuration
    pub fn from_object(config: &PublishConfig, object: &RemoteObject) -> Self {
        Self {
            title: title_from_file_name(&object.name),
            description: config.description.clone(),
            tags: config.tags.clone(),
            category_id: config.category_id.clone(),
            privacy: config.privacy,
            made_for_kids: config.made_for_kids,
        }
    }
}

/// Direction of a chunked transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    /// Remote store to local file
    Download,
    /// Local file to publishing service
    Upload,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferDirection::Download => write!(f, "download"),
            TransferDirection::Upload => write!(f, "upload"),
        }
    }
}

/// Progress snapshot reported after every chunk
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Which transfer this belongs to
    pub direction: TransferDirection,
    /// Bytes transferred (downloaded) or acknowledged (uploaded) so far
    pub bytes_transferred: u64,
    /// Total size when known
    pub total_bytes: Option<u64>,
    /// Fraction complete in [0, 1]
    pub fraction: f64,
}

impl TransferProgress {
    /// Whole-number percentage, as shown in log lines
    pub fn percent(&self) -> u8 {
        (self.fraction.clamp(0.0, 1.0) * 100.0).floor() as u8
    }
}

/// Outcome of deleting the remote source object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceCleanup {
    /// The object was deleted
    Deleted,
    /// The store refused the deletion; the object is orphaned and needs manual handling
    PermissionDenied {
        /// Error message
        error: String,
    },
    /// Deletion failed for another reason
    Failed {
        /// Error message
        error: String,
    },
}

impl SourceCleanup {
    /// Whether the object is gone
    pub fn is_deleted(&self) -> bool {
        matches!(self, SourceCleanup::Deleted)
    }
}

/// Outcome of deleting the local working file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LocalCleanup {
    /// The file was removed
    Deleted,
    /// Removal failed
    Failed {
        /// Error message
        error: String,
    },
}

impl LocalCleanup {
    /// Whether the file is gone
    pub fn is_deleted(&self) -> bool {
        matches!(self, LocalCleanup::Deleted)
    }
}

/// Cleanup sub-results; `None` means the step was not attempted
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Remote source deletion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceCleanup>,
    /// Local file deletion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalCleanup>,
}

/// Primary outcome of a job
///
/// Never changed by cleanup results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// The video was published
    Published {
        /// Identifier assigned by the publishing service
        remote_id: String,
        /// Public watch URL when the service has one
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// No object matched the filter
    NothingToDo,
    /// Querying the store failed
    LocateFailed {
        /// Machine-readable error code
        code: String,
        /// Error message
        error: String,
    },
    /// Downloading the object failed
    DownloadFailed {
        /// Machine-readable error code
        code: String,
        /// Error message
        error: String,
    },
    /// Uploading the video failed; the remote source was preserved
    UploadFailed {
        /// Machine-readable error code
        code: String,
        /// Error message
        error: String,
    },
}

impl JobOutcome {
    /// Published and NothingToDo are successes
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            JobOutcome::Published { .. } | JobOutcome::NothingToDo
        )
    }

    pub(crate) fn failed(stage: JobState, error: &crate::Error) -> Self {
        let code = error.error_code().to_string();
        let error = error.to_string();
        match stage {
            JobState::DownloadFailed => JobOutcome::DownloadFailed { code, error },
            JobState::UploadFailed => JobOutcome::UploadFailed { code, error },
            _ => JobOutcome::LocateFailed { code, error },
        }
    }
}

/// Everything a job run produced
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    /// Primary outcome
    #[serde(flatten)]
    pub outcome: JobOutcome,
    /// The object that was processed, if one was located
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<RemoteObject>,
    /// Bytes downloaded to the working file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_downloaded: Option<u64>,
    /// Cleanup sub-results
    pub cleanup: CleanupReport,
}

/// States of the publish state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Nothing has happened yet
    Idle,
    /// A candidate object was found
    Located,
    /// The object is in the working file
    Downloaded,
    /// The publishing service accepted the video
    Uploaded,
    /// Cleanup ran after a successful publish
    CleanedUp,
    /// The store query failed
    LocateFailed,
    /// The download failed
    DownloadFailed,
    /// The upload failed
    UploadFailed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Idle => "idle",
            JobState::Located => "located",
            JobState::Downloaded => "downloaded",
            JobState::Uploaded => "uploaded",
            JobState::CleanedUp => "cleaned_up",
            JobState::LocateFailed => "locate_failed",
            JobState::DownloadFailed => "download_failed",
            JobState::UploadFailed => "upload_failed",
        };
        f.write_str(s)
    }
}

/// Event emitted during a job
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The state machine moved to a new state
    StateChanged {
        /// Previous state
        from: JobState,
        /// New state
        to: JobState,
    },

    /// No object matched the filter
    NothingToDo,

    /// A candidate object was found
    Located {
        /// Object id
        id: String,
        /// Object display name
        name: String,
    },

    /// Transfer progress update
    Progress(TransferProgress),

    /// The working file is complete
    Downloaded {
        /// Where the file was written
        path: PathBuf,
        /// Bytes written
        bytes: u64,
    },

    /// The video was published
    Published {
        /// Identifier assigned by the publishing service
        remote_id: String,
        /// Public watch URL when the service has one
        url: Option<String>,
    },

    /// A stage failed
    Failed {
        /// The terminal state reached
        state: JobState,
        /// Error message
        error: String,
    },

    /// Remote source deletion finished
    SourceCleanup(SourceCleanup),

    /// Local file deletion finished
    LocalCleanup(LocalCleanup),
}
