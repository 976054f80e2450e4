//! Post-publish cleanup of the remote source and the local working file
//!
//! Nothing here returns an error: every failure is logged and recorded in the
//! cleanup sub-results so the primary outcome stays untouched.

use crate::store::ObjectStore;
use crate::types::{LocalCleanup, RemoteObject, SourceCleanup};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{error, info, warn};

/// Delete the published object from the remote store
///
/// A 403 leaves the object orphaned in the source folder; the next run would publish
/// it again, so it is logged as a warning for manual handling.
pub async fn delete_source(store: &dyn ObjectStore, object: &RemoteObject) -> SourceCleanup {
    match store.delete(object).await {
        Ok(()) => {
            info!(object_id = %object.id, name = %object.name, "deleted source object");
            SourceCleanup::Deleted
        }
        Err(e) if e.is_permission_denied() => {
            warn!(
                object_id = %object.id,
                name = %object.name,
                error = %e,
                "no permission to delete source object, it must be removed manually"
            );
            SourceCleanup::PermissionDenied {
                error: e.to_string(),
            }
        }
        Err(e) => {
            error!(
                object_id = %object.id,
                error = %e,
                code = e.error_code(),
                "failed to delete source object"
            );
            SourceCleanup::Failed {
                error: e.to_string(),
            }
        }
    }
}

/// Remove the local working file
pub async fn delete_local(path: &Path) -> LocalCleanup {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            info!(path = %path.display(), "deleted local file");
            LocalCleanup::Deleted
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to delete local file");
            LocalCleanup::Failed {
                error: e.to_string(),
            }
        }
    }
}

/// Remove a partially written file, if one was created
pub(crate) async fn discard_partial(path: &Path) -> Option<LocalCleanup> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            info!(path = %path.display(), "removed partial download");
            Some(LocalCleanup::Deleted)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove partial download");
            Some(LocalCleanup::Failed {
                error: e.to_string(),
            })
        }
    }
}
