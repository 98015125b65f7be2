//! Error types for the volume workflows.

use thiserror::Error;

use crate::attach::AttachmentError;
use crate::import::ImportError;
use crate::local::LocalBuildError;
use crate::materialize::MaterializeError;
use crate::tags::TagError;

/// Errors raised by [`super::VolumeOrchestrator`]. Each variant names the
/// stage that failed and what, if anything, was left behind.
#[derive(Debug, Error)]
pub enum VolumeError<BackendError>
where
    BackendError: std::error::Error + 'static,
{
    /// Raised when the provider session cannot be established.
    #[error("failed to establish provider session: {0}")]
    Session(#[source] BackendError),
    /// Raised when user tags are malformed. Nothing was built or uploaded.
    #[error("invalid tags: {0}")]
    Tags(#[from] TagError),
    /// Raised when the local image cannot be built. Nothing remote happened.
    #[error("local volume build failed: {0}")]
    LocalBuild(#[from] LocalBuildError),
    /// Raised when staging the artifact fails. The local artifact is intact.
    #[error("failed to upload artifact to s3://{bucket}/{key}: {source}")]
    Upload {
        /// Bucket targeted by the upload.
        bucket: String,
        /// Object key targeted by the upload.
        key: String,
        /// Provider-specific error.
        #[source]
        source: BackendError,
    },
    /// Raised when the snapshot import fails or is interrupted. The staged
    /// object is left in place, as is any submitted import task.
    #[error("{source}; staged object s3://{bucket}/{key} was left in place")]
    Import {
        /// Bucket holding the staged object.
        bucket: String,
        /// Key of the staged object.
        key: String,
        /// Import task, when one was submitted.
        task_id: Option<String>,
        /// Import failure.
        #[source]
        source: Box<ImportError<BackendError>>,
    },
    /// Raised when volume creation fails. The snapshot is left in place.
    #[error("{source}; snapshot {snapshot_id} was left in place")]
    Materialization {
        /// Snapshot the volume was created from.
        snapshot_id: String,
        /// Materialisation failure.
        #[source]
        source: Box<MaterializeError<BackendError>>,
    },
    /// Raised when listing volumes fails.
    #[error("failed to list volumes: {0}")]
    List(#[source] BackendError),
    /// Raised when attach, detach or delete fails.
    #[error(transparent)]
    Attachment(#[from] AttachmentError<BackendError>),
}

impl<BackendError> VolumeError<BackendError>
where
    BackendError: std::error::Error + 'static,
{
    /// Returns `true` when the import wait was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Import { source, .. } if source.is_cancelled())
    }
}
