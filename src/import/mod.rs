//! Snapshot import state machine.
//!
//! A staged artifact moves through
//! `Staged → ImportRequested → ImportPending → {ImportCompleted, ImportFailed}`.
//! [`ImportState::advance`] is the pure transition function; the
//! [`SnapshotImporter`] drives it against a provider backend.

mod poll;

use camino::Utf8PathBuf;
use thiserror::Error;

pub use poll::{
    DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL, PollPolicy, Sleeper, SnapshotImporter, TokioSleeper,
};

/// A local image placed in object storage as input to an import.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StagedArtifact {
    /// Bucket holding the object.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Local file the object was uploaded from.
    pub local_path: Utf8PathBuf,
}

/// Status of an import task as reported by one poll.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImportStatus {
    /// The task is still running.
    Pending {
        /// Provider progress hint, when available.
        progress: Option<String>,
    },
    /// The task finished and produced a snapshot.
    Completed {
        /// Identifier of the resulting snapshot.
        snapshot_id: String,
    },
    /// The task ended without producing a snapshot.
    Failed {
        /// Provider-reported cause.
        cause: String,
    },
}

impl ImportStatus {
    /// Returns `true` for completed or failed statuses.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending { .. })
    }
}

/// Ephemeral tracking of one in-flight import.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImportTask {
    /// Opaque handle returned by the import request.
    pub task_id: String,
    /// Latest known status.
    pub status: ImportStatus,
}

impl ImportTask {
    /// Creates a task in the pending state.
    #[must_use]
    pub fn pending(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: ImportStatus::Pending { progress: None },
        }
    }

    /// Returns the snapshot id once the task has completed.
    #[must_use]
    pub fn snapshot_id(&self) -> Option<&str> {
        match &self.status {
            ImportStatus::Completed { snapshot_id } => Some(snapshot_id),
            _ => None,
        }
    }
}

/// Position of an artifact in the import pipeline.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImportState {
    /// Uploaded to object storage; nothing requested yet.
    Staged,
    /// Import submitted; no status observed yet.
    ImportRequested {
        /// Task handle.
        task_id: String,
    },
    /// At least one poll reported the task as still running.
    ImportPending {
        /// Task handle.
        task_id: String,
        /// Number of status polls performed so far.
        polls: u32,
    },
    /// The snapshot is ready.
    ImportCompleted {
        /// Resulting snapshot.
        snapshot_id: String,
    },
    /// The import failed.
    ImportFailed {
        /// Provider-reported cause.
        cause: String,
    },
}

impl ImportState {
    /// Records the submission of an import for a staged artifact.
    ///
    /// Any state other than [`ImportState::Staged`] is returned unchanged.
    #[must_use]
    pub fn requested(self, task_id: impl Into<String>) -> Self {
        match self {
            Self::Staged => Self::ImportRequested {
                task_id: task_id.into(),
            },
            other => other,
        }
    }

    /// Applies one poll result.
    ///
    /// Terminal states absorb further statuses, as does `Staged`, which has
    /// no task to poll.
    #[must_use]
    pub fn advance(self, status: ImportStatus) -> Self {
        let (task_id, polls) = match self {
            Self::ImportRequested { task_id } => (task_id, 0),
            Self::ImportPending { task_id, polls } => (task_id, polls),
            terminal_or_staged => return terminal_or_staged,
        };
        match status {
            ImportStatus::Pending { .. } => Self::ImportPending {
                task_id,
                polls: polls.saturating_add(1),
            },
            ImportStatus::Completed { snapshot_id } => Self::ImportCompleted { snapshot_id },
            ImportStatus::Failed { cause } => Self::ImportFailed { cause },
        }
    }

    /// Returns `true` once the import has completed or failed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ImportCompleted { .. } | Self::ImportFailed { .. }
        )
    }
}

/// Errors raised while importing a staged artifact as a snapshot.
#[derive(Debug, Error)]
pub enum ImportError<E>
where
    E: std::error::Error + 'static,
{
    /// The provider rejected the import request.
    #[error("failed to submit snapshot import for s3://{bucket}/{key}: {source}")]
    Submission {
        /// Bucket of the staged object.
        bucket: String,
        /// Key of the staged object.
        key: String,
        /// Provider error.
        #[source]
        source: E,
    },
    /// Fetching the task status failed; status errors are not retried.
    #[error("failed to poll snapshot import task {task_id}: {source}")]
    Status {
        /// Task handle.
        task_id: String,
        /// Provider error.
        #[source]
        source: E,
    },
    /// The task reached a terminal failure.
    #[error("snapshot import task {task_id} failed: {cause}")]
    Failed {
        /// Task handle.
        task_id: String,
        /// Provider-reported cause.
        cause: String,
    },
    /// The poll bound was reached before the task finished.
    #[error("snapshot import task {task_id} still pending after {polls} polls")]
    TimedOut {
        /// Task handle.
        task_id: String,
        /// Number of status polls performed.
        polls: u32,
    },
    /// The caller cancelled before the import was submitted. No task
    /// exists.
    #[error("snapshot import was cancelled before submission")]
    CancelledBeforeSubmission,
    /// The caller cancelled the wait. The provider task may still be running.
    #[error("wait for snapshot import task {task_id} was cancelled; the task may still be running")]
    Cancelled {
        /// Task handle.
        task_id: String,
    },
}

impl<E> ImportError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns `true` when the caller cancelled, before or after submission.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::CancelledBeforeSubmission | Self::Cancelled { .. })
    }

    /// Returns the task handle when the error occurred after submission.
    #[must_use]
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::Submission { .. } | Self::CancelledBeforeSubmission => None,
            Self::Status { task_id, .. }
            | Self::Failed { task_id, .. }
            | Self::TimedOut { task_id, .. }
            | Self::Cancelled { task_id } => Some(task_id),
        }
    }
}
