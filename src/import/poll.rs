//! Bounded polling of snapshot import tasks.

use std::future::Future;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::VolumeBackend;

use super::{ImportError, ImportState, ImportTask, StagedArtifact};

/// Interval between status polls unless configured otherwise.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Poll bound applied unless configured otherwise.
pub const DEFAULT_MAX_POLLS: u32 = 60;

/// Interval and bounds for the import wait loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    interval: Duration,
    max_polls: Option<NonZeroU32>,
    max_wait: Option<Duration>,
}

impl PollPolicy {
    /// Creates an unbounded policy polling at `interval`.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_polls: None,
            max_wait: None,
        }
    }

    /// Caps the number of status polls. Zero removes the cap.
    #[must_use]
    pub const fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = NonZeroU32::new(max_polls);
        self
    }

    /// Caps the total time spent sleeping between polls.
    #[must_use]
    pub const fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Returns the interval between polls.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the poll cap, if any.
    #[must_use]
    pub fn max_polls(&self) -> Option<u32> {
        self.max_polls.map(NonZeroU32::get)
    }

    /// Returns the wait cap, if any.
    #[must_use]
    pub const fn max_wait(&self) -> Option<Duration> {
        self.max_wait
    }

    fn polls_exhausted(&self, polls: u32) -> bool {
        self.max_polls.is_some_and(|max| polls >= max.get())
    }

    fn wait_exhausted(&self, waited: Duration) -> bool {
        self.max_wait
            .is_some_and(|max| waited.saturating_add(self.interval) > max)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL).with_max_polls(DEFAULT_MAX_POLLS)
    }
}

/// Suspends the poll loop between status checks.
pub trait Sleeper: Send + Sync {
    /// Returns a future that completes after `duration`.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Sleeper backed by the Tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Submits snapshot imports and waits for them to finish.
///
/// The importer never touches the staged object; removing it after a
/// successful import is the caller's job.
#[derive(Debug)]
pub struct SnapshotImporter<'a, B, S> {
    backend: &'a B,
    policy: PollPolicy,
    sleeper: &'a S,
}

impl<'a, B, S> SnapshotImporter<'a, B, S>
where
    B: VolumeBackend,
    S: Sleeper,
{
    /// Creates an importer using `policy` and `sleeper` for the wait loop.
    #[must_use]
    pub const fn new(backend: &'a B, policy: PollPolicy, sleeper: &'a S) -> Self {
        Self {
            backend,
            policy,
            sleeper,
        }
    }

    /// Requests conversion of a staged artifact into a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Submission`] when the provider rejects the
    /// request.
    pub async fn request_import(
        &self,
        artifact: &StagedArtifact,
    ) -> Result<ImportTask, ImportError<B::Error>> {
        let task_id = self
            .backend
            .request_import(&artifact.bucket, &artifact.key)
            .await
            .map_err(|source| ImportError::Submission {
                bucket: artifact.bucket.clone(),
                key: artifact.key.clone(),
                source,
            })?;
        info!(
            task_id = %task_id,
            bucket = %artifact.bucket,
            key = %artifact.key,
            "snapshot import requested"
        );
        Ok(ImportTask::pending(task_id))
    }

    /// Polls `task` until it reaches a terminal state and returns the
    /// snapshot id.
    ///
    /// Only "still running" responses are retried. The loop stops as soon as
    /// `cancel` fires, including mid-poll and mid-sleep.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Failed`] on a terminal failure,
    /// [`ImportError::Status`] when a status call errors,
    /// [`ImportError::TimedOut`] when the policy bound is reached, and
    /// [`ImportError::Cancelled`] when `cancel` fires.
    pub async fn await_import(
        &self,
        task: &ImportTask,
        cancel: &CancellationToken,
    ) -> Result<String, ImportError<B::Error>> {
        let task_id = task.task_id.as_str();
        let mut state = ImportState::Staged.requested(task_id);
        let mut waited = Duration::ZERO;

        loop {
            if cancel.is_cancelled() {
                return Err(cancelled(task_id));
            }

            let status = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled(task_id)),
                result = self.backend.import_status(task_id) => {
                    result.map_err(|source| ImportError::Status {
                        task_id: task_id.to_owned(),
                        source,
                    })?
                }
            };
            debug!(task_id, ?status, "polled snapshot import");

            state = state.advance(status);
            let polls = match &state {
                ImportState::ImportCompleted { snapshot_id } => {
                    info!(task_id, snapshot_id = %snapshot_id, "snapshot import completed");
                    return Ok(snapshot_id.clone());
                }
                ImportState::ImportFailed { cause } => {
                    warn!(task_id, cause = %cause, "snapshot import failed");
                    return Err(ImportError::Failed {
                        task_id: task_id.to_owned(),
                        cause: cause.clone(),
                    });
                }
                ImportState::ImportPending { polls, .. } => *polls,
                ImportState::Staged | ImportState::ImportRequested { .. } => 0,
            };

            if self.policy.polls_exhausted(polls) || self.policy.wait_exhausted(waited) {
                warn!(task_id, polls, "snapshot import poll bound reached");
                return Err(ImportError::TimedOut {
                    task_id: task_id.to_owned(),
                    polls,
                });
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled(task_id)),
                () = self.sleeper.sleep(self.policy.interval) => {}
            }
            waited = waited.saturating_add(self.policy.interval);
        }
    }
}

fn cancelled<E: std::error::Error + 'static>(task_id: &str) -> ImportError<E> {
    ImportError::Cancelled {
        task_id: task_id.to_owned(),
    }
}
