//! Test support utilities shared across unit and integration tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use camino::Utf8PathBuf;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::backend::{
    Backend, BackendFuture, ObjectStore, ProviderError, ProviderErrorKind, VolumeBackend,
};
use crate::command::{CommandError, CommandOutput, CommandRunner};
use crate::import::{ImportStatus, Sleeper, StagedArtifact};
use crate::materialize::MaterializeRequest;
use crate::volume::{AttachmentRequest, ProviderVolume, VolumeAttachment};

/// Size reported for volumes created by [`MemoryBackend`].
pub const MEMORY_VOLUME_SIZE_BYTES: u64 = 1024 * 1024 * 1024;

/// Creation timestamp reported for volumes created by [`MemoryBackend`].
pub const MEMORY_CREATED_AT: &str = "2026-01-01T00:00:00Z";

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| CommandError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Command runner that writes a small file at the path given as the last
/// argument, standing in for a real `mkfs`.
#[derive(Clone, Debug, Default)]
pub struct ImageWritingRunner {
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

impl ImageWritingRunner {
    /// Creates a runner with no recorded invocations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }
}

impl CommandRunner for ImageWritingRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        let spawn_error = |message: String| CommandError::Spawn {
            program: program.to_owned(),
            message,
        };
        let target = args
            .last()
            .ok_or_else(|| spawn_error(String::from("missing image path")))?;
        std::fs::write(target, b"volport-test-image").map_err(|err| spawn_error(err.to_string()))?;
        Ok(CommandOutput {
            code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

/// Operations of [`MemoryBackend`] that can be made to fail.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum FailurePoint {
    /// Session establishment.
    Connect,
    /// Staging upload.
    Upload,
    /// Staged object removal.
    RemoveObject,
    /// Import submission.
    ImportRequest,
    /// Import status polling.
    ImportStatus,
    /// Volume creation.
    CreateVolume,
    /// Volume listing.
    DescribeVolumes,
}

/// Error produced by [`MemoryBackend`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{message}")]
pub struct MemoryError {
    kind: ProviderErrorKind,
    message: String,
}

impl MemoryError {
    fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn injected(point: FailurePoint) -> Self {
        Self::new(
            ProviderErrorKind::Other,
            format!("injected failure at {point:?}"),
        )
    }
}

impl ProviderError for MemoryError {
    fn kind(&self) -> ProviderErrorKind {
        self.kind
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    failures: BTreeSet<FailurePoint>,
    connect_calls: u32,
    objects: BTreeMap<String, Utf8PathBuf>,
    removed_objects: Vec<String>,
    import_requests: Vec<String>,
    import_script: VecDeque<ImportStatus>,
    stalled: bool,
    hung_status: bool,
    omit_volume_ids: bool,
    status_calls: u32,
    volumes: Vec<ProviderVolume>,
    created: u32,
}

impl MemoryState {
    fn check(&self, point: FailurePoint) -> Result<(), MemoryError> {
        if self.failures.contains(&point) {
            return Err(MemoryError::injected(point));
        }
        Ok(())
    }

    fn volume_mut(&mut self, volume_id: &str) -> Result<&mut ProviderVolume, MemoryError> {
        self.volumes
            .iter_mut()
            .find(|volume| volume.id == volume_id)
            .ok_or_else(|| {
                MemoryError::new(
                    ProviderErrorKind::NotFound,
                    format!("volume {volume_id} does not exist"),
                )
            })
    }
}

fn object_key(bucket: &str, key: &str) -> String {
    format!("{bucket}/{key}")
}

/// In-memory provider implementing every backend trait.
///
/// Attach, detach and delete follow the provider's conflict rules: one
/// volume per instance and slot, no deleting attached volumes, and no
/// detaching what is not attached.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    /// Creates an empty backend whose imports complete on the first poll.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Makes every subsequent call of `point` fail.
    pub fn fail_at(&self, point: FailurePoint) {
        self.with_state(|state| {
            state.failures.insert(point);
        });
    }

    /// Queues statuses returned by successive import polls.
    pub fn script_import(&self, statuses: impl IntoIterator<Item = ImportStatus>) {
        self.with_state(|state| state.import_script.extend(statuses));
    }

    /// Keeps imports pending once the scripted statuses run out.
    pub fn stall_imports(&self) {
        self.with_state(|state| state.stalled = true);
    }

    /// Makes every subsequent import status call wait forever.
    pub fn hang_import_status(&self) {
        self.with_state(|state| state.hung_status = true);
    }

    /// Stores created volumes but returns them without an identifier.
    pub fn omit_created_volume_ids(&self) {
        self.with_state(|state| state.omit_volume_ids = true);
    }

    /// Adds a pre-existing volume.
    pub fn insert_volume(&self, volume: ProviderVolume) {
        self.with_state(|state| state.volumes.push(volume));
    }

    /// Returns the stored volume with `volume_id`.
    #[must_use]
    pub fn volume(&self, volume_id: &str) -> Option<ProviderVolume> {
        self.with_state(|state| {
            state
                .volumes
                .iter()
                .find(|volume| volume.id == volume_id)
                .cloned()
        })
    }

    /// Returns every stored volume.
    #[must_use]
    pub fn volumes(&self) -> Vec<ProviderVolume> {
        self.with_state(|state| state.volumes.clone())
    }

    /// Returns the `bucket/key` names of objects currently staged.
    #[must_use]
    pub fn objects(&self) -> Vec<String> {
        self.with_state(|state| state.objects.keys().cloned().collect())
    }

    /// Returns the `bucket/key` names of objects removed so far.
    #[must_use]
    pub fn removed_objects(&self) -> Vec<String> {
        self.with_state(|state| state.removed_objects.clone())
    }

    /// Returns the `bucket/key` names submitted for import.
    #[must_use]
    pub fn import_requests(&self) -> Vec<String> {
        self.with_state(|state| state.import_requests.clone())
    }

    /// Returns the number of import status polls served.
    #[must_use]
    pub fn status_calls(&self) -> u32 {
        self.with_state(|state| state.status_calls)
    }

    /// Returns the number of session establishments requested.
    #[must_use]
    pub fn connect_calls(&self) -> u32 {
        self.with_state(|state| state.connect_calls)
    }
}

impl Backend for MemoryBackend {
    type Error = MemoryError;

    fn connect(&self) -> BackendFuture<'_, (), Self::Error> {
        Box::pin(async move {
            self.with_state(|state| {
                state.connect_calls += 1;
                state.check(FailurePoint::Connect)
            })
        })
    }
}

impl ObjectStore for MemoryBackend {
    fn upload<'a>(&'a self, artifact: &'a StagedArtifact) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.with_state(|state| {
                state.check(FailurePoint::Upload)?;
                if !artifact.local_path.is_file() {
                    return Err(MemoryError::new(
                        ProviderErrorKind::NotFound,
                        format!("{} does not exist", artifact.local_path),
                    ));
                }
                state.objects.insert(
                    object_key(&artifact.bucket, &artifact.key),
                    artifact.local_path.clone(),
                );
                Ok(())
            })
        })
    }

    fn remove<'a>(&'a self, bucket: &'a str, key: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.with_state(|state| {
                state.check(FailurePoint::RemoveObject)?;
                let name = object_key(bucket, key);
                state.objects.remove(&name);
                state.removed_objects.push(name);
                Ok(())
            })
        })
    }
}

impl VolumeBackend for MemoryBackend {
    fn request_import<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> BackendFuture<'a, String, Self::Error> {
        Box::pin(async move {
            self.with_state(|state| {
                state.check(FailurePoint::ImportRequest)?;
                let name = object_key(bucket, key);
                if !state.objects.contains_key(&name) {
                    return Err(MemoryError::new(
                        ProviderErrorKind::NotFound,
                        format!("object s3://{name} does not exist"),
                    ));
                }
                state.import_requests.push(name);
                Ok(format!("import-snap-{:04}", state.import_requests.len()))
            })
        })
    }

    fn import_status<'a>(
        &'a self,
        task_id: &'a str,
    ) -> BackendFuture<'a, ImportStatus, Self::Error> {
        Box::pin(async move {
            let hung = self.with_state(|state| {
                state.status_calls += 1;
                state.hung_status
            });
            if hung {
                return std::future::pending().await;
            }
            self.with_state(|state| {
                state.check(FailurePoint::ImportStatus)?;
                if let Some(status) = state.import_script.pop_front() {
                    return Ok(status);
                }
                if state.stalled {
                    return Ok(ImportStatus::Pending { progress: None });
                }
                Ok(ImportStatus::Completed {
                    snapshot_id: format!("snap-for-{task_id}"),
                })
            })
        })
    }

    fn create_volume<'a>(
        &'a self,
        request: &'a MaterializeRequest,
    ) -> BackendFuture<'a, ProviderVolume, Self::Error> {
        Box::pin(async move {
            self.with_state(|state| {
                state.check(FailurePoint::CreateVolume)?;
                state.created += 1;
                let volume = ProviderVolume {
                    id: format!("vol-{:04}", state.created),
                    state: String::from("available"),
                    size_bytes: MEMORY_VOLUME_SIZE_BYTES,
                    created_at: Some(String::from(MEMORY_CREATED_AT)),
                    availability_zone: Some(request.availability_zone.clone()),
                    tags: request.tags.iter().cloned().collect(),
                    attachments: Vec::new(),
                };
                state.volumes.push(volume.clone());
                if state.omit_volume_ids {
                    return Ok(ProviderVolume {
                        id: String::new(),
                        ..volume
                    });
                }
                Ok(volume)
            })
        })
    }

    fn describe_volumes(&self) -> BackendFuture<'_, Vec<ProviderVolume>, Self::Error> {
        Box::pin(async move {
            self.with_state(|state| {
                state.check(FailurePoint::DescribeVolumes)?;
                Ok(state.volumes.clone())
            })
        })
    }

    fn delete_volume<'a>(&'a self, volume_id: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.with_state(|state| {
                let volume = state.volume_mut(volume_id)?;
                if !volume.attachments.is_empty() {
                    return Err(MemoryError::new(
                        ProviderErrorKind::Conflict,
                        format!("volume {volume_id} is currently attached"),
                    ));
                }
                state.volumes.retain(|volume| volume.id != volume_id);
                Ok(())
            })
        })
    }

    fn attach_volume<'a>(
        &'a self,
        request: &'a AttachmentRequest,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.with_state(|state| {
                let slot_taken = state.volumes.iter().any(|volume| {
                    volume.attachments.iter().any(|attachment| {
                        attachment.instance_id == request.instance_id
                            && attachment.device == request.device.as_str()
                    })
                });
                if slot_taken {
                    return Err(MemoryError::new(
                        ProviderErrorKind::Conflict,
                        format!(
                            "{} is already in use on {}",
                            request.device, request.instance_id
                        ),
                    ));
                }
                let volume = state.volume_mut(&request.volume_id)?;
                if !volume.attachments.is_empty() {
                    return Err(MemoryError::new(
                        ProviderErrorKind::Conflict,
                        format!("volume {} is already attached", request.volume_id),
                    ));
                }
                volume.attachments.push(VolumeAttachment {
                    instance_id: request.instance_id.clone(),
                    device: request.device.to_string(),
                });
                volume.state = String::from("in-use");
                Ok(())
            })
        })
    }

    fn detach_volume<'a>(
        &'a self,
        request: &'a AttachmentRequest,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.with_state(|state| {
                let volume = state.volume_mut(&request.volume_id)?;
                let before = volume.attachments.len();
                volume.attachments.retain(|attachment| {
                    attachment.instance_id != request.instance_id
                        || attachment.device != request.device.as_str()
                });
                if volume.attachments.len() == before {
                    return Err(MemoryError::new(
                        ProviderErrorKind::Conflict,
                        format!(
                            "volume {} is not attached to {} at {}",
                            request.volume_id, request.instance_id, request.device
                        ),
                    ));
                }
                if volume.attachments.is_empty() {
                    volume.state = String::from("available");
                }
                Ok(())
            })
        })
    }
}

/// Sleeper that records requested durations and returns immediately.
#[derive(Clone, Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Creates a sleeper with no recorded sleeps.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the durations requested so far.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        Box::pin(std::future::ready(()))
    }
}

/// Sleeper that never wakes, used to exercise cancellation.
#[derive(Clone, Copy, Debug, Default)]
pub struct StalledSleeper;

impl Sleeper for StalledSleeper {
    fn sleep(&self, _duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(std::future::pending())
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
