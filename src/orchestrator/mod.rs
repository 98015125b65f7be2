//! End-to-end volume workflows: create, list, delete, attach and detach.

use camino::Utf8PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::attach::AttachmentController;
use crate::backend::{ObjectStore, VolumeBackend};
use crate::directory::VolumeDirectory;
use crate::import::{ImportError, PollPolicy, Sleeper, SnapshotImporter, StagedArtifact, TokioSleeper};
use crate::local::{LocalVolumeBuilder, LocalVolumeRequest};
use crate::materialize::Materializer;
use crate::tags::parse_tags;
use crate::volume::{DeviceSlot, VolumeRecord, VolumeSize};

mod error;

pub use error::VolumeError;

/// Settings shared by every workflow.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkflowSettings {
    /// Bucket used to stage artifacts.
    pub bucket: String,
    /// Region-level zone; volumes are placed in its `c` slot.
    pub zone: String,
    /// Import wait policy.
    pub policy: PollPolicy,
    /// Device slot used for attachments.
    pub slot: DeviceSlot,
}

/// Inputs for [`VolumeOrchestrator::create_volume`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateVolumeRequest {
    /// Logical volume name.
    pub name: String,
    /// Directory whose contents seed the image.
    pub data: Option<Utf8PathBuf>,
    /// Requested image size.
    pub size: Option<VolumeSize>,
    /// Provider the image is built for.
    pub provider: String,
    /// Raw `key=value` tag entries.
    pub tags: Vec<String>,
}

impl CreateVolumeRequest {
    /// Creates a request for `name` with no data, default size and no tags.
    #[must_use]
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: None,
            size: None,
            provider: provider.into(),
            tags: Vec::new(),
        }
    }
}

/// Coordinates the local builder and the provider backend.
///
/// The backend is owned for the lifetime of the orchestrator; its session is
/// established lazily by the first workflow and reused afterwards.
#[derive(Debug)]
pub struct VolumeOrchestrator<B, L, S = TokioSleeper> {
    backend: B,
    builder: L,
    settings: WorkflowSettings,
    sleeper: S,
}

impl<B, L> VolumeOrchestrator<B, L, TokioSleeper> {
    /// Creates an orchestrator that sleeps on the Tokio timer.
    #[must_use]
    pub const fn new(backend: B, builder: L, settings: WorkflowSettings) -> Self {
        Self {
            backend,
            builder,
            settings,
            sleeper: TokioSleeper,
        }
    }
}

impl<B, L, S> VolumeOrchestrator<B, L, S> {
    /// Replaces the sleeper used between import polls.
    #[must_use]
    pub fn with_sleeper<T>(self, sleeper: T) -> VolumeOrchestrator<B, L, T> {
        VolumeOrchestrator {
            backend: self.backend,
            builder: self.builder,
            settings: self.settings,
            sleeper,
        }
    }

    /// Returns the workflow settings.
    #[must_use]
    pub const fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }
}

impl<B, L, S> VolumeOrchestrator<B, L, S>
where
    B: ObjectStore + VolumeBackend,
    L: LocalVolumeBuilder,
    S: Sleeper,
{
    /// Builds a local image, imports it as a snapshot and materialises it as
    /// a tagged volume.
    ///
    /// On success the staged object has been removed and the returned record
    /// carries the provider id and the local artifact path. On failure the
    /// local artifact is left intact; anything left remotely is named in the
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError`] naming the stage that failed.
    pub async fn create_volume(
        &self,
        request: &CreateVolumeRequest,
        cancel: &CancellationToken,
    ) -> Result<VolumeRecord, VolumeError<B::Error>> {
        let name = request.name.trim();
        let tags = parse_tags(&request.tags, name)?;
        self.connect().await?;

        let artifact = self.builder.build(&LocalVolumeRequest {
            name: name.to_owned(),
            data: request.data.clone(),
            size: request.size,
            provider: request.provider.clone(),
        })?;
        let local_path = artifact.path.clone();

        let staged = StagedArtifact {
            bucket: self.settings.bucket.clone(),
            key: artifact.name,
            local_path: artifact.path,
        };
        self.backend
            .upload(&staged)
            .await
            .map_err(|source| VolumeError::Upload {
                bucket: staged.bucket.clone(),
                key: staged.key.clone(),
                source,
            })?;
        info!(bucket = %staged.bucket, key = %staged.key, "artifact staged");

        let snapshot_id = self
            .import(&staged, cancel)
            .await
            .map_err(|source| VolumeError::Import {
                bucket: staged.bucket.clone(),
                key: staged.key.clone(),
                task_id: source.task_id().map(str::to_owned),
                source: Box::new(source),
            })?;
        self.remove_staged(&staged).await;

        let record = Materializer::new(&self.backend)
            .materialize(&snapshot_id, &self.settings.zone, tags)
            .await
            .map_err(|source| VolumeError::Materialization {
                snapshot_id: snapshot_id.clone(),
                source: Box::new(source),
            })?;
        info!(
            snapshot_id = %snapshot_id,
            volume_id = record.id.as_deref().unwrap_or_default(),
            "snapshot retained after materialisation"
        );

        Ok(VolumeRecord {
            local_path: Some(local_path),
            ..record
        })
    }

    /// Lists every volume visible to the current credentials.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::Session`] or [`VolumeError::List`].
    pub async fn list_volumes(&self) -> Result<Vec<VolumeRecord>, VolumeError<B::Error>> {
        self.connect().await?;
        VolumeDirectory::new(&self.backend)
            .list()
            .await
            .map_err(VolumeError::List)
    }

    /// Deletes `volume_id`; the provider rejects attached volumes.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::Session`] or [`VolumeError::Attachment`].
    pub async fn delete_volume(&self, volume_id: &str) -> Result<(), VolumeError<B::Error>> {
        self.connect().await?;
        self.controller().delete(volume_id).await?;
        Ok(())
    }

    /// Attaches `volume_id` to `instance_id` at the configured slot.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::Session`] or [`VolumeError::Attachment`].
    pub async fn attach_volume(
        &self,
        instance_id: &str,
        volume_id: &str,
    ) -> Result<(), VolumeError<B::Error>> {
        self.connect().await?;
        self.controller().attach(instance_id, volume_id).await?;
        Ok(())
    }

    /// Detaches `volume_id` from `instance_id` at the configured slot.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::Session`] or [`VolumeError::Attachment`].
    pub async fn detach_volume(
        &self,
        instance_id: &str,
        volume_id: &str,
    ) -> Result<(), VolumeError<B::Error>> {
        self.connect().await?;
        self.controller().detach(instance_id, volume_id).await?;
        Ok(())
    }

    async fn connect(&self) -> Result<(), VolumeError<B::Error>> {
        self.backend.connect().await.map_err(VolumeError::Session)
    }

    fn controller(&self) -> AttachmentController<'_, B> {
        AttachmentController::new(&self.backend, self.settings.slot.clone())
    }

    async fn import(
        &self,
        staged: &StagedArtifact,
        cancel: &CancellationToken,
    ) -> Result<String, ImportError<B::Error>> {
        if cancel.is_cancelled() {
            return Err(ImportError::CancelledBeforeSubmission);
        }
        let importer = SnapshotImporter::new(&self.backend, self.settings.policy, &self.sleeper);
        let task = importer.request_import(staged).await?;
        importer.await_import(&task, cancel).await
    }

    async fn remove_staged(&self, staged: &StagedArtifact) {
        match self.backend.remove(&staged.bucket, &staged.key).await {
            Ok(()) => info!(bucket = %staged.bucket, key = %staged.key, "staged object removed"),
            Err(err) => warn!(
                bucket = %staged.bucket,
                key = %staged.key,
                error = %err,
                "failed to remove staged object; remove it manually"
            ),
        }
    }
}
