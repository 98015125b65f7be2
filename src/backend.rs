//! Provider abstractions consumed by the volume workflows.
//!
//! The core never talks to a cloud SDK directly. It drives these traits, which
//! the AWS backend implements for real use and
//! [`crate::test_support::MemoryBackend`] implements for tests.

use std::future::Future;
use std::pin::Pin;

use crate::import::{ImportStatus, StagedArtifact};
use crate::materialize::MaterializeRequest;
use crate::volume::{AttachmentRequest, ProviderVolume};

/// Future returned by backend operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Coarse classification of provider failures.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProviderErrorKind {
    /// The resource is in a state that forbids the operation (for example an
    /// occupied device slot or a volume that is still attached).
    Conflict,
    /// The referenced resource does not exist.
    NotFound,
    /// Any other failure.
    Other,
}

/// Error type produced by a provider backend.
pub trait ProviderError: std::error::Error + Send + Sync + 'static {
    /// Classifies the failure so callers can surface conflicts distinctly.
    fn kind(&self) -> ProviderErrorKind;
}

/// Minimal interface shared by every provider-facing service.
pub trait Backend {
    /// Provider specific error type returned by the backend.
    type Error: ProviderError;

    /// Establishes the provider session, reusing it once initialised.
    fn connect(&self) -> BackendFuture<'_, (), Self::Error>;
}

/// Object storage used to stage local artifacts for import.
pub trait ObjectStore: Backend {
    /// Uploads the artifact's local file to its bucket under its key.
    fn upload<'a>(&'a self, artifact: &'a StagedArtifact) -> BackendFuture<'a, (), Self::Error>;

    /// Removes a staged object.
    fn remove<'a>(&'a self, bucket: &'a str, key: &'a str) -> BackendFuture<'a, (), Self::Error>;
}

/// Block volume operations offered by the provider.
pub trait VolumeBackend: Backend {
    /// Submits a snapshot import for a staged object and returns the task id.
    fn request_import<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> BackendFuture<'a, String, Self::Error>;

    /// Fetches the current status of an import task.
    fn import_status<'a>(&'a self, task_id: &'a str)
    -> BackendFuture<'a, ImportStatus, Self::Error>;

    /// Creates a volume from a snapshot and returns the provider's view of it.
    fn create_volume<'a>(
        &'a self,
        request: &'a MaterializeRequest,
    ) -> BackendFuture<'a, ProviderVolume, Self::Error>;

    /// Describes every volume visible to the current credentials.
    fn describe_volumes(&self) -> BackendFuture<'_, Vec<ProviderVolume>, Self::Error>;

    /// Permanently deletes a volume.
    fn delete_volume<'a>(&'a self, volume_id: &'a str) -> BackendFuture<'a, (), Self::Error>;

    /// Attaches a volume to an instance at the requested device slot.
    fn attach_volume<'a>(
        &'a self,
        request: &'a AttachmentRequest,
    ) -> BackendFuture<'a, (), Self::Error>;

    /// Detaches a volume from an instance at the requested device slot.
    fn detach_volume<'a>(
        &'a self,
        request: &'a AttachmentRequest,
    ) -> BackendFuture<'a, (), Self::Error>;
}
