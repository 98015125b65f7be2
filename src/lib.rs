//! Core library for the volport volume import tool.
//!
//! The crate turns a locally built disk image into an attachable block
//! volume: the image is staged in object storage, imported as a snapshot by a
//! long-running provider task, polled to completion, cleaned up, and
//! materialised as a tagged volume. Existing volumes can then be listed,
//! attached, detached and deleted.
//!
//! The workflows are written against the traits in [`backend`]; the
//! [`aws`] module implements them with S3 and EC2.

pub mod attach;
pub mod aws;
pub mod backend;
pub mod command;
pub mod config;
pub mod directory;
pub mod import;
pub mod local;
pub mod materialize;
pub mod orchestrator;
pub mod report;
pub mod tags;
pub mod test_support;
pub mod volume;

pub use attach::{AttachmentController, AttachmentError};
pub use aws::{AwsBackend, AwsBackendError, AwsSettings};
pub use backend::{Backend, BackendFuture, ObjectStore, ProviderError, ProviderErrorKind, VolumeBackend};
pub use command::{CommandError, CommandOutput, CommandRunner, ProcessCommandRunner};
pub use config::{ConfigError, VolportConfig};
pub use directory::VolumeDirectory;
pub use import::{
    ImportError, ImportState, ImportStatus, ImportTask, PollPolicy, Sleeper, SnapshotImporter,
    StagedArtifact, TokioSleeper,
};
pub use local::{LocalArtifact, LocalBuildError, LocalVolumeBuilder, LocalVolumeRequest, MkfsVolumeBuilder};
pub use materialize::{MaterializeError, Materializer};
pub use orchestrator::{CreateVolumeRequest, VolumeError, VolumeOrchestrator, WorkflowSettings};
pub use tags::{Tag, TagError, TagSet, parse_tags};
pub use volume::{DeviceSlot, SizeError, VolumeRecord, VolumeSize};
