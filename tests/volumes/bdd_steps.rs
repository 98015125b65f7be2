//! BDD step definitions for the volume workflows.

use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use volport::test_support::{FailurePoint, MemoryError};
use volport::volume::{ProviderVolume, VolumeAttachment};
use volport::{AttachmentError, CreateVolumeRequest, ImportStatus, VolumeError};

use super::test_helpers::{VolumeContext, VolumeFailure, VolumeFailureKind, VolumeResult};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("runtime setup failed: {0}")]
    Setup(#[from] std::io::Error),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a ready volume workflow")]
fn ready_workflow(volume_context: &VolumeContext) {
    let _ = volume_context;
}

#[given("the import completes after \"{polls}\" pending polls")]
fn import_completes_after(volume_context: &VolumeContext, polls: u32) {
    let pending = (0..polls).map(|_| ImportStatus::Pending { progress: None });
    volume_context.backend.script_import(pending.chain([ImportStatus::Completed {
        snapshot_id: String::from("snap-bdd"),
    }]));
}

#[given("the import fails with \"{cause}\"")]
fn import_fails(volume_context: &VolumeContext, cause: String) {
    volume_context.backend.script_import([
        ImportStatus::Pending { progress: None },
        ImportStatus::Failed { cause },
    ]);
}

#[given("the import never completes")]
fn import_never_completes(volume_context: &VolumeContext) {
    volume_context.backend.stall_imports();
}

#[given("at most \"{polls}\" polls are allowed")]
fn poll_bound(volume_context: &VolumeContext, polls: u32) {
    volume_context.max_polls.set(polls);
}

#[given("volume creation fails")]
fn volume_creation_fails(volume_context: &VolumeContext) {
    volume_context.backend.fail_at(FailurePoint::CreateVolume);
}

#[given("a volume \"{volume_id}\" exists")]
fn volume_exists(volume_context: &VolumeContext, volume_id: String) {
    volume_context.backend.insert_volume(ProviderVolume {
        id: volume_id,
        state: String::from("available"),
        size_bytes: 1 << 30,
        ..ProviderVolume::default()
    });
}

#[when("I create volume \"{name}\" with tag \"{tag}\"")]
fn create_volume(volume_context: &VolumeContext, name: String, tag: String) -> Result<(), StepError> {
    let runtime = Runtime::new()?;
    let orchestrator = volume_context.orchestrator();
    let request = CreateVolumeRequest {
        tags: vec![tag],
        ..CreateVolumeRequest::new(name, "aws")
    };
    let cancel = CancellationToken::new();
    let result = runtime.block_on(orchestrator.create_volume(&request, &cancel));
    volume_context.record(match result {
        Ok(record) => VolumeResult::Created(record),
        Err(err) => VolumeResult::Failure(failure(&err)),
    });
    Ok(())
}

#[when("I list volumes")]
fn list_volumes(volume_context: &VolumeContext) -> Result<(), StepError> {
    let runtime = Runtime::new()?;
    let orchestrator = volume_context.orchestrator();
    let result = runtime.block_on(orchestrator.list_volumes());
    volume_context.record(match result {
        Ok(volumes) => VolumeResult::Listed(volumes),
        Err(err) => VolumeResult::Failure(failure(&err)),
    });
    Ok(())
}

#[when("I attach \"{volume_id}\" to \"{instance_id}\"")]
fn attach_volume(
    volume_context: &VolumeContext,
    volume_id: String,
    instance_id: String,
) -> Result<(), StepError> {
    let runtime = Runtime::new()?;
    let orchestrator = volume_context.orchestrator();
    let result = runtime.block_on(orchestrator.attach_volume(&instance_id, &volume_id));
    volume_context.record(done_or_failure(result));
    Ok(())
}

#[when("I detach \"{volume_id}\" from \"{instance_id}\"")]
fn detach_volume(
    volume_context: &VolumeContext,
    volume_id: String,
    instance_id: String,
) -> Result<(), StepError> {
    let runtime = Runtime::new()?;
    let orchestrator = volume_context.orchestrator();
    let result = runtime.block_on(orchestrator.detach_volume(&instance_id, &volume_id));
    volume_context.record(done_or_failure(result));
    Ok(())
}

#[when("I delete \"{volume_id}\"")]
fn delete_volume(volume_context: &VolumeContext, volume_id: String) -> Result<(), StepError> {
    let runtime = Runtime::new()?;
    let orchestrator = volume_context.orchestrator();
    let result = runtime.block_on(orchestrator.delete_volume(&volume_id));
    volume_context.record(done_or_failure(result));
    Ok(())
}

#[then("the volume is created with a provider id")]
fn volume_created(volume_context: &VolumeContext) -> Result<(), StepError> {
    let record = created(volume_context)?;
    match record.id.as_deref() {
        Some(id) if !id.is_empty() && record.is_materialized() => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected a provider volume id, got {other:?}"
        ))),
    }
}

#[then("the created volume is named \"{name}\"")]
fn created_volume_named(volume_context: &VolumeContext, name: String) -> Result<(), StepError> {
    let record = created(volume_context)?;
    if record.name == name {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected volume named {name}, got {}",
            record.name
        )))
    }
}

#[then("the staged object is removed")]
fn staged_object_removed(volume_context: &VolumeContext) -> Result<(), StepError> {
    let objects = volume_context.backend.objects();
    let removed = volume_context.backend.removed_objects();
    if objects.is_empty() && removed.len() == 1 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected one removed object and none remaining, got remaining {objects:?}, removed {removed:?}"
        )))
    }
}

#[then("the staged object is left in place")]
fn staged_object_left(volume_context: &VolumeContext) -> Result<(), StepError> {
    let objects = volume_context.backend.objects();
    if objects.len() == 1 && volume_context.backend.removed_objects().is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected the staged object to remain, got {objects:?}"
        )))
    }
}

#[then("the local artifact is kept")]
fn local_artifact_kept(volume_context: &VolumeContext) -> Result<(), StepError> {
    let artifacts = volume_context.artifacts();
    if artifacts.len() == 1 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected exactly one local artifact, got {artifacts:?}"
        )))
    }
}

#[then("no local artifact was built")]
fn no_local_artifact(volume_context: &VolumeContext) -> Result<(), StepError> {
    if volume_context.runner.invocations().is_empty() && volume_context.artifacts().is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(String::from(
            "the image builder should not run",
        )))
    }
}

#[then("creation fails at the \"{stage}\" stage")]
fn creation_fails_at(volume_context: &VolumeContext, stage: String) -> Result<(), StepError> {
    let expected = parse_failure_kind(&stage)?;
    let failure = last_failure(volume_context)?;
    if failure.kind == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected failure kind {expected:?}, got {:?}: {}",
            failure.kind, failure.message
        )))
    }
}

#[then("the failure mentions \"{text}\"")]
fn failure_mentions(volume_context: &VolumeContext, text: String) -> Result<(), StepError> {
    let failure = last_failure(volume_context)?;
    if failure.message.contains(&text) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected failure to mention '{text}', got: {}",
            failure.message
        )))
    }
}

#[then("\"{polls}\" status polls were made")]
fn status_polls_made(volume_context: &VolumeContext, polls: u32) -> Result<(), StepError> {
    let calls = volume_context.backend.status_calls();
    let sleeps = volume_context.sleeper.sleeps().len();
    let expected_sleeps = usize::try_from(polls.saturating_sub(1)).unwrap_or(usize::MAX);
    if calls == polls && sleeps == expected_sleeps {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {polls} polls and {expected_sleeps} sleeps, got {calls} polls and {sleeps} sleeps"
        )))
    }
}

#[then("the listing contains a volume named \"{name}\"")]
fn listing_contains(volume_context: &VolumeContext, name: String) -> Result<(), StepError> {
    let volumes = listed(volume_context)?;
    if volumes
        .iter()
        .any(|volume| volume.name == name && volume.id.is_some())
    {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected a volume named {name} in {volumes:?}"
        )))
    }
}

#[then("the listing is empty")]
fn listing_empty(volume_context: &VolumeContext) -> Result<(), StepError> {
    let volumes = listed(volume_context)?;
    if volumes.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no volumes, got {volumes:?}"
        )))
    }
}

#[then("the last operation fails with \"{kind}\"")]
fn last_operation_fails(volume_context: &VolumeContext, kind: String) -> Result<(), StepError> {
    creation_fails_at(volume_context, kind)
}

#[then("the last operation succeeds")]
fn last_operation_succeeds(volume_context: &VolumeContext) -> Result<(), StepError> {
    match volume_context.outcome() {
        Some(VolumeResult::Failure(failure)) => Err(StepError::Assertion(format!(
            "expected success, got failure: {}",
            failure.message
        ))),
        Some(_) => Ok(()),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("\"{volume_id}\" is still attached to \"{instance_id}\"")]
fn still_attached(
    volume_context: &VolumeContext,
    volume_id: String,
    instance_id: String,
) -> Result<(), StepError> {
    let volume = volume_context
        .backend
        .volume(&volume_id)
        .ok_or_else(|| StepError::Assertion(format!("volume {volume_id} is missing")))?;
    let attached = volume
        .attachments
        .iter()
        .any(|VolumeAttachment { instance_id: id, .. }| *id == instance_id);
    if attached && volume.state == "in-use" {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {volume_id} attached to {instance_id}, got {volume:?}"
        )))
    }
}

#[then("\"{volume_id}\" no longer exists")]
fn no_longer_exists(volume_context: &VolumeContext, volume_id: String) -> Result<(), StepError> {
    if volume_context.backend.volume(&volume_id).is_none() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "volume {volume_id} should have been deleted"
        )))
    }
}

fn created(volume_context: &VolumeContext) -> Result<volport::VolumeRecord, StepError> {
    match volume_context.outcome() {
        Some(VolumeResult::Created(record)) => Ok(record),
        Some(VolumeResult::Failure(failure)) => Err(StepError::Assertion(format!(
            "expected success, got failure: {}",
            failure.message
        ))),
        other => Err(StepError::Assertion(format!(
            "expected a created volume, got {other:?}"
        ))),
    }
}

fn listed(volume_context: &VolumeContext) -> Result<Vec<volport::VolumeRecord>, StepError> {
    match volume_context.outcome() {
        Some(VolumeResult::Listed(volumes)) => Ok(volumes),
        other => Err(StepError::Assertion(format!(
            "expected a listing, got {other:?}"
        ))),
    }
}

fn last_failure(volume_context: &VolumeContext) -> Result<VolumeFailure, StepError> {
    match volume_context.outcome() {
        Some(VolumeResult::Failure(failure)) => Ok(failure),
        other => Err(StepError::Assertion(format!(
            "expected failure outcome, got {other:?}"
        ))),
    }
}

fn done_or_failure(result: Result<(), VolumeError<MemoryError>>) -> VolumeResult {
    match result {
        Ok(()) => VolumeResult::Done,
        Err(err) => VolumeResult::Failure(failure(&err)),
    }
}

fn failure(err: &VolumeError<MemoryError>) -> VolumeFailure {
    VolumeFailure {
        kind: map_failure_kind(err),
        message: err.to_string(),
    }
}

const fn map_failure_kind(err: &VolumeError<MemoryError>) -> VolumeFailureKind {
    match err {
        VolumeError::Tags(_) => VolumeFailureKind::Tags,
        VolumeError::LocalBuild(_) => VolumeFailureKind::LocalBuild,
        VolumeError::Upload { .. } => VolumeFailureKind::Upload,
        VolumeError::Import { .. } => VolumeFailureKind::Import,
        VolumeError::Materialization { .. } => VolumeFailureKind::Materialization,
        VolumeError::List(_) => VolumeFailureKind::List,
        VolumeError::Attachment(AttachmentError::AttachConflict { .. }) => {
            VolumeFailureKind::AttachConflict
        }
        VolumeError::Attachment(AttachmentError::DetachConflict { .. }) => {
            VolumeFailureKind::DetachConflict
        }
        VolumeError::Attachment(AttachmentError::DeleteInUse { .. }) => {
            VolumeFailureKind::DeleteInUse
        }
        _ => VolumeFailureKind::Other,
    }
}

fn parse_failure_kind(kind: &str) -> Result<VolumeFailureKind, StepError> {
    match kind {
        "tags" => Ok(VolumeFailureKind::Tags),
        "local build" => Ok(VolumeFailureKind::LocalBuild),
        "upload" => Ok(VolumeFailureKind::Upload),
        "import" => Ok(VolumeFailureKind::Import),
        "materialization" => Ok(VolumeFailureKind::Materialization),
        "list" => Ok(VolumeFailureKind::List),
        "attach conflict" => Ok(VolumeFailureKind::AttachConflict),
        "detach conflict" => Ok(VolumeFailureKind::DetachConflict),
        "delete in use" => Ok(VolumeFailureKind::DeleteInUse),
        other => Err(StepError::Assertion(format!(
            "unknown failure kind: {other}"
        ))),
    }
}
