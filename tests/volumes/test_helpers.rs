//! Shared fixtures for volume BDD scenarios.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::fixture;
use tempfile::TempDir;
use thiserror::Error;
use volport::test_support::{ImageWritingRunner, MemoryBackend, RecordingSleeper};
use volport::{
    DeviceSlot, MkfsVolumeBuilder, PollPolicy, VolumeOrchestrator, VolumeRecord, WorkflowSettings,
};

pub type TestOrchestrator =
    VolumeOrchestrator<MemoryBackend, MkfsVolumeBuilder<ImageWritingRunner>, RecordingSleeper>;

const DEFAULT_MAX_POLLS: u32 = 5;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VolumeFailureKind {
    Tags,
    LocalBuild,
    Upload,
    Import,
    Materialization,
    List,
    AttachConflict,
    DetachConflict,
    DeleteInUse,
    Other,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeFailure {
    pub kind: VolumeFailureKind,
    pub message: String,
}

#[derive(Clone, Debug)]
pub enum VolumeResult {
    Created(VolumeRecord),
    Listed(Vec<VolumeRecord>),
    Done,
    Failure(VolumeFailure),
}

#[derive(Clone, Debug)]
pub struct VolumeContext {
    pub _tmp: Rc<TempDir>,
    pub volumes_dir: Utf8PathBuf,
    pub backend: MemoryBackend,
    pub runner: ImageWritingRunner,
    pub sleeper: RecordingSleeper,
    pub max_polls: Rc<Cell<u32>>,
    pub outcome: Rc<RefCell<Option<VolumeResult>>>,
}

impl VolumeContext {
    pub fn orchestrator(&self) -> TestOrchestrator {
        let settings = WorkflowSettings {
            bucket: String::from("images"),
            zone: String::from("us-east-1"),
            policy: PollPolicy::new(Duration::from_secs(15)).with_max_polls(self.max_polls.get()),
            slot: DeviceSlot::default(),
        };
        let builder =
            MkfsVolumeBuilder::new("mkfs", self.volumes_dir.clone(), self.runner.clone());
        VolumeOrchestrator::new(self.backend.clone(), builder, settings)
            .with_sleeper(self.sleeper.clone())
    }

    pub fn record(&self, result: VolumeResult) {
        self.outcome.replace(Some(result));
    }

    pub fn outcome(&self) -> Option<VolumeResult> {
        self.outcome.borrow().clone()
    }

    pub fn artifacts(&self) -> Vec<Utf8PathBuf> {
        let Ok(entries) = self.volumes_dir.read_dir_utf8() else {
            return Vec::new();
        };
        entries
            .filter_map(Result::ok)
            .map(|entry| entry.path().to_owned())
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum VolumeTestError {
    #[error("invalid volume fixture: {0}")]
    Fixture(String),
}

#[fixture]
pub fn volume_context_result() -> Result<VolumeContext, VolumeTestError> {
    build_volume_context()
}

#[fixture]
pub fn volume_context(
    volume_context_result: Result<VolumeContext, VolumeTestError>,
) -> VolumeContext {
    volume_context_result
        .unwrap_or_else(|err| panic!("volume context fixture should initialise: {err}"))
}

fn build_volume_context() -> Result<VolumeContext, VolumeTestError> {
    let tmp = TempDir::new().map_err(|err| VolumeTestError::Fixture(err.to_string()))?;
    let volumes_dir = Utf8PathBuf::from_path_buf(tmp.path().join("volumes"))
        .map_err(|path| VolumeTestError::Fixture(format!("non-utf8 path {}", path.display())))?;

    Ok(VolumeContext {
        _tmp: Rc::new(tmp),
        volumes_dir,
        backend: MemoryBackend::new(),
        runner: ImageWritingRunner::new(),
        sleeper: RecordingSleeper::new(),
        max_polls: Rc::new(Cell::new(DEFAULT_MAX_POLLS)),
        outcome: Rc::new(RefCell::new(None)),
    })
}
