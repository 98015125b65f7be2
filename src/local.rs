//! Local disk image building.
//!
//! The image format itself belongs to the external `mkfs` tool; this module
//! prepares its arguments, runs it through a [`CommandRunner`], and checks
//! that an artifact was produced.

use std::ffi::OsString;

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::command::{CommandError, CommandRunner};
use crate::volume::VolumeSize;

/// Inputs for building a local volume image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocalVolumeRequest {
    /// Logical volume name, also used as the filesystem label.
    pub name: String,
    /// Directory whose contents seed the image.
    pub data: Option<Utf8PathBuf>,
    /// Requested image size; the tool picks a minimal size when absent.
    pub size: Option<VolumeSize>,
    /// Target provider the image is built for.
    pub provider: String,
}

/// Image produced by a [`LocalVolumeBuilder`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocalArtifact {
    /// Unique artifact file name, used as the object-store key.
    pub name: String,
    /// Absolute path of the image file.
    pub path: Utf8PathBuf,
}

/// Errors raised while building a local image.
#[derive(Debug, Error)]
pub enum LocalBuildError {
    /// The volume name cannot be used in a file name.
    #[error("invalid volume name '{0}'")]
    InvalidName(String),
    /// The data directory cannot be opened.
    #[error("data directory {path} is not accessible: {message}")]
    MissingData {
        /// Directory requested as image contents.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// The volumes directory cannot be prepared.
    #[error("failed to prepare volumes directory {path}: {message}")]
    Io {
        /// Directory that failed.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// The image tool could not be started.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// The image tool exited unsuccessfully.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program that failed.
        program: String,
        /// Rendered exit status.
        status_text: String,
        /// Captured standard error.
        stderr: String,
    },
    /// The tool succeeded but left no image behind.
    #[error("image tool reported success but {path} does not exist")]
    ArtifactMissing {
        /// Expected image path.
        path: Utf8PathBuf,
    },
}

/// Produces local disk images.
pub trait LocalVolumeBuilder {
    /// Builds an image for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`LocalBuildError`] when the image cannot be produced.
    fn build(&self, request: &LocalVolumeRequest) -> Result<LocalArtifact, LocalBuildError>;
}

/// Builds images with an external `mkfs` binary.
#[derive(Clone, Debug)]
pub struct MkfsVolumeBuilder<R> {
    mkfs_bin: String,
    volumes_dir: Utf8PathBuf,
    runner: R,
}

impl<R: CommandRunner> MkfsVolumeBuilder<R> {
    /// Creates a builder writing images into `volumes_dir`.
    #[must_use]
    pub fn new(mkfs_bin: impl Into<String>, volumes_dir: impl Into<Utf8PathBuf>, runner: R) -> Self {
        Self {
            mkfs_bin: mkfs_bin.into(),
            volumes_dir: volumes_dir.into(),
            runner,
        }
    }

    fn mkfs_args(name: &str, request: &LocalVolumeRequest, path: &Utf8PathBuf) -> Vec<OsString> {
        let mut args = vec![OsString::from("-l"), OsString::from(name)];
        if let Some(size) = request.size {
            args.push(OsString::from("-s"));
            args.push(OsString::from(size.bytes().to_string()));
        }
        if let Some(data) = &request.data {
            args.push(OsString::from("-d"));
            args.push(OsString::from(data.as_str()));
        }
        args.push(OsString::from(path.as_str()));
        args
    }
}

fn validate_name(raw: &str) -> Result<&str, LocalBuildError> {
    let name = raw.trim();
    if name.is_empty()
        || name.starts_with('.')
        || name
            .chars()
            .any(|ch| matches!(ch, '/' | '\\') || ch.is_control())
    {
        return Err(LocalBuildError::InvalidName(raw.to_owned()));
    }
    Ok(name)
}

impl<R: CommandRunner> LocalVolumeBuilder for MkfsVolumeBuilder<R> {
    fn build(&self, request: &LocalVolumeRequest) -> Result<LocalArtifact, LocalBuildError> {
        let name = validate_name(&request.name)?;

        if let Some(data) = &request.data {
            Dir::open_ambient_dir(data, ambient_authority()).map_err(|err| {
                LocalBuildError::MissingData {
                    path: data.clone(),
                    message: err.to_string(),
                }
            })?;
        }

        let io_error = |err: std::io::Error| LocalBuildError::Io {
            path: self.volumes_dir.clone(),
            message: err.to_string(),
        };
        Dir::create_ambient_dir_all(&self.volumes_dir, ambient_authority()).map_err(io_error)?;

        let file_name = format!("{name}-{}.raw", Uuid::new_v4().simple());
        let path = self.volumes_dir.join(&file_name);
        let args = Self::mkfs_args(name, request, &path);
        debug!(
            program = %self.mkfs_bin,
            provider = %request.provider,
            path = %path,
            "building local volume image"
        );

        let output = self.runner.run(&self.mkfs_bin, &args)?;
        if !output.is_success() {
            return Err(LocalBuildError::CommandFailure {
                program: self.mkfs_bin.clone(),
                status_text: output.status_text(),
                stderr: output.stderr.trim().to_owned(),
            });
        }

        let dir = Dir::open_ambient_dir(&self.volumes_dir, ambient_authority()).map_err(io_error)?;
        let is_file = dir
            .metadata(&file_name)
            .is_ok_and(|metadata| metadata.is_file());
        if !is_file {
            return Err(LocalBuildError::ArtifactMissing { path });
        }

        info!(artifact = %file_name, path = %path, "local volume image built");
        Ok(LocalArtifact {
            name: file_name,
            path,
        })
    }
}
