//! Configuration loading via `ortho-config`.

use std::ffi::OsString;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::import::{DEFAULT_MAX_POLLS, PollPolicy};
use crate::orchestrator::WorkflowSettings;
use crate::volume::{DEFAULT_DEVICE_SLOT, DeviceSlot};

/// Name of the configuration file searched for by discovery.
pub const CONFIG_FILE_NAME: &str = "volport.toml";

/// Settings for the AWS account, staging bucket, import polling and local
/// image building. Values merge defaults, configuration files and
/// environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "VOLPORT",
    discovery(
        app_name = "volport",
        env_var = "VOLPORT_CONFIG_PATH",
        config_file_name = "volport.toml",
        dotfile_name = ".volport.toml",
        project_file_name = "volport.toml"
    )
)]
pub struct VolportConfig {
    /// AWS region hosting the bucket and the volumes. Required.
    #[ortho_config(default = String::new())]
    pub region: String,
    /// Zone prefix; volumes are created in its `c` availability zone.
    /// Required.
    #[ortho_config(default = String::new())]
    pub zone: String,
    /// Bucket used to stage images for import. Required.
    #[ortho_config(default = String::new())]
    pub bucket: String,
    /// Named credentials profile.
    pub profile: Option<String>,
    /// Endpoint override applied to both S3 and EC2 clients.
    pub endpoint_url: Option<String>,
    /// Seconds between import status polls.
    #[ortho_config(default = 15)]
    pub poll_interval_secs: u64,
    /// Maximum number of import status polls.
    #[ortho_config(default = DEFAULT_MAX_POLLS)]
    pub max_polls: u32,
    /// Optional cap on the total import wait, in seconds.
    pub max_wait_secs: Option<u64>,
    /// Device slot used for attachments.
    #[ortho_config(default = DEFAULT_DEVICE_SLOT.to_owned())]
    pub device: String,
    /// Directory receiving built images. A leading `~/` is expanded.
    #[ortho_config(default = "~/.volport/volumes".to_owned())]
    pub volumes_dir: String,
    /// Image building binary.
    #[ortho_config(default = "mkfs".to_owned())]
    pub mkfs_bin: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn hint(&self) -> String {
        format!(
            "set {} or add {} to {CONFIG_FILE_NAME}",
            self.env_var, self.toml_key
        )
    }
}

impl VolportConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: {}",
                metadata.description,
                metadata.hint()
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("volport")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages include guidance on how to
    /// provide values via environment variables or the configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::Invalid`] when a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.region,
            &FieldMetadata::new("AWS region", "VOLPORT_REGION", "region"),
        )?;
        Self::require_field(
            &self.zone,
            &FieldMetadata::new("availability zone prefix", "VOLPORT_ZONE", "zone"),
        )?;
        Self::require_field(
            &self.bucket,
            &FieldMetadata::new("staging bucket", "VOLPORT_BUCKET", "bucket"),
        )?;
        Self::require_field(
            &self.device,
            &FieldMetadata::new("attachment device", "VOLPORT_DEVICE", "device"),
        )?;
        Self::require_field(
            &self.volumes_dir,
            &FieldMetadata::new("volumes directory", "VOLPORT_VOLUMES_DIR", "volumes_dir"),
        )?;
        Self::require_field(
            &self.mkfs_bin,
            &FieldMetadata::new("image builder binary", "VOLPORT_MKFS_BIN", "mkfs_bin"),
        )?;
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(format!(
                "poll interval must be greater than zero: {}",
                FieldMetadata::new("", "VOLPORT_POLL_INTERVAL_SECS", "poll_interval_secs").hint()
            )));
        }
        if self.max_polls == 0 {
            return Err(ConfigError::Invalid(format!(
                "max polls must be greater than zero: {}",
                FieldMetadata::new("", "VOLPORT_MAX_POLLS", "max_polls").hint()
            )));
        }
        Ok(())
    }

    /// Returns the import wait policy.
    #[must_use]
    pub fn poll_policy(&self) -> PollPolicy {
        let policy = PollPolicy::new(Duration::from_secs(self.poll_interval_secs))
            .with_max_polls(self.max_polls);
        match self.max_wait_secs {
            Some(secs) => policy.with_max_wait(Duration::from_secs(secs)),
            None => policy,
        }
    }

    /// Returns the attachment device slot.
    #[must_use]
    pub fn device_slot(&self) -> DeviceSlot {
        DeviceSlot::new(self.device.trim())
    }

    /// Returns the volumes directory with a leading `~/` expanded.
    #[must_use]
    pub fn volumes_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(expand_tilde(self.volumes_dir.trim()))
    }

    /// Builds the settings shared by the volume workflows.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn workflow_settings(&self) -> Result<WorkflowSettings, ConfigError> {
        self.validate()?;
        Ok(WorkflowSettings {
            bucket: self.bucket.trim().to_owned(),
            zone: self.zone.trim().to_owned(),
            policy: self.poll_policy(),
            slot: self.device_slot(),
        })
    }
}

/// Expands a leading `~/` to the current user's home directory.
///
/// Paths without the prefix, or without a resolvable `HOME`, are returned
/// unchanged.
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is out of range.
    #[error("invalid configuration value: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
