//! Volume records, sizes and attachment parameters.

use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use serde::Serialize;
use thiserror::Error;

use crate::tags::Tag;

/// Device slot used for every attachment unless the caller overrides it.
pub const DEFAULT_DEVICE_SLOT: &str = "/dev/sdf";

const BYTES_PER_KIB: u64 = 1024;

/// Canonical, provider-neutral description of a volume.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct VolumeRecord {
    /// Provider-assigned identifier; `None` until the provider knows the
    /// volume.
    pub id: Option<String>,
    /// User-facing label taken from the `Name` tag; empty when untagged.
    pub name: String,
    /// Provider lifecycle state (for example `available` or `in-use`).
    pub status: String,
    /// Capacity in bytes.
    pub size_bytes: u64,
    /// Source artifact path; only set on records returned by creation.
    pub local_path: Option<Utf8PathBuf>,
    /// Provider-assigned creation timestamp (RFC 3339).
    pub created_at: Option<String>,
    /// Instances the volume is attached to, in provider order.
    pub attached_instances: Vec<String>,
}

impl VolumeRecord {
    /// Returns `true` when the provider has assigned an identifier.
    #[must_use]
    pub fn is_materialized(&self) -> bool {
        self.id.as_deref().is_some_and(|id| !id.is_empty())
    }

    /// Joins the attached instance identifiers for tabular output.
    #[must_use]
    pub fn attached_to(&self) -> String {
        self.attached_instances.join(";")
    }
}

/// Provider-native attachment entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeAttachment {
    /// Instance holding the volume.
    pub instance_id: String,
    /// Device slot the volume occupies on that instance.
    pub device: String,
}

/// Volume exactly as reported by the provider, before normalisation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProviderVolume {
    /// Provider identifier.
    pub id: String,
    /// Lifecycle state string.
    pub state: String,
    /// Capacity in bytes.
    pub size_bytes: u64,
    /// Creation timestamp, when reported.
    pub created_at: Option<String>,
    /// Placement zone, when reported.
    pub availability_zone: Option<String>,
    /// Key/value tags in provider order.
    pub tags: Vec<Tag>,
    /// Attachments in provider order.
    pub attachments: Vec<VolumeAttachment>,
}

/// Guest-visible attachment point for a data volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceSlot(String);

impl DeviceSlot {
    /// Wraps a device path, trimming whitespace.
    #[must_use]
    pub fn new(device: impl Into<String>) -> Self {
        Self(device.into().trim().to_owned())
    }

    /// Returns the device path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for DeviceSlot {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE_SLOT)
    }
}

impl fmt::Display for DeviceSlot {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Parameters for attaching or detaching a volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttachmentRequest {
    /// Target instance identifier.
    pub instance_id: String,
    /// Volume identifier.
    pub volume_id: String,
    /// Device slot on the instance.
    pub device: DeviceSlot,
}

impl AttachmentRequest {
    /// Creates a request, trimming identifiers.
    #[must_use]
    pub fn new(
        instance_id: impl Into<String>,
        volume_id: impl Into<String>,
        device: DeviceSlot,
    ) -> Self {
        Self {
            instance_id: instance_id.into().trim().to_owned(),
            volume_id: volume_id.into().trim().to_owned(),
            device,
        }
    }
}

/// Capacity parsed from a human string such as `512M` or `2G`.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct VolumeSize(u64);

impl VolumeSize {
    /// Wraps an exact byte count.
    #[must_use]
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Returns the size in bytes.
    #[must_use]
    pub const fn bytes(self) -> u64 {
        self.0
    }
}

/// Errors raised when parsing a [`VolumeSize`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SizeError {
    /// The value is blank.
    #[error("volume size must not be empty")]
    Empty,
    /// The value is not a number with an optional `k`, `M`, `G` or `T` suffix.
    #[error("invalid volume size '{0}': expected a number with an optional k, M, G or T suffix")]
    Invalid(String),
    /// The value is zero.
    #[error("volume size must be greater than zero")]
    Zero,
    /// The value does not fit in 64 bits.
    #[error("volume size '{0}' is too large to represent")]
    Overflow(String),
}

impl FromStr for VolumeSize {
    type Err = SizeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(SizeError::Empty);
        }

        let (digits, exponent) = match value.char_indices().last() {
            Some((index, unit)) if unit.is_ascii_alphabetic() => {
                let exponent = match unit.to_ascii_lowercase() {
                    'k' => 1,
                    'm' => 2,
                    'g' => 3,
                    't' => 4,
                    _ => return Err(SizeError::Invalid(value.to_owned())),
                };
                (value.get(..index).unwrap_or_default(), exponent)
            }
            _ => (value, 0),
        };

        let count: u64 = digits
            .parse()
            .map_err(|_| SizeError::Invalid(value.to_owned()))?;
        if count == 0 {
            return Err(SizeError::Zero);
        }
        let bytes = BYTES_PER_KIB
            .checked_pow(exponent)
            .and_then(|multiplier| count.checked_mul(multiplier))
            .ok_or_else(|| SizeError::Overflow(value.to_owned()))?;
        Ok(Self(bytes))
    }
}
