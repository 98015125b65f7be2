//! Listing of provider volumes as normalised records.

use tracing::debug;

use crate::backend::VolumeBackend;
use crate::tags::{NAME_TAG_KEY, find_value};
use crate::volume::{ProviderVolume, VolumeRecord};

/// Converts a provider volume into a [`VolumeRecord`].
///
/// The name comes from the tag keyed exactly `Name` and is empty when no such
/// tag exists. Attachments keep provider order.
#[must_use]
pub fn normalize(volume: ProviderVolume) -> VolumeRecord {
    let name = find_value(&volume.tags, NAME_TAG_KEY)
        .unwrap_or_default()
        .to_owned();
    VolumeRecord {
        id: Some(volume.id).filter(|id| !id.is_empty()),
        name,
        status: volume.state,
        size_bytes: volume.size_bytes,
        local_path: None,
        created_at: volume.created_at,
        attached_instances: volume
            .attachments
            .into_iter()
            .map(|attachment| attachment.instance_id)
            .collect(),
    }
}

/// Read-only view over the volumes visible to the current credentials.
#[derive(Debug)]
pub struct VolumeDirectory<'a, B> {
    backend: &'a B,
}

impl<'a, B: VolumeBackend> VolumeDirectory<'a, B> {
    /// Creates a directory over `backend`.
    #[must_use]
    pub const fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Fetches a point-in-time listing. Each call re-fetches.
    ///
    /// # Errors
    ///
    /// Returns the provider error when the listing call fails.
    pub async fn list(&self) -> Result<Vec<VolumeRecord>, B::Error> {
        let volumes = self.backend.describe_volumes().await?;
        debug!(count = volumes.len(), "described volumes");
        Ok(volumes.into_iter().map(normalize).collect())
    }
}
