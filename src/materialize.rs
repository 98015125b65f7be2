//! Creation of live volumes from imported snapshots.

use thiserror::Error;
use tracing::info;

use crate::backend::VolumeBackend;
use crate::directory::normalize;
use crate::tags::TagSet;
use crate::volume::VolumeRecord;

/// Availability slot appended to the configured zone for every volume.
pub const PLACEMENT_SUFFIX: char = 'c';

/// Returns the placement zone used for volume creation in `zone`.
#[must_use]
pub fn placement_zone(zone: &str) -> String {
    let mut placement = zone.trim().to_owned();
    placement.push(PLACEMENT_SUFFIX);
    placement
}

/// Provider request for a volume created from a snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MaterializeRequest {
    /// Completed snapshot to restore from.
    pub snapshot_id: String,
    /// Placement zone including the slot suffix.
    pub availability_zone: String,
    /// Tags applied at creation time.
    pub tags: TagSet,
}

/// Errors raised while materialising a volume.
#[derive(Debug, Error)]
pub enum MaterializeError<E>
where
    E: std::error::Error + 'static,
{
    /// The provider rejected the creation request.
    #[error("failed to create volume from snapshot {snapshot_id} in {availability_zone}: {source}")]
    Provider {
        /// Snapshot used as the volume source.
        snapshot_id: String,
        /// Placement zone requested.
        availability_zone: String,
        /// Provider error.
        #[source]
        source: E,
    },
    /// The provider accepted the request but returned no volume identifier.
    /// A volume may exist that nothing tracks.
    #[error(
        "volume created from snapshot {snapshot_id} in {availability_zone} has no identifier; \
         an untracked volume may have been left in place"
    )]
    MissingVolumeId {
        /// Snapshot used as the volume source.
        snapshot_id: String,
        /// Placement zone requested.
        availability_zone: String,
    },
}

/// Turns completed snapshots into tagged, placed volumes.
#[derive(Debug)]
pub struct Materializer<'a, B> {
    backend: &'a B,
}

impl<'a, B: VolumeBackend> Materializer<'a, B> {
    /// Creates a materialiser for `backend`.
    #[must_use]
    pub const fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Creates a volume from `snapshot_id` in `zone` (plus the placement
    /// suffix) carrying `tags`, and returns the record read back from the
    /// creation response.
    ///
    /// # Errors
    ///
    /// Returns [`MaterializeError::Provider`] when the provider rejects the
    /// request and [`MaterializeError::MissingVolumeId`] when the response
    /// lacks an identifier.
    pub async fn materialize(
        &self,
        snapshot_id: &str,
        zone: &str,
        tags: TagSet,
    ) -> Result<VolumeRecord, MaterializeError<B::Error>> {
        let request = MaterializeRequest {
            snapshot_id: snapshot_id.to_owned(),
            availability_zone: placement_zone(zone),
            tags,
        };
        let created = self
            .backend
            .create_volume(&request)
            .await
            .map_err(|source| MaterializeError::Provider {
                snapshot_id: request.snapshot_id.clone(),
                availability_zone: request.availability_zone.clone(),
                source,
            })?;

        let record = normalize(created);
        if !record.is_materialized() {
            return Err(MaterializeError::MissingVolumeId {
                snapshot_id: request.snapshot_id,
                availability_zone: request.availability_zone,
            });
        }
        info!(
            volume_id = record.id.as_deref().unwrap_or_default(),
            snapshot_id = %request.snapshot_id,
            availability_zone = %request.availability_zone,
            "volume materialised"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::parse_tags;
    use crate::test_support::{FailurePoint, MemoryBackend};

    fn tags(name: &str) -> TagSet {
        parse_tags(&["env=prod"], name).unwrap_or_else(|err| panic!("tags: {err}"))
    }

    #[test]
    fn placement_appends_single_letter() {
        assert_eq!(placement_zone("us-east-1"), "us-east-1c");
        assert_eq!(placement_zone(" eu-west-2 "), "eu-west-2c");
    }

    #[tokio::test]
    async fn returns_record_read_back_from_provider() {
        let backend = MemoryBackend::new();
        let materializer = Materializer::new(&backend);

        let record = materializer
            .materialize("snap-1", "us-east-1", tags("db1"))
            .await
            .unwrap_or_else(|err| panic!("materialise: {err}"));

        assert!(record.is_materialized());
        assert_eq!(record.name, "db1");
        assert!(record.attached_instances.is_empty());
        let stored = backend
            .volume(record.id.as_deref().unwrap_or_default())
            .unwrap_or_else(|| panic!("volume should be stored"));
        assert_eq!(stored.availability_zone.as_deref(), Some("us-east-1c"));
    }

    #[tokio::test]
    async fn missing_identifier_reports_possible_leak() {
        let backend = MemoryBackend::new();
        backend.omit_created_volume_ids();
        let materializer = Materializer::new(&backend);

        let err = materializer
            .materialize("snap-1", "us-east-1", tags("db1"))
            .await
            .expect_err("a response without an id must error");

        assert!(
            matches!(
                err,
                MaterializeError::MissingVolumeId { ref snapshot_id, ref availability_zone }
                    if snapshot_id == "snap-1" && availability_zone == "us-east-1c"
            ),
            "unexpected error: {err}"
        );
        assert!(err.to_string().contains("left in place"), "{err}");
        assert_eq!(backend.volumes().len(), 1);
    }

    #[tokio::test]
    async fn wraps_provider_rejection() {
        let backend = MemoryBackend::new();
        backend.fail_at(FailurePoint::CreateVolume);
        let materializer = Materializer::new(&backend);

        let err = materializer
            .materialize("snap-1", "us-east-1", tags("db1"))
            .await
            .expect_err("rejection must error");

        assert!(
            matches!(err, MaterializeError::Provider { ref availability_zone, .. } if availability_zone == "us-east-1c"),
            "unexpected error: {err}"
        );
    }
}
