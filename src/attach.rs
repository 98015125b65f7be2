//! Attachment, detachment and deletion of materialised volumes.
//!
//! Every attachment uses one device slot. With the default slot an instance
//! can hold a single data volume; a second attach is rejected by the provider
//! and surfaced as [`AttachmentError::AttachConflict`].

use thiserror::Error;
use tracing::info;

use crate::backend::{ProviderError, ProviderErrorKind, VolumeBackend};
use crate::volume::{AttachmentRequest, DeviceSlot};

/// Errors raised by the attachment controller. Provider errors are carried
/// verbatim and never retried.
#[derive(Debug, Error)]
pub enum AttachmentError<E>
where
    E: std::error::Error + 'static,
{
    /// The device slot or the volume is already in use.
    #[error("cannot attach volume {volume_id} to instance {instance_id} at {device}: {source}")]
    AttachConflict {
        /// Volume identifier.
        volume_id: String,
        /// Instance identifier.
        instance_id: String,
        /// Device slot requested.
        device: String,
        /// Provider error.
        #[source]
        source: E,
    },
    /// Attachment failed for another reason.
    #[error("failed to attach volume {volume_id} to instance {instance_id}: {source}")]
    Attach {
        /// Volume identifier.
        volume_id: String,
        /// Instance identifier.
        instance_id: String,
        /// Provider error.
        #[source]
        source: E,
    },
    /// The volume is not attached at the slot, or is busy.
    #[error("cannot detach volume {volume_id} from instance {instance_id} at {device}: {source}")]
    DetachConflict {
        /// Volume identifier.
        volume_id: String,
        /// Instance identifier.
        instance_id: String,
        /// Device slot requested.
        device: String,
        /// Provider error.
        #[source]
        source: E,
    },
    /// Detachment failed for another reason.
    #[error("failed to detach volume {volume_id} from instance {instance_id}: {source}")]
    Detach {
        /// Volume identifier.
        volume_id: String,
        /// Instance identifier.
        instance_id: String,
        /// Provider error.
        #[source]
        source: E,
    },
    /// The volume is still attached.
    #[error("cannot delete volume {volume_id} while it is in use: {source}")]
    DeleteInUse {
        /// Volume identifier.
        volume_id: String,
        /// Provider error.
        #[source]
        source: E,
    },
    /// Deletion failed for another reason.
    #[error("failed to delete volume {volume_id}: {source}")]
    Delete {
        /// Volume identifier.
        volume_id: String,
        /// Provider error.
        #[source]
        source: E,
    },
}

/// Attaches, detaches and deletes volumes at a fixed device slot.
#[derive(Debug)]
pub struct AttachmentController<'a, B> {
    backend: &'a B,
    slot: DeviceSlot,
}

impl<'a, B: VolumeBackend> AttachmentController<'a, B> {
    /// Creates a controller that attaches at `slot`.
    #[must_use]
    pub const fn new(backend: &'a B, slot: DeviceSlot) -> Self {
        Self { backend, slot }
    }

    /// Attaches `volume_id` to `instance_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AttachmentError::AttachConflict`] when the provider reports a
    /// conflict and [`AttachmentError::Attach`] otherwise.
    pub async fn attach(
        &self,
        instance_id: &str,
        volume_id: &str,
    ) -> Result<(), AttachmentError<B::Error>> {
        let request = self.request(instance_id, volume_id);
        match self.backend.attach_volume(&request).await {
            Ok(()) => {
                info!(
                    volume_id = %request.volume_id,
                    instance_id = %request.instance_id,
                    device = %request.device,
                    "volume attached"
                );
                Ok(())
            }
            Err(source) if source.kind() == ProviderErrorKind::Conflict => {
                Err(AttachmentError::AttachConflict {
                    volume_id: request.volume_id,
                    instance_id: request.instance_id,
                    device: request.device.to_string(),
                    source,
                })
            }
            Err(source) => Err(AttachmentError::Attach {
                volume_id: request.volume_id,
                instance_id: request.instance_id,
                source,
            }),
        }
    }

    /// Detaches `volume_id` from `instance_id` at the same slot.
    ///
    /// # Errors
    ///
    /// Returns [`AttachmentError::DetachConflict`] when the provider reports a
    /// conflict and [`AttachmentError::Detach`] otherwise.
    pub async fn detach(
        &self,
        instance_id: &str,
        volume_id: &str,
    ) -> Result<(), AttachmentError<B::Error>> {
        let request = self.request(instance_id, volume_id);
        match self.backend.detach_volume(&request).await {
            Ok(()) => {
                info!(
                    volume_id = %request.volume_id,
                    instance_id = %request.instance_id,
                    "volume detached"
                );
                Ok(())
            }
            Err(source) if source.kind() == ProviderErrorKind::Conflict => {
                Err(AttachmentError::DetachConflict {
                    volume_id: request.volume_id,
                    instance_id: request.instance_id,
                    device: request.device.to_string(),
                    source,
                })
            }
            Err(source) => Err(AttachmentError::Detach {
                volume_id: request.volume_id,
                instance_id: request.instance_id,
                source,
            }),
        }
    }

    /// Permanently deletes `volume_id`. Whether the volume is attached is
    /// checked by the provider, not locally.
    ///
    /// # Errors
    ///
    /// Returns [`AttachmentError::DeleteInUse`] when the provider reports the
    /// volume as in use and [`AttachmentError::Delete`] otherwise.
    pub async fn delete(&self, volume_id: &str) -> Result<(), AttachmentError<B::Error>> {
        let trimmed = volume_id.trim();
        match self.backend.delete_volume(trimmed).await {
            Ok(()) => {
                info!(volume_id = %trimmed, "volume deleted");
                Ok(())
            }
            Err(source) if source.kind() == ProviderErrorKind::Conflict => {
                Err(AttachmentError::DeleteInUse {
                    volume_id: trimmed.to_owned(),
                    source,
                })
            }
            Err(source) => Err(AttachmentError::Delete {
                volume_id: trimmed.to_owned(),
                source,
            }),
        }
    }

    fn request(&self, instance_id: &str, volume_id: &str) -> AttachmentRequest {
        AttachmentRequest::new(instance_id, volume_id, self.slot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryBackend;
    use crate::volume::ProviderVolume;
    use rstest::{fixture, rstest};

    #[fixture]
    fn backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        for id in ["vol-1", "vol-2"] {
            backend.insert_volume(ProviderVolume {
                id: id.to_owned(),
                state: String::from("available"),
                ..ProviderVolume::default()
            });
        }
        backend
    }

    #[rstest]
    #[tokio::test]
    async fn attach_uses_configured_slot(backend: MemoryBackend) {
        let controller = AttachmentController::new(&backend, DeviceSlot::new("/dev/sdg"));
        controller
            .attach("i-1", "vol-1")
            .await
            .unwrap_or_else(|err| panic!("attach: {err}"));

        let stored = backend
            .volume("vol-1")
            .unwrap_or_else(|| panic!("vol-1 missing"));
        assert_eq!(stored.state, "in-use");
        assert_eq!(
            stored
                .attachments
                .first()
                .map(|attachment| attachment.device.as_str()),
            Some("/dev/sdg")
        );
    }

    #[rstest]
    #[tokio::test]
    async fn second_attach_on_same_instance_conflicts(backend: MemoryBackend) {
        let controller = AttachmentController::new(&backend, DeviceSlot::default());
        controller
            .attach("i-1", "vol-1")
            .await
            .unwrap_or_else(|err| panic!("first attach: {err}"));

        let err = controller
            .attach("i-1", "vol-2")
            .await
            .expect_err("occupied slot must conflict");

        assert!(
            matches!(err, AttachmentError::AttachConflict { ref device, .. } if device == "/dev/sdf"),
            "unexpected error: {err}"
        );
    }

    #[rstest]
    #[tokio::test]
    async fn delete_of_attached_volume_is_rejected(backend: MemoryBackend) {
        let controller = AttachmentController::new(&backend, DeviceSlot::default());
        controller
            .attach("i-1", "vol-1")
            .await
            .unwrap_or_else(|err| panic!("attach: {err}"));

        let err = controller
            .delete("vol-1")
            .await
            .expect_err("attached volume must not be deleted");

        assert!(matches!(err, AttachmentError::DeleteInUse { .. }));
        let stored = backend
            .volume("vol-1")
            .unwrap_or_else(|| panic!("vol-1 missing"));
        assert_eq!(stored.attachments.len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn detach_then_delete_succeeds(backend: MemoryBackend) {
        let controller = AttachmentController::new(&backend, DeviceSlot::default());
        controller
            .attach("i-1", "vol-1")
            .await
            .unwrap_or_else(|err| panic!("attach: {err}"));
        controller
            .detach("i-1", "vol-1")
            .await
            .unwrap_or_else(|err| panic!("detach: {err}"));
        controller
            .delete("vol-1")
            .await
            .unwrap_or_else(|err| panic!("delete: {err}"));

        assert!(backend.volume("vol-1").is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn detach_of_unattached_volume_conflicts(backend: MemoryBackend) {
        let controller = AttachmentController::new(&backend, DeviceSlot::default());
        let err = controller
            .detach("i-1", "vol-1")
            .await
            .expect_err("nothing to detach");
        assert!(matches!(err, AttachmentError::DetachConflict { .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn delete_of_unknown_volume_is_plain_failure(backend: MemoryBackend) {
        let controller = AttachmentController::new(&backend, DeviceSlot::default());
        let err = controller
            .delete("vol-missing")
            .await
            .expect_err("unknown volume");
        assert!(matches!(err, AttachmentError::Delete { .. }));
    }
}
