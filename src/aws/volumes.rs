//! EC2 volume operations and conversion into provider-neutral volumes.

use aws_sdk_ec2::primitives::{DateTime, DateTimeFormat};
use aws_sdk_ec2::types::{
    ResourceType, Tag as Ec2Tag, TagSpecification, Volume, VolumeAttachment as Ec2Attachment,
};

use super::{AwsBackend, AwsBackendError};
use crate::backend::{BackendFuture, VolumeBackend};
use crate::import::ImportStatus;
use crate::materialize::MaterializeRequest;
use crate::tags::Tag;
use crate::volume::{AttachmentRequest, ProviderVolume, VolumeAttachment};

const GIB: u64 = 1024 * 1024 * 1024;

fn size_bytes(size_gib: Option<i32>) -> u64 {
    size_gib
        .and_then(|gib| u64::try_from(gib).ok())
        .and_then(|gib| gib.checked_mul(GIB))
        .unwrap_or_default()
}

fn created_at(time: Option<&DateTime>) -> Option<String> {
    time.and_then(|value| value.fmt(DateTimeFormat::DateTime).ok())
}

fn tags(tags: &[Ec2Tag]) -> Vec<Tag> {
    tags.iter()
        .map(|tag| {
            Tag::new(
                tag.key().unwrap_or_default(),
                tag.value().unwrap_or_default(),
            )
        })
        .collect()
}

fn attachments(attachments: &[Ec2Attachment]) -> Vec<VolumeAttachment> {
    attachments
        .iter()
        .filter_map(|attachment| {
            attachment.instance_id().map(|instance_id| VolumeAttachment {
                instance_id: instance_id.to_owned(),
                device: attachment.device().unwrap_or_default().to_owned(),
            })
        })
        .collect()
}

fn from_volume(volume: &Volume) -> ProviderVolume {
    ProviderVolume {
        id: volume.volume_id().unwrap_or_default().to_owned(),
        state: volume
            .state()
            .map(|state| state.as_str().to_owned())
            .unwrap_or_default(),
        size_bytes: size_bytes(volume.size()),
        created_at: created_at(volume.create_time()),
        availability_zone: volume.availability_zone().map(str::to_owned),
        tags: tags(volume.tags()),
        attachments: attachments(volume.attachments()),
    }
}

impl VolumeBackend for AwsBackend {
    fn request_import<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> BackendFuture<'a, String, Self::Error> {
        Box::pin(self.submit_import(bucket, key))
    }

    fn import_status<'a>(
        &'a self,
        task_id: &'a str,
    ) -> BackendFuture<'a, ImportStatus, Self::Error> {
        Box::pin(self.fetch_import_status(task_id))
    }

    fn create_volume<'a>(
        &'a self,
        request: &'a MaterializeRequest,
    ) -> BackendFuture<'a, ProviderVolume, Self::Error> {
        Box::pin(async move {
            let session = self.session().await?;
            let spec = TagSpecification::builder()
                .resource_type(ResourceType::Volume)
                .set_tags(Some(
                    request
                        .tags
                        .iter()
                        .map(|tag| Ec2Tag::builder().key(&tag.key).value(&tag.value).build())
                        .collect(),
                ))
                .build();
            let output = session
                .ec2
                .create_volume()
                .snapshot_id(&request.snapshot_id)
                .availability_zone(&request.availability_zone)
                .tag_specifications(spec)
                .send()
                .await
                .map_err(|err| AwsBackendError::api("CreateVolume", &err))?;
            Ok(ProviderVolume {
                id: output.volume_id().unwrap_or_default().to_owned(),
                state: output
                    .state()
                    .map(|state| state.as_str().to_owned())
                    .unwrap_or_default(),
                size_bytes: size_bytes(output.size()),
                created_at: created_at(output.create_time()),
                availability_zone: output.availability_zone().map(str::to_owned),
                tags: tags(output.tags()),
                attachments: attachments(output.attachments()),
            })
        })
    }

    fn describe_volumes(&self) -> BackendFuture<'_, Vec<ProviderVolume>, Self::Error> {
        Box::pin(async move {
            let session = self.session().await?;
            let mut pages = session
                .ec2
                .describe_volumes()
                .into_paginator()
                .items()
                .send();
            let mut volumes = Vec::new();
            while let Some(item) = pages.next().await {
                let volume = item.map_err(|err| AwsBackendError::api("DescribeVolumes", &err))?;
                volumes.push(from_volume(&volume));
            }
            Ok(volumes)
        })
    }

    fn delete_volume<'a>(&'a self, volume_id: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let session = self.session().await?;
            session
                .ec2
                .delete_volume()
                .volume_id(volume_id)
                .send()
                .await
                .map_err(|err| AwsBackendError::api("DeleteVolume", &err))?;
            Ok(())
        })
    }

    fn attach_volume<'a>(
        &'a self,
        request: &'a AttachmentRequest,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let session = self.session().await?;
            session
                .ec2
                .attach_volume()
                .device(request.device.as_str())
                .instance_id(&request.instance_id)
                .volume_id(&request.volume_id)
                .send()
                .await
                .map_err(|err| AwsBackendError::api("AttachVolume", &err))?;
            Ok(())
        })
    }

    fn detach_volume<'a>(
        &'a self,
        request: &'a AttachmentRequest,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let session = self.session().await?;
            session
                .ec2
                .detach_volume()
                .device(request.device.as_str())
                .instance_id(&request.instance_id)
                .volume_id(&request.volume_id)
                .send()
                .await
                .map_err(|err| AwsBackendError::api("DetachVolume", &err))?;
            Ok(())
        })
    }
}
