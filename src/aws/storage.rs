//! S3 staging of local images.

use aws_sdk_s3::primitives::ByteStream;
use tracing::debug;

use super::{AwsBackend, AwsBackendError};
use crate::backend::{BackendFuture, ObjectStore};
use crate::import::StagedArtifact;

impl ObjectStore for AwsBackend {
    fn upload<'a>(&'a self, artifact: &'a StagedArtifact) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let session = self.session().await?;
            let body = ByteStream::from_path(artifact.local_path.as_std_path())
                .await
                .map_err(|err| AwsBackendError::Io {
                    path: artifact.local_path.to_string(),
                    message: err.to_string(),
                })?;
            session
                .s3
                .put_object()
                .bucket(&artifact.bucket)
                .key(&artifact.key)
                .body(body)
                .send()
                .await
                .map_err(|err| AwsBackendError::api("PutObject", &err))?;
            debug!(bucket = %artifact.bucket, key = %artifact.key, "object uploaded");
            Ok(())
        })
    }

    fn remove<'a>(&'a self, bucket: &'a str, key: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let session = self.session().await?;
            session
                .s3
                .delete_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|err| AwsBackendError::api("DeleteObject", &err))?;
            Ok(())
        })
    }
}
