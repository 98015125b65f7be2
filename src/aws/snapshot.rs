//! EC2 snapshot import requests and status mapping.

use aws_sdk_ec2::types::{SnapshotDiskContainer, UserBucket};

use super::{AwsBackend, AwsBackendError};
use crate::import::ImportStatus;

const DISK_FORMAT: &str = "raw";
const STATUS_COMPLETED: &str = "completed";
const STATUS_DELETING: &str = "deleting";
const STATUS_DELETED: &str = "deleted";

/// Maps an import task's status fields onto an [`ImportStatus`].
///
/// `completed` without a snapshot id counts as a failure; `deleting` and
/// `deleted` are failures carrying the provider message; anything else is
/// still running.
#[must_use]
pub fn map_import_status(
    status: Option<&str>,
    status_message: Option<&str>,
    snapshot_id: Option<&str>,
    progress: Option<&str>,
) -> ImportStatus {
    let cause = || {
        status_message
            .filter(|message| !message.trim().is_empty())
            .map_or_else(
                || format!("import task ended in state {}", status.unwrap_or("unknown")),
                str::to_owned,
            )
    };
    match status {
        Some(STATUS_COMPLETED) => snapshot_id.filter(|id| !id.is_empty()).map_or_else(
            || ImportStatus::Failed {
                cause: String::from("import completed without a snapshot id"),
            },
            |id| ImportStatus::Completed {
                snapshot_id: id.to_owned(),
            },
        ),
        Some(STATUS_DELETING | STATUS_DELETED) => ImportStatus::Failed { cause: cause() },
        _ => ImportStatus::Pending {
            progress: progress.map(str::to_owned),
        },
    }
}

impl AwsBackend {
    pub(super) async fn submit_import(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<String, AwsBackendError> {
        let session = self.session().await?;
        let container = SnapshotDiskContainer::builder()
            .format(DISK_FORMAT)
            .user_bucket(UserBucket::builder().s3_bucket(bucket).s3_key(key).build())
            .build();
        let output = session
            .ec2
            .import_snapshot()
            .description(format!("volport import of s3://{bucket}/{key}"))
            .disk_container(container)
            .send()
            .await
            .map_err(|err| AwsBackendError::api("ImportSnapshot", &err))?;
        output
            .import_task_id()
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .ok_or(AwsBackendError::MissingField {
                operation: "ImportSnapshot",
                field: "ImportTaskId",
            })
    }

    pub(super) async fn fetch_import_status(
        &self,
        task_id: &str,
    ) -> Result<ImportStatus, AwsBackendError> {
        let session = self.session().await?;
        let output = session
            .ec2
            .describe_import_snapshot_tasks()
            .import_task_ids(task_id)
            .send()
            .await
            .map_err(|err| AwsBackendError::api("DescribeImportSnapshotTasks", &err))?;
        let detail = output
            .import_snapshot_tasks()
            .first()
            .and_then(|task| task.snapshot_task_detail())
            .ok_or(AwsBackendError::MissingField {
                operation: "DescribeImportSnapshotTasks",
                field: "SnapshotTaskDetail",
            })?;
        Ok(map_import_status(
            detail.status(),
            detail.status_message(),
            detail.snapshot_id(),
            detail.progress(),
        ))
    }
}
