//! Error types for the AWS backend.

use std::error::Error as StdError;

use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata};
use thiserror::Error;

use crate::backend::{ProviderError, ProviderErrorKind};

/// Errors raised by the AWS backend.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AwsBackendError {
    /// Raised when the backend configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when no usable credentials can be resolved.
    #[error("failed to resolve AWS credentials: {0}")]
    Credentials(String),
    /// Raised when a local file cannot be streamed to S3.
    #[error("failed to read {path}: {message}")]
    Io {
        /// Local file path.
        path: String,
        /// Underlying error string.
        message: String,
    },
    /// Wrapper for service-level failures.
    #[error("{operation} failed: {message}")]
    Api {
        /// API operation name.
        operation: &'static str,
        /// Service error code, when reported.
        code: Option<String>,
        /// Service error message or rendered transport error.
        message: String,
        /// Classification derived from the code and message.
        kind: ProviderErrorKind,
    },
    /// Raised when a response lacks a field the workflow relies on.
    #[error("{operation} response is missing {field}")]
    MissingField {
        /// API operation name.
        operation: &'static str,
        /// Missing field.
        field: &'static str,
    },
}

impl AwsBackendError {
    /// Builds an [`AwsBackendError::Api`] from an SDK error, classifying it
    /// by its service error code.
    pub(crate) fn api<E>(operation: &'static str, err: &E) -> Self
    where
        E: ProvideErrorMetadata + StdError,
    {
        let code = err.code().map(str::to_owned);
        let message = err.message().map_or_else(
            || DisplayErrorContext(err).to_string(),
            |message| match &code {
                Some(code) => format!("{code}: {message}"),
                None => message.to_owned(),
            },
        );
        let kind = classify(code.as_deref(), &message);
        Self::Api {
            operation,
            code,
            message,
            kind,
        }
    }
}

/// Classifies an EC2 or S3 error by code and message.
///
/// Occupied attachment points are reported as `InvalidParameterValue`, so the
/// message is inspected as well as the code.
#[must_use]
pub fn classify(code: Option<&str>, message: &str) -> ProviderErrorKind {
    match code {
        Some("VolumeInUse" | "IncorrectState") => ProviderErrorKind::Conflict,
        Some("NoSuchKey" | "NoSuchBucket") => ProviderErrorKind::NotFound,
        Some(other) if other.ends_with(".NotFound") => ProviderErrorKind::NotFound,
        _ if message.to_ascii_lowercase().contains("already in use") => {
            ProviderErrorKind::Conflict
        }
        _ => ProviderErrorKind::Other,
    }
}

impl ProviderError for AwsBackendError {
    fn kind(&self) -> ProviderErrorKind {
        match self {
            Self::Api { kind, .. } => *kind,
            Self::Config(_)
            | Self::Credentials(_)
            | Self::Io { .. }
            | Self::MissingField { .. } => ProviderErrorKind::Other,
        }
    }
}
