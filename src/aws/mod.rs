//! AWS backend: S3 for staging and EC2 for snapshot import and volumes.

mod error;
mod snapshot;
mod storage;
mod volumes;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_ec2::error::DisplayErrorContext;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::backend::{Backend, BackendFuture};
use crate::config::VolportConfig;

pub use error::{AwsBackendError, classify};
pub use snapshot::map_import_status;

/// Connection settings for [`AwsBackend`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AwsSettings {
    /// Region hosting the bucket and volumes.
    pub region: String,
    /// Named credentials profile.
    pub profile: Option<String>,
    /// Endpoint override applied to both clients.
    pub endpoint_url: Option<String>,
}

impl From<&VolportConfig> for AwsSettings {
    fn from(config: &VolportConfig) -> Self {
        let non_blank = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_owned)
        };
        Self {
            region: config.region.trim().to_owned(),
            profile: non_blank(&config.profile),
            endpoint_url: non_blank(&config.endpoint_url),
        }
    }
}

#[derive(Debug)]
struct AwsSession {
    ec2: aws_sdk_ec2::Client,
    s3: aws_sdk_s3::Client,
}

/// Backend that talks to S3 and EC2.
///
/// The SDK configuration and clients are built on first use and shared by
/// every later call.
#[derive(Debug)]
pub struct AwsBackend {
    settings: AwsSettings,
    session: OnceCell<AwsSession>,
}

impl AwsBackend {
    /// Creates a backend; no network traffic happens until the first call.
    ///
    /// # Errors
    ///
    /// Returns [`AwsBackendError::Config`] when the region is blank.
    pub fn new(settings: AwsSettings) -> Result<Self, AwsBackendError> {
        if settings.region.trim().is_empty() {
            return Err(AwsBackendError::Config(String::from(
                "AWS region must not be empty",
            )));
        }
        Ok(Self {
            settings,
            session: OnceCell::new(),
        })
    }

    async fn session(&self) -> Result<&AwsSession, AwsBackendError> {
        self.session
            .get_or_try_init(|| Self::open_session(&self.settings))
            .await
    }

    async fn load_sdk_config(settings: &AwsSettings) -> SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));
        if let Some(profile) = &settings.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(endpoint) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        loader.load().await
    }

    async fn open_session(settings: &AwsSettings) -> Result<AwsSession, AwsBackendError> {
        let shared = Self::load_sdk_config(settings).await;
        let provider = shared.credentials_provider().ok_or_else(|| {
            AwsBackendError::Credentials(String::from("no credentials provider configured"))
        })?;
        provider
            .provide_credentials()
            .await
            .map_err(|err| AwsBackendError::Credentials(DisplayErrorContext(&err).to_string()))?;

        let mut s3_config = aws_sdk_s3::config::Builder::from(&shared);
        if settings.endpoint_url.is_some() {
            s3_config = s3_config.force_path_style(true);
        }
        debug!(region = %settings.region, "AWS session established");
        Ok(AwsSession {
            ec2: aws_sdk_ec2::Client::new(&shared),
            s3: aws_sdk_s3::Client::from_conf(s3_config.build()),
        })
    }
}

impl Backend for AwsBackend {
    type Error = AwsBackendError;

    fn connect(&self) -> BackendFuture<'_, (), Self::Error> {
        Box::pin(async move { self.session().await.map(|_| ()) })
    }
}
