use crate::config::StorageConfig;
use anyhow::Result;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info, instrument};

const DEFAULT_REGION: &str = "us-east-1";

/// Errors returned by the object storage backend
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Bucket {0} already exists and is owned by you")]
    BucketAlreadyOwned(String),

    #[error("{operation} failed: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },
}

impl StorageError {
    pub(crate) fn request(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Request {
            operation,
            message: message.into(),
        }
    }
}

/// Bucket-scoped object storage operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn bucket_exists(&self) -> Result<bool, StorageError>;

    async fn create_bucket(&self) -> Result<(), StorageError>;

    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError>;

    async fn remove_object(&self, key: &str) -> Result<(), StorageError>;
}

/// S3 client pointed at MinIO or any S3-compatible endpoint
pub struct S3ObjectStorage {
    client: S3Client,
    bucket: String,
    region: Option<String>,
}

impl S3ObjectStorage {
    /// Create a new S3 client from the storage configuration
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        let region = config
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.clone()));

        if !config.access_key.is_empty() {
            loader = loader.credentials_provider(Credentials::new(
                config.access_key.clone(),
                config.secret_key.clone(),
                None,
                None,
                "casadin-storage",
            ));
        }

        let aws_config = loader.load().await;

        // MinIO only serves path-style requests
        let s3_config = S3ConfigBuilder::from(&aws_config)
            .endpoint_url(endpoint_url(config))
            .force_path_style(true)
            .build();
        let client = S3Client::from_conf(s3_config);

        info!(
            bucket = %config.bucket,
            endpoint = %endpoint_url(config),
            region = %region,
            "Object storage client initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
        })
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn bucket_exists(&self) -> Result<bool, StorageError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                    || e.raw_response()
                        .map(|r| r.status().as_u16() == 404)
                        .unwrap_or(false);

                if not_found {
                    Ok(false)
                } else {
                    Err(StorageError::request(
                        "HeadBucket",
                        DisplayErrorContext(&e).to_string(),
                    ))
                }
            }
        }
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn create_bucket(&self) -> Result<(), StorageError> {
        let mut request = self.client.create_bucket().bucket(&self.bucket);

        if let Some(region) = self.region.as_deref().filter(|r| *r != DEFAULT_REGION) {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let message = DisplayErrorContext(&e).to_string();
                // Some S3-compatible servers only report this in the message
                let owned = e
                    .as_service_error()
                    .map(|e| e.is_bucket_already_owned_by_you())
                    .unwrap_or(false)
                    || message.contains("already own it");

                if owned {
                    Err(StorageError::BucketAlreadyOwned(self.bucket.clone()))
                } else {
                    Err(StorageError::request("CreateBucket", message))
                }
            }
        }
    }

    #[instrument(skip(self, body), fields(size_bytes = body.len()))]
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let size = body.len() as i64;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_length(size)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::request("PutObject", DisplayErrorContext(&e).to_string()))?;

        debug!(key = %key, "Object stored");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_object(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                StorageError::request("DeleteObject", DisplayErrorContext(&e).to_string())
            })?;

        debug!(key = %key, "Object removed");
        Ok(())
    }
}

/// Endpoint the backend itself talks to, e.g. `http://minio:9000`
pub fn endpoint_url(config: &StorageConfig) -> String {
    let protocol = if config.use_ssl { "https" } else { "http" };
    format!("{}://{}:{}", protocol, config.endpoint, config.port)
}
