use crate::config::StorageConfig;
use crate::object_storage::{ObjectStorage, StorageError};
use bytes::Bytes;
use chrono::Utc;
use futures::future::try_join_all;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::RngCore;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

/// Characters left as-is inside an object name path segment
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Errors surfaced by uploads
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Image upload failed: {0}")]
    Image(#[source] StorageError),

    #[error("Image batch upload failed: {0}")]
    Batch(#[source] StorageError),
}

/// An uploaded file as received from the client
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// File name on the client, used for its extension
    pub original_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(
        original_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            original_name: original_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Stores images in the upload bucket and hands out browser-reachable URLs
pub struct UploadService {
    storage: Arc<dyn ObjectStorage>,
    config: StorageConfig,
}

impl UploadService {
    pub fn new(storage: Arc<dyn ObjectStorage>, config: StorageConfig) -> Self {
        Self { storage, config }
    }

    /// Folder used when the caller does not name one
    pub fn default_folder(&self) -> &str {
        &self.config.default_folder
    }

    /// Whether the bucket is reachable and present
    pub async fn bucket_ready(&self) -> Result<bool, StorageError> {
        self.storage.bucket_exists().await
    }

    /// Create the bucket unless it is already there
    pub async fn ensure_bucket_exists(&self) -> Result<(), StorageError> {
        if self.storage.bucket_exists().await? {
            return Ok(());
        }

        match self.storage.create_bucket().await {
            Ok(()) => {
                info!(bucket = %self.config.bucket, "Bucket created");
                Ok(())
            }
            Err(StorageError::BucketAlreadyOwned(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Public URL for an object name
    pub fn build_file_url(&self, object_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url(),
            self.config.bucket,
            encode_object_name(object_name)
        )
    }

    /// Recover the object name from a URL built by [`build_file_url`](Self::build_file_url)
    pub fn extract_public_id(&self, url: &str) -> Option<String> {
        let segment = format!("/{}/", self.config.bucket);
        let prefix = format!("{}{}", self.base_url(), segment);

        let rest = match url.strip_prefix(&prefix) {
            Some(rest) => rest,
            None => {
                let index = url.find(&segment)?;
                &url[index + segment.len()..]
            }
        };

        percent_decode_str(rest)
            .decode_utf8()
            .ok()
            .map(|name| name.into_owned())
    }

    /// Upload one image and return its URL
    #[instrument(skip(self, file), fields(file = %file.original_name, size_bytes = file.size()))]
    pub async fn upload_image(&self, file: &UploadFile, folder: &str) -> Result<String, UploadError> {
        self.ensure_bucket_exists()
            .await
            .map_err(UploadError::Image)?;

        self.store(file, folder).await.map_err(UploadError::Image)
    }

    /// Upload several images concurrently. The first failure fails the whole
    /// batch; objects stored before it are left in place.
    #[instrument(skip(self, files), fields(count = files.len()))]
    pub async fn upload_multiple_images(
        &self,
        files: &[UploadFile],
        folder: &str,
    ) -> Result<Vec<String>, UploadError> {
        self.ensure_bucket_exists()
            .await
            .map_err(UploadError::Batch)?;

        try_join_all(files.iter().map(|file| self.store(file, folder)))
            .await
            .map_err(UploadError::Batch)
    }

    /// Delete the object behind a URL. Failures are logged only.
    #[instrument(skip(self))]
    pub async fn delete_image(&self, public_id: &str) {
        let Some(object_name) = self.extract_public_id(public_id) else {
            debug!("URL does not point into the upload bucket");
            return;
        };

        let result = match self.ensure_bucket_exists().await {
            Ok(()) => self.storage.remove_object(&object_name).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => info!(object = %object_name, "Image deleted"),
            Err(e) => error!(error = %e, object = %object_name, "Failed to delete image"),
        }
    }

    async fn store(&self, file: &UploadFile, folder: &str) -> Result<String, StorageError> {
        let object_name = build_object_name(folder, &file.original_name);

        let result = self
            .storage
            .put_object(&object_name, file.data.clone(), &file.content_type)
            .await;

        match result {
            Ok(()) => {
                metrics::counter!("casadin_uploads_total", "outcome" => "ok").increment(1);
                metrics::counter!("casadin_upload_bytes_total").increment(file.size() as u64);
                debug!(object = %object_name, "Image uploaded");
                Ok(self.build_file_url(&object_name))
            }
            Err(e) => {
                metrics::counter!("casadin_uploads_total", "outcome" => "error").increment(1);
                Err(e)
            }
        }
    }

    /// Scheme, host and port (or public URL) that browsers use
    fn base_url(&self) -> String {
        let in_container = self.config.endpoint == self.config.container_host;

        if let Some(public_url) = self.config.public_url.as_deref() {
            if !public_url.is_empty() && !in_container {
                return public_url.trim_end_matches('/').to_string();
            }
        }

        let protocol = if self.config.use_ssl { "https" } else { "http" };
        let host = if in_container {
            &self.config.browser_host
        } else {
            &self.config.endpoint
        };
        format!("{}://{}:{}", protocol, host, self.config.port)
    }
}

/// Generate `{folder}/{millis}-{16 hex chars}{extension}` for a file
pub fn build_object_name(folder: &str, original_name: &str) -> String {
    let folder = folder.trim_matches('/');
    let extension = Path::new(original_name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let mut token = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut token);

    format!(
        "{}/{}-{}{}",
        folder,
        Utc::now().timestamp_millis(),
        hex::encode(token),
        extension
    )
}

fn encode_object_name(object_name: &str) -> String {
    object_name
        .split('/')
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}
