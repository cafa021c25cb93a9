//! Persistence of processed frames.
//!
//! Writes a fixed "latest" file per entity, optionally a timestamped copy,
//! and optionally uploads the timestamped copy to an object-storage bucket.
//! Saving is best-effort: every failure is logged and reported in the
//! returned [`SaveReport`], never propagated to the scan.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::config::{SaveFormat, SaveSettings};
use crate::error::{RekognitionError, Result};

/// Local-time format embedded in timestamped file names.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H.%M.%S";

/// Object-storage upload.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;
}

#[cfg(feature = "aws")]
pub use s3::S3ObjectStore;

#[cfg(feature = "aws")]
mod s3 {
    use async_trait::async_trait;
    use aws_config::SdkConfig;
    use aws_sdk_s3::error::DisplayErrorContext;
    use aws_sdk_s3::primitives::ByteStream;
    use aws_sdk_s3::Client;
    use tracing::instrument;

    use super::ObjectStore;
    use crate::error::{RekognitionError, Result};

    /// Amazon S3 bucket upload.
    pub struct S3ObjectStore {
        client: Client,
    }

    impl S3ObjectStore {
        pub fn new(sdk_config: &SdkConfig) -> Self {
            Self {
                client: Client::new(sdk_config),
            }
        }
    }

    #[async_trait]
    impl ObjectStore for S3ObjectStore {
        #[instrument(level = "debug", skip(self, bytes), fields(bytes = bytes.len()))]
        async fn put(
            &self,
            bucket: &str,
            key: &str,
            bytes: Vec<u8>,
            content_type: &str,
        ) -> Result<()> {
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .content_type(content_type)
                .body(ByteStream::from(bytes))
                .send()
                .await
                .map_err(|e| RekognitionError::Persistence(DisplayErrorContext(&e).to_string()))?;
            Ok(())
        }
    }
}

/// In-memory bucket for tests and dry runs.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    failure: Option<String>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose every upload fails.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock().get(&(bucket.to_string(), key.to_string())).cloned()
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, key)| key.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<(String, String), Vec<u8>>> {
        match self.objects.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        if let Some(message) = &self.failure {
            return Err(RekognitionError::Persistence(message.clone()));
        }
        self.lock()
            .insert((bucket.to_string(), key.to_string()), bytes);
        Ok(())
    }
}

/// What a save actually did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveReport {
    pub latest: Option<PathBuf>,
    pub timestamped: Option<PathBuf>,
    /// Object key uploaded to the bucket.
    pub uploaded: Option<String>,
    /// Failures that were logged and swallowed.
    pub errors: Vec<String>,
}

impl SaveReport {
    pub fn is_empty(&self) -> bool {
        self.latest.is_none() && self.timestamped.is_none() && self.uploaded.is_none()
    }
}

/// Saves the processed frames of one entity.
pub struct ImageStore {
    settings: SaveSettings,
    object_id: String,
    objects: Option<Arc<dyn ObjectStore>>,
}

impl ImageStore {
    /// `object_id` prefixes every file name; `objects` receives bucket uploads.
    pub fn new(
        settings: SaveSettings,
        object_id: impl Into<String>,
        objects: Option<Arc<dyn ObjectStore>>,
    ) -> Self {
        if settings.s3_bucket.is_some() && objects.is_none() {
            warn!("s3_bucket configured without an object store, uploads disabled");
        }
        Self {
            settings,
            object_id: object_id.into(),
            objects,
        }
    }

    pub fn enabled(&self) -> bool {
        self.settings.folder.is_some()
    }

    /// A scan saves when a folder is set and it counted something, or when
    /// the latest file is kept for every scan.
    pub fn should_save(&self, count: usize) -> bool {
        self.enabled() && (count > 0 || self.settings.always_save_latest)
    }

    pub fn latest_path(&self) -> Option<PathBuf> {
        self.settings.folder.as_ref().map(|folder| {
            folder.join(format!(
                "{}_latest.{}",
                self.object_id,
                self.settings.format.extension()
            ))
        })
    }

    pub fn timestamped_name(&self, now: &DateTime<FixedOffset>) -> String {
        format!(
            "{}_{}.{}",
            self.object_id,
            now.format(TIMESTAMP_FORMAT),
            self.settings.format.extension()
        )
    }

    /// Save `image` for a scan at `now` that counted `count` matches.
    pub async fn save(
        &self,
        image: &RgbImage,
        now: &DateTime<FixedOffset>,
        count: usize,
    ) -> SaveReport {
        let mut report = SaveReport::default();
        let (Some(folder), Some(latest)) = (&self.settings.folder, self.latest_path()) else {
            return report;
        };
        if !self.should_save(count) {
            return report;
        }

        let bytes = match encode(image, self.settings.format) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to encode processed image");
                report.errors.push(e.to_string());
                return report;
            }
        };

        match tokio::fs::write(&latest, &bytes).await {
            Ok(()) => {
                info!(path = %latest.display(), "Saved latest image");
                report.latest = Some(latest);
            }
            Err(e) => {
                warn!(path = %latest.display(), error = %e, "Failed to save latest image");
                report.errors.push(format!("{}: {e}", latest.display()));
            }
        }

        if !self.settings.timestamped || count == 0 {
            return report;
        }

        let name = self.timestamped_name(now);
        let path = folder.join(&name);
        match tokio::fs::write(&path, &bytes).await {
            Ok(()) => {
                info!(path = %path.display(), "Saved timestamped image");
                report.timestamped = Some(path);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to save timestamped image");
                report.errors.push(format!("{}: {e}", path.display()));
            }
        }

        if let (Some(bucket), Some(objects)) = (&self.settings.s3_bucket, &self.objects) {
            match objects
                .put(bucket, &name, bytes, self.settings.format.content_type())
                .await
            {
                Ok(()) => {
                    info!(bucket = %bucket, key = %name, "Uploaded image");
                    report.uploaded = Some(name);
                }
                Err(e) => {
                    warn!(bucket = %bucket, key = %name, error = %e, "Failed to upload image");
                    report.errors.push(e.to_string());
                }
            }
        }

        debug!(errors = report.errors.len(), "Save finished");
        report
    }
}

/// Encode a frame in the configured format.
pub fn encode(image: &RgbImage, format: SaveFormat) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format.image_format())?;
    Ok(buf.into_inner())
}
