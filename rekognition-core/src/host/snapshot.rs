//! Frame sources that work without Home Assistant.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use super::FrameSource;
use crate::error::{RekognitionError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches frames from a camera's still-image URL.
pub struct SnapshotUrlSource {
    client: Client,
    url: String,
}

impl SnapshotUrlSource {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| RekognitionError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl FrameSource for SnapshotUrlSource {
    #[instrument(level = "debug", skip(self), fields(url = %self.url))]
    async fn latest_frame(&self, camera_entity: &str) -> Result<Vec<u8>> {
        let unavailable =
            |e: reqwest::Error| RekognitionError::SourceUnavailable(format!("{camera_entity}: {e}"));

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?;
        let bytes = response.bytes().await.map_err(unavailable)?;

        if bytes.is_empty() {
            return Err(RekognitionError::SourceUnavailable(format!(
                "{camera_entity}: empty snapshot"
            )));
        }
        debug!(bytes = bytes.len(), "Fetched snapshot");
        Ok(bytes.to_vec())
    }
}

/// Reads the frame from a file on every scan.
pub struct FileFrameSource {
    path: PathBuf,
}

impl FileFrameSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FrameSource for FileFrameSource {
    async fn latest_frame(&self, camera_entity: &str) -> Result<Vec<u8>> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            RekognitionError::SourceUnavailable(format!(
                "{camera_entity}: cannot read {}: {e}",
                self.path.display()
            ))
        })?;
        if bytes.is_empty() {
            return Err(RekognitionError::SourceUnavailable(format!(
                "{camera_entity}: {} is empty",
                self.path.display()
            )));
        }
        Ok(bytes)
    }
}
