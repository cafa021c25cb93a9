//! Amazon Rekognition client adapter.
//!
//! The adapter turns raw frame bytes into validated, structured records:
//! face matches against a collection, or semantic labels for the whole frame.
//! It never retries; a failed call is reported once to the caller.
//!
//! - `AwsRekognition` - the AWS SDK backed client (feature `aws`)
//! - `MockRekognition` - scripted responses for tests and dry runs

#[cfg(feature = "aws")]
mod aws;
mod mock;

#[cfg(feature = "aws")]
pub use aws::{load_sdk_config, AwsRekognition};
pub use mock::MockRekognition;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geometry::BoundingBox;

/// Parameters of a face search against a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceSearch {
    pub collection_id: String,
    /// Minimum similarity (0-100) the service should report.
    pub similarity_threshold: f32,
    pub max_faces: u32,
}

/// One face in the frame recognized against the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceMatch {
    /// Label attached when the face was indexed; `None` if it was indexed without one.
    pub external_image_id: Option<String>,
    pub face_id: String,
    pub similarity: f32,
    pub bounding_box: BoundingBox,
}

impl FaceMatch {
    /// Copy with the similarity rounded to two decimals for display.
    pub fn rounded(&self) -> Self {
        Self {
            similarity: round2(self.similarity),
            ..self.clone()
        }
    }

    /// Text drawn next to the face box.
    pub fn caption(&self) -> String {
        format!(
            "{}: {:.1}%",
            self.external_image_id.as_deref().unwrap_or("unknown"),
            self.similarity
        )
    }
}

/// A semantic label for the whole frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedLabel {
    pub name: String,
    pub confidence: f32,
    /// Localized occurrences; empty for scene-level labels.
    pub instances: Vec<LabelInstance>,
}

/// One localized occurrence of a label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelInstance {
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

/// Remote recognition service.
///
/// Implementations must be thread-safe (`Send + Sync`); a single client handle
/// is shared read-only by every entity created from one configuration.
#[async_trait]
pub trait RekognitionApi: Send + Sync {
    /// Search the collection for faces in `image`.
    ///
    /// A frame without any face yields an empty list, not an error.
    async fn search_faces(&self, image: &[u8], search: &FaceSearch) -> Result<Vec<FaceMatch>>;

    /// Detect labels in `image` with at least `min_confidence`.
    async fn detect_labels(&self, image: &[u8], min_confidence: f32) -> Result<Vec<DetectedLabel>>;

    /// Backend identifier for logs.
    fn backend(&self) -> &'static str;
}

pub(crate) fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}
