//! Mock Rekognition client for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{DetectedLabel, FaceMatch, FaceSearch, RekognitionApi};
use crate::error::{RekognitionError, Result};

#[derive(Default)]
struct Script {
    faces: Vec<FaceMatch>,
    labels: Vec<DetectedLabel>,
    failure: Option<String>,
}

/// Scripted Rekognition client.
/// WARNING: Do not use in production - it never looks at the image!
///
/// Every call returns the currently scripted faces/labels (or failure), so a
/// test can change the script between two scans.
#[derive(Default)]
pub struct MockRekognition {
    script: Mutex<Script>,
    calls: AtomicUsize,
}

impl MockRekognition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock that answers every face search with `faces`.
    pub fn with_faces(faces: Vec<FaceMatch>) -> Self {
        let mock = Self::new();
        mock.set_faces(faces);
        mock
    }

    /// Mock that answers every label request with `labels`.
    pub fn with_labels(labels: Vec<DetectedLabel>) -> Self {
        let mock = Self::new();
        mock.set_labels(labels);
        mock
    }

    /// Mock whose every call fails with a service error.
    pub fn failing(message: impl Into<String>) -> Self {
        let mock = Self::new();
        mock.fail_with(message);
        mock
    }

    pub fn set_faces(&self, faces: Vec<FaceMatch>) {
        self.with_script(|script| script.faces = faces);
    }

    pub fn set_labels(&self, labels: Vec<DetectedLabel>) {
        self.with_script(|script| script.labels = labels);
    }

    pub fn fail_with(&self, message: impl Into<String>) {
        let message = message.into();
        self.with_script(|script| script.failure = Some(message));
    }

    pub fn clear_failure(&self) {
        self.with_script(|script| script.failure = None);
    }

    /// Number of remote calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn with_script(&self, f: impl FnOnce(&mut Script)) {
        let mut guard = match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }

    fn respond<T>(&self, pick: impl FnOnce(&Script) -> T) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let guard = self
            .script
            .lock()
            .map_err(|_| RekognitionError::Service("mock script lock poisoned".into()))?;
        match &guard.failure {
            Some(message) => Err(RekognitionError::Service(message.clone())),
            None => Ok(pick(&guard)),
        }
    }
}

#[async_trait]
impl RekognitionApi for MockRekognition {
    async fn search_faces(&self, _image: &[u8], search: &FaceSearch) -> Result<Vec<FaceMatch>> {
        self.respond(|script| {
            script
                .faces
                .iter()
                .take(search.max_faces as usize)
                .cloned()
                .collect()
        })
    }

    async fn detect_labels(&self, _image: &[u8], min_confidence: f32) -> Result<Vec<DetectedLabel>> {
        self.respond(|script| {
            script
                .labels
                .iter()
                .filter(|label| label.confidence >= min_confidence)
                .cloned()
                .collect()
        })
    }

    fn backend(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    fn face(id: &str, similarity: f32) -> FaceMatch {
        FaceMatch {
            external_image_id: Some(id.into()),
            face_id: format!("face-{id}"),
            similarity,
            bounding_box: BoundingBox::new(0.1, 0.1, 0.3, 0.3),
        }
    }

    fn search(max_faces: u32) -> FaceSearch {
        FaceSearch {
            collection_id: "test".into(),
            similarity_threshold: 90.0,
            max_faces,
        }
    }

    #[tokio::test]
    async fn test_mock_returns_scripted_faces() {
        let mock = MockRekognition::with_faces(vec![face("a", 95.0), face("b", 92.0)]);
        let faces = mock.search_faces(b"img", &search(3)).await.unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_respects_max_faces() {
        let mock = MockRekognition::with_faces(vec![face("a", 95.0), face("b", 92.0)]);
        let faces = mock.search_faces(b"img", &search(1)).await.unwrap();
        assert_eq!(faces.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_failure_and_recovery() {
        let mock = MockRekognition::failing("throttled");
        let err = mock.search_faces(b"img", &search(3)).await.unwrap_err();
        assert!(matches!(err, RekognitionError::Service(_)));

        mock.clear_failure();
        assert!(mock.search_faces(b"img", &search(3)).await.is_ok());
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_label_confidence_filter() {
        let mock = MockRekognition::with_labels(vec![
            DetectedLabel {
                name: "Person".into(),
                confidence: 99.0,
                instances: vec![],
            },
            DetectedLabel {
                name: "Tree".into(),
                confidence: 40.0,
                instances: vec![],
            },
        ]);
        let labels = mock.detect_labels(b"img", 50.0).await.unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].name, "Person");
    }
}
