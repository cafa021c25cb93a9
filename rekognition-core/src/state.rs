//! Displayed entity state and the events published after a scan.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::client::FaceMatch;
use crate::config::TargetConfig;
use crate::geometry::BoundingBox;

/// Fired once per qualifying face match.
pub const EVENT_FACE_RECOGNISED: &str = "rekognition.face_recognised";

/// Fired once per object-mode scan that counted at least one target.
pub const EVENT_OBJECT_DETECTED: &str = "rekognition.object_detected";

pub const FACE_UNIT: &str = "faces";
pub const OBJECT_UNIT: &str = "targets";

/// State of one image-processing entity as shown by the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    pub entity_id: String,
    pub friendly_name: String,
    /// Number of qualifying matches; the displayed state value.
    pub count: usize,
    pub unit_of_measurement: &'static str,
    pub attributes: Attributes,
}

/// Mode-specific attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Attributes {
    Face(FaceAttributes),
    Object(ObjectAttributes),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceAttributes {
    pub collection_id: String,
    pub similarity_threshold: f32,
    /// Qualifying matches of the most recent successful scan.
    pub matches: Vec<FaceMatch>,
    /// ISO-8601 time of the last scan with at least one match.
    pub last_face_recognition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectAttributes {
    pub targets: Vec<TargetConfig>,
    /// Qualifying count per configured target.
    pub summary: BTreeMap<String, usize>,
    /// Every label the service returned for the last frame.
    pub labels: Vec<LabelSummary>,
    pub last_detection: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelSummary {
    pub name: String,
    pub confidence: f32,
}

impl EntityState {
    /// Initial face-mode state: nothing recognized yet.
    pub fn initial_face(
        entity_id: impl Into<String>,
        friendly_name: impl Into<String>,
        collection_id: impl Into<String>,
        similarity_threshold: f32,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            friendly_name: friendly_name.into(),
            count: 0,
            unit_of_measurement: FACE_UNIT,
            attributes: Attributes::Face(FaceAttributes {
                collection_id: collection_id.into(),
                similarity_threshold,
                matches: Vec::new(),
                last_face_recognition: None,
            }),
        }
    }

    /// Initial object-mode state.
    pub fn initial_object(
        entity_id: impl Into<String>,
        friendly_name: impl Into<String>,
        targets: Vec<TargetConfig>,
    ) -> Self {
        let summary = targets.iter().map(|t| (t.target.clone(), 0)).collect();
        Self {
            entity_id: entity_id.into(),
            friendly_name: friendly_name.into(),
            count: 0,
            unit_of_measurement: OBJECT_UNIT,
            attributes: Attributes::Object(ObjectAttributes {
                targets,
                summary,
                labels: Vec::new(),
                last_detection: None,
            }),
        }
    }

    /// Face matches of the last scan; empty in object mode.
    pub fn matches(&self) -> &[FaceMatch] {
        match &self.attributes {
            Attributes::Face(face) => &face.matches,
            Attributes::Object(_) => &[],
        }
    }

    /// Time of the last scan that counted anything.
    pub fn last_detection(&self) -> Option<&str> {
        match &self.attributes {
            Attributes::Face(face) => face.last_face_recognition.as_deref(),
            Attributes::Object(object) => object.last_detection.as_deref(),
        }
    }
}

/// Payload of [`EVENT_FACE_RECOGNISED`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceRecognisedEvent {
    pub external_image_id: Option<String>,
    pub face_id: String,
    pub similarity: f32,
    pub bounding_box: BoundingBox,
    pub entity_id: String,
    pub timestamp: String,
}

impl FaceRecognisedEvent {
    pub fn new(face: &FaceMatch, entity_id: &str, timestamp: &str) -> Self {
        Self {
            external_image_id: face.external_image_id.clone(),
            face_id: face.face_id.clone(),
            similarity: face.similarity,
            bounding_box: face.bounding_box,
            entity_id: entity_id.to_string(),
            timestamp: timestamp.to_string(),
        }
    }
}

/// Payload of [`EVENT_OBJECT_DETECTED`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectDetectedEvent {
    pub entity_id: String,
    pub count: usize,
    pub summary: BTreeMap<String, usize>,
    pub timestamp: String,
}
