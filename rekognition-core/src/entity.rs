//! The image-processing entity.
//!
//! A scan runs strictly in order: fetch frame, call the service, filter and
//! count matches, draw overlays, update state, save, fire events. A frame or
//! service failure aborts the scan before the state is touched, so a failed
//! scan leaves the entity exactly as it was.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local};
use image::RgbImage;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::client::{round2, FaceMatch, FaceSearch, RekognitionApi};
use crate::config::TargetConfig;
use crate::draw::{Annotator, MATCH_COLOR};
use crate::error::Result;
use crate::geometry::{in_roi, BoundingBox, Roi};
use crate::host::{EventBus, FrameSource, StateSink};
use crate::persist::{ImageStore, SaveReport};
use crate::state::{
    Attributes, EntityState, FaceAttributes, FaceRecognisedEvent, LabelSummary,
    ObjectAttributes, ObjectDetectedEvent, EVENT_FACE_RECOGNISED, EVENT_OBJECT_DETECTED,
};

/// What the entity asks the service for.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    Faces(FaceSearch),
    Objects(Vec<TargetConfig>),
}

/// Static description of one entity.
#[derive(Debug, Clone)]
pub struct EntityConfig {
    /// `image_processing.<slug>`
    pub entity_id: String,
    pub name: String,
    /// Camera entity the frames come from.
    pub camera_entity: String,
    pub detection: Detection,
    pub roi: Option<Roi>,
    pub show_boxes: bool,
}

impl EntityConfig {
    /// The part of the entity id after the domain; names the saved files.
    pub fn object_id(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map_or(self.entity_id.as_str(), |(_, id)| id)
    }
}

/// Host endpoints an entity talks to.
#[derive(Clone)]
pub struct EntityHost {
    pub frames: Arc<dyn FrameSource>,
    pub events: Arc<dyn EventBus>,
    pub states: Arc<dyn StateSink>,
}

/// Outcome of a successful scan.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub entity_id: String,
    pub count: usize,
    pub events_fired: usize,
    pub saved: SaveReport,
    pub timestamp: String,
}

struct Evaluation {
    count: usize,
    /// Boxes to draw in the match color with their captions.
    boxes: Vec<(BoundingBox, String)>,
    attributes: Attributes,
    events: Vec<(&'static str, serde_json::Value)>,
}

/// One camera bound to Rekognition.
pub struct RekognitionEntity {
    config: EntityConfig,
    client: Arc<dyn RekognitionApi>,
    host: EntityHost,
    annotator: Arc<Annotator>,
    store: ImageStore,
    state: EntityState,
    last_image: Option<RgbImage>,
}

impl RekognitionEntity {
    pub fn new(
        config: EntityConfig,
        client: Arc<dyn RekognitionApi>,
        host: EntityHost,
        annotator: Arc<Annotator>,
        store: ImageStore,
    ) -> Self {
        let state = match &config.detection {
            Detection::Faces(search) => EntityState::initial_face(
                &config.entity_id,
                &config.name,
                &search.collection_id,
                search.similarity_threshold,
            ),
            Detection::Objects(targets) => {
                EntityState::initial_object(&config.entity_id, &config.name, targets.clone())
            }
        };
        Self {
            config,
            client,
            host,
            annotator,
            store,
            state,
            last_image: None,
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.config.entity_id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn camera_entity(&self) -> &str {
        &self.config.camera_entity
    }

    pub fn state(&self) -> &EntityState {
        &self.state
    }

    /// Annotated frame of the last successful scan.
    pub fn last_image(&self) -> Option<&RgbImage> {
        self.last_image.as_ref()
    }

    /// Scan the latest frame now.
    pub async fn scan(&mut self) -> Result<ScanReport> {
        self.scan_at(Local::now().fixed_offset()).await
    }

    /// Scan the latest frame, stamping results with `now`.
    #[instrument(level = "info", skip(self, now), fields(entity_id = %self.config.entity_id))]
    pub async fn scan_at(&mut self, now: DateTime<FixedOffset>) -> Result<ScanReport> {
        let frame = self
            .host
            .frames
            .latest_frame(&self.config.camera_entity)
            .await
            .map_err(|e| {
                warn!(camera = %self.config.camera_entity, error = %e, "No frame, scan skipped");
                e
            })?;

        let decoded = image::load_from_memory(&frame).map_err(|e| {
            warn!(camera = %self.config.camera_entity, error = %e, "Undecodable frame, scan skipped");
            e
        })?;

        let timestamp = now.to_rfc3339();
        let evaluation = match &self.config.detection {
            Detection::Faces(search) => self.evaluate_faces(&frame, search, &timestamp).await,
            Detection::Objects(targets) => {
                self.evaluate_objects(&frame, targets, &timestamp).await
            }
        }
        .map_err(|e| {
            warn!(backend = self.client.backend(), error = %e, "Rekognition call failed, state unchanged");
            e
        })?;

        let mut image = decoded.to_rgb8();
        if let Some(roi) = &self.config.roi {
            self.annotator.draw_roi(&mut image, roi);
        }
        if self.config.show_boxes {
            for (bbox, caption) in &evaluation.boxes {
                self.annotator
                    .draw_box(&mut image, bbox, MATCH_COLOR, Some(caption.as_str()));
            }
        }

        self.state.count = evaluation.count;
        self.state.attributes = evaluation.attributes;
        if let Err(e) = self
            .host
            .states
            .update(&self.config.entity_id, &self.state)
            .await
        {
            warn!(error = %e, "Failed to publish entity state");
        }

        let saved = self.store.save(&image, &now, evaluation.count).await;
        self.last_image = Some(image);

        let mut events_fired = 0;
        for (event_type, payload) in &evaluation.events {
            match self.host.events.publish(event_type, payload).await {
                Ok(()) => {
                    events_fired += 1;
                    debug!(event_type, "Fired event");
                }
                Err(e) => warn!(event_type, error = %e, "Failed to fire event"),
            }
        }

        info!(count = evaluation.count, events_fired, "Scan complete");
        Ok(ScanReport {
            entity_id: self.config.entity_id.clone(),
            count: evaluation.count,
            events_fired,
            saved,
            timestamp,
        })
    }

    async fn evaluate_faces(
        &self,
        frame: &[u8],
        search: &FaceSearch,
        timestamp: &str,
    ) -> Result<Evaluation> {
        let found = self.client.search_faces(frame, search).await?;
        let total = found.len();

        let matches: Vec<FaceMatch> = found
            .into_iter()
            .filter(|m| m.similarity >= search.similarity_threshold)
            .filter(|m| in_roi(&m.bounding_box, self.config.roi.as_ref()))
            .map(|m| m.rounded())
            .collect();
        debug!(total, qualifying = matches.len(), "Evaluated face matches");

        let count = matches.len();
        let boxes = matches
            .iter()
            .map(|m| (m.bounding_box, m.caption()))
            .collect();

        let mut events = Vec::with_capacity(count);
        for m in &matches {
            let event = FaceRecognisedEvent::new(m, &self.config.entity_id, timestamp);
            events.push((EVENT_FACE_RECOGNISED, to_payload(&event)?));
        }

        Ok(Evaluation {
            count,
            boxes,
            attributes: Attributes::Face(FaceAttributes {
                collection_id: search.collection_id.clone(),
                similarity_threshold: search.similarity_threshold,
                matches,
                last_face_recognition: self.next_last_detection(count, timestamp),
            }),
            events,
        })
    }

    async fn evaluate_objects(
        &self,
        frame: &[u8],
        targets: &[TargetConfig],
        timestamp: &str,
    ) -> Result<Evaluation> {
        let min_confidence = targets
            .iter()
            .map(|t| t.confidence)
            .fold(100.0_f32, f32::min);
        let labels = self.client.detect_labels(frame, min_confidence).await?;

        let mut summary: BTreeMap<String, usize> =
            targets.iter().map(|t| (t.target.clone(), 0)).collect();
        let mut boxes = Vec::new();

        for label in &labels {
            let name = label.name.to_lowercase();
            let Some(target) = targets.iter().find(|t| t.target == name) else {
                continue;
            };
            for instance in &label.instances {
                if instance.confidence < target.confidence
                    || !in_roi(&instance.bounding_box, self.config.roi.as_ref())
                {
                    continue;
                }
                *summary.entry(target.target.clone()).or_default() += 1;
                boxes.push((
                    instance.bounding_box,
                    format!("{name}: {:.1}%", instance.confidence),
                ));
            }
        }

        let count = boxes.len();
        debug!(labels = labels.len(), count, "Evaluated labels");

        let mut events = Vec::new();
        if count > 0 {
            let event = ObjectDetectedEvent {
                entity_id: self.config.entity_id.clone(),
                count,
                summary: summary.clone(),
                timestamp: timestamp.to_string(),
            };
            events.push((EVENT_OBJECT_DETECTED, to_payload(&event)?));
        }

        Ok(Evaluation {
            count,
            boxes,
            attributes: Attributes::Object(ObjectAttributes {
                targets: targets.to_vec(),
                summary,
                labels: labels
                    .iter()
                    .map(|l| LabelSummary {
                        name: l.name.clone(),
                        confidence: round2(l.confidence),
                    })
                    .collect(),
                last_detection: self.next_last_detection(count, timestamp),
            }),
            events,
        })
    }

    /// The last detection moves forward only on scans that counted something.
    fn next_last_detection(&self, count: usize, timestamp: &str) -> Option<String> {
        if count > 0 {
            Some(timestamp.to_string())
        } else {
            self.state.last_detection().map(str::to_string)
        }
    }
}

fn to_payload<T: Serialize>(event: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(event)?)
}
