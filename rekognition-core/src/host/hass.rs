//! Home Assistant REST API client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use super::{EventBus, FrameSource, StateSink};
use crate::config::HassSettings;
use crate::error::{RekognitionError, Result};
use crate::state::EntityState;

/// Default timeout for REST calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Home Assistant instance reached over its REST API with a long-lived token.
///
/// One client serves as frame source (camera proxy), event bus and state
/// sink for every entity of a platform.
pub struct HassClient {
    client: Client,
    base_url: String,
    token: Zeroizing<String>,
}

impl HassClient {
    pub fn new(settings: &HassSettings) -> Result<Self> {
        Self::with_timeout(settings, DEFAULT_TIMEOUT)
    }

    #[instrument(level = "debug", skip_all, fields(url = %settings.url, timeout_ms = timeout.as_millis() as u64))]
    pub fn with_timeout(settings: &HassSettings, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            warn!(error = %e, "Failed to create HTTP client");
            RekognitionError::Config(format!("failed to create Home Assistant client: {e}"))
        })?;

        info!("Home Assistant client created");
        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<StatusCode> {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(self.token.as_str())
            .json(body)
            .send()
            .await?;
        Ok(response.status())
    }
}

/// Body of `POST /api/states/<entity_id>`.
///
/// Home Assistant keeps the unit and friendly name among the attributes.
fn state_payload(state: &EntityState) -> Result<Value> {
    let mut attributes = serde_json::to_value(&state.attributes)?;
    if let Value::Object(map) = &mut attributes {
        map.insert(
            "unit_of_measurement".into(),
            Value::from(state.unit_of_measurement),
        );
        map.insert(
            "friendly_name".into(),
            Value::from(state.friendly_name.clone()),
        );
    }
    Ok(json!({
        "state": state.count.to_string(),
        "attributes": attributes,
    }))
}

#[async_trait]
impl FrameSource for HassClient {
    #[instrument(level = "debug", skip(self))]
    async fn latest_frame(&self, camera_entity: &str) -> Result<Vec<u8>> {
        let start = Instant::now();
        let url = self.endpoint(&format!("camera_proxy/{camera_entity}"));

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token.as_str())
            .send()
            .await
            .map_err(|e| {
                RekognitionError::SourceUnavailable(format!("{camera_entity}: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RekognitionError::SourceUnavailable(format!(
                "{camera_entity}: camera proxy returned {status}"
            )));
        }

        let bytes = response.bytes().await.map_err(|e| {
            RekognitionError::SourceUnavailable(format!("{camera_entity}: {e}"))
        })?;
        if bytes.is_empty() {
            return Err(RekognitionError::SourceUnavailable(format!(
                "{camera_entity}: empty frame"
            )));
        }

        debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            bytes = bytes.len(),
            "Fetched camera frame"
        );
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl EventBus for HassClient {
    #[instrument(level = "debug", skip(self, payload))]
    async fn publish(&self, event_type: &str, payload: &Value) -> Result<()> {
        let status = self.post_json(&format!("events/{event_type}"), payload).await?;
        if !status.is_success() {
            return Err(RekognitionError::Service(format!(
                "firing {event_type} returned {status}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StateSink for HassClient {
    #[instrument(level = "debug", skip(self, state), fields(count = state.count))]
    async fn update(&self, entity_id: &str, state: &EntityState) -> Result<()> {
        let body = state_payload(state)?;
        let status = self.post_json(&format!("states/{entity_id}"), &body).await?;
        if !status.is_success() {
            return Err(RekognitionError::Service(format!(
                "updating {entity_id} returned {status}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(url: &str) -> HassSettings {
        HassSettings {
            url: url.into(),
            token: Zeroizing::new("token".into()),
        }
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = HassClient::new(&settings("http://hass.local:8123/")).unwrap();
        assert_eq!(
            client.endpoint("camera_proxy/camera.front_door"),
            "http://hass.local:8123/api/camera_proxy/camera.front_door"
        );
    }

    #[test]
    fn test_state_payload_carries_unit_and_name() {
        let state = EntityState::initial_face(
            "image_processing.rekognition_face_front_door",
            "rekognition_face_front_door",
            "homeassistant_faces",
            90.0,
        );
        let body = state_payload(&state).unwrap();
        assert_eq!(body["state"], "0");
        assert_eq!(body["attributes"]["unit_of_measurement"], "faces");
        assert_eq!(
            body["attributes"]["friendly_name"],
            "rekognition_face_front_door"
        );
        assert_eq!(body["attributes"]["matches"], json!([]));
    }

    #[tokio::test]
    async fn test_unreachable_camera_is_source_unavailable() {
        let client = HassClient::with_timeout(
            &settings("http://127.0.0.1:9"),
            Duration::from_millis(500),
        )
        .unwrap();
        let err = client.latest_frame("camera.front_door").await.unwrap_err();
        assert!(matches!(err, RekognitionError::SourceUnavailable(_)));
    }
}
