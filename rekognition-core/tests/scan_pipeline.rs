//! Full scans against the scripted client and the in-memory host.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, TimeZone};
use image::{Rgb, RgbImage};
use rekognition_core::draw::{MATCH_COLOR, ROI_COLOR};
use rekognition_core::host::{MemoryEventBus, MemoryFrameSource, MemoryStateSink};
use rekognition_core::persist::encode;
use rekognition_core::{
    setup_platform, BoundingBox, DetectedLabel, FaceMatch, Host, LabelInstance,
    MemoryObjectStore, MockRekognition, PlatformConfig, RekognitionEntity, RekognitionError,
    SaveFormat, Services, EVENT_FACE_RECOGNISED, EVENT_OBJECT_DETECTED,
};

const CAMERA: &str = "camera.front_door";
const ENTITY_ID: &str = "image_processing.rekognition_face_front_door";

struct Harness {
    entity: RekognitionEntity,
    client: Arc<MockRekognition>,
    frames: Arc<MemoryFrameSource>,
    events: Arc<MemoryEventBus>,
    states: Arc<MemoryStateSink>,
}

fn harness(toml: &str, client: MockRekognition) -> Harness {
    harness_with_objects(toml, client, None)
}

fn harness_with_objects(
    toml: &str,
    client: MockRekognition,
    objects: Option<Arc<MemoryObjectStore>>,
) -> Harness {
    let config = PlatformConfig::from_toml_str(toml).expect("valid config");
    let client = Arc::new(client);
    let frames = Arc::new(MemoryFrameSource::new());
    let events = Arc::new(MemoryEventBus::new());
    let states = Arc::new(MemoryStateSink::new());

    let mut services = Services::new(client.clone());
    if let Some(objects) = objects {
        services = services.with_objects(objects);
    }
    let host = Host::new(Some(frames.clone()), events.clone(), states.clone());

    let mut entities = setup_platform(&config, &services, &host).expect("platform setup");
    assert_eq!(entities.len(), 1);
    Harness {
        entity: entities.remove(0),
        client,
        frames,
        events,
        states,
    }
}

fn face_config(extra: &str) -> String {
    format!(
        r#"
collection_id = "homeassistant_faces"
similarity_threshold = 90
{extra}

[[source]]
entity_id = "{CAMERA}"
"#
    )
}

fn frame(shade: u8) -> Vec<u8> {
    let image = RgbImage::from_pixel(64, 48, Rgb([shade, shade, shade]));
    encode(&image, SaveFormat::Png).expect("encode frame")
}

fn at(secs: i64) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(3600)
        .unwrap()
        .with_ymd_and_hms(2024, 5, 17, 14, 3, 0)
        .unwrap()
        + Duration::seconds(secs)
}

fn person1() -> FaceMatch {
    FaceMatch {
        external_image_id: Some("person1".into()),
        face_id: "38271d79-7bc2-5efb-b752-398a8d575b85".into(),
        similarity: 98.4,
        bounding_box: BoundingBox::new(0.2069, 0.1751, 0.6149, 0.6904),
    }
}

fn face(id: &str, similarity: f32) -> FaceMatch {
    FaceMatch {
        external_image_id: Some(id.into()),
        face_id: format!("face-{id}"),
        similarity,
        bounding_box: BoundingBox::new(0.1, 0.1, 0.2, 0.2),
    }
}

#[tokio::test]
async fn test_single_known_face() {
    let mut h = harness(&face_config(""), MockRekognition::with_faces(vec![person1()]));
    h.frames.set_frame(CAMERA, frame(40));

    let report = h.entity.scan_at(at(9)).await.unwrap();
    assert_eq!(report.count, 1);
    assert_eq!(report.events_fired, 1);
    assert_eq!(report.timestamp, "2024-05-17T14:03:09+01:00");

    let state = h.entity.state();
    assert_eq!(state.entity_id, ENTITY_ID);
    assert_eq!(state.count, 1);
    let matches = state.matches();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].external_image_id.as_deref(), Some("person1"));
    assert_eq!(matches[0].similarity, 98.4);
    assert_eq!(
        matches[0].bounding_box,
        BoundingBox::new(0.2069, 0.1751, 0.6149, 0.6904)
    );
    assert_eq!(state.last_detection(), Some("2024-05-17T14:03:09+01:00"));

    let events = h.events.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.event_type, EVENT_FACE_RECOGNISED);
    assert_eq!(event.payload["external_image_id"], "person1");
    assert_eq!(event.payload["face_id"], "38271d79-7bc2-5efb-b752-398a8d575b85");
    assert_eq!(event.payload["entity_id"], ENTITY_ID);
    assert_eq!(event.payload["timestamp"], "2024-05-17T14:03:09+01:00");
    assert_eq!(event.payload["similarity"].as_f64().unwrap() as f32, 98.4);
    let bbox: BoundingBox = serde_json::from_value(event.payload["bounding_box"].clone()).unwrap();
    assert_eq!(bbox, matches[0].bounding_box);

    assert_eq!(h.states.get(ENTITY_ID).as_ref(), Some(state));
}

#[tokio::test]
async fn test_no_frame_keeps_initial_state() {
    let mut h = harness(&face_config(""), MockRekognition::with_faces(vec![person1()]));

    let err = h.entity.scan_at(at(0)).await.unwrap_err();
    assert!(matches!(err, RekognitionError::SourceUnavailable(_)));

    let state = h.entity.state();
    assert_eq!(state.count, 0);
    assert!(state.matches().is_empty());
    assert!(state.last_detection().is_none());
    assert!(h.events.events().is_empty());
    assert_eq!(h.client.calls(), 0);
    assert_eq!(h.states.updates(), 0);
}

#[tokio::test]
async fn test_service_error_leaves_state_untouched() {
    let mut h = harness(&face_config(""), MockRekognition::with_faces(vec![person1()]));
    h.frames.set_frame(CAMERA, frame(40));
    h.entity.scan_at(at(0)).await.unwrap();

    let before = h.entity.state().clone();
    let before_json = serde_json::to_string(&before).unwrap();
    let events_before = h.events.events().len();

    h.client.fail_with("ThrottlingException: Rate exceeded");
    let err = h.entity.scan_at(at(5)).await.unwrap_err();
    assert!(matches!(err, RekognitionError::Service(_)));

    assert_eq!(h.entity.state(), &before);
    assert_eq!(serde_json::to_string(h.entity.state()).unwrap(), before_json);
    assert_eq!(h.events.events().len(), events_before);
    assert_eq!(h.states.updates(), 1);
}

#[tokio::test]
async fn test_undecodable_frame_skips_service_call() {
    let mut h = harness(&face_config(""), MockRekognition::with_faces(vec![person1()]));
    h.frames.set_frame(CAMERA, b"not an image".to_vec());

    let err = h.entity.scan_at(at(0)).await.unwrap_err();
    assert!(matches!(err, RekognitionError::Image(_)));
    assert_eq!(h.client.calls(), 0);
    assert_eq!(h.entity.state().count, 0);
}

#[tokio::test]
async fn test_only_matches_at_or_above_threshold_count() {
    let mut h = harness(
        &face_config(""),
        MockRekognition::with_faces(vec![face("a", 89.99), face("b", 90.0), face("c", 95.5)]),
    );
    h.frames.set_frame(CAMERA, frame(40));

    let report = h.entity.scan_at(at(0)).await.unwrap();
    assert_eq!(report.count, 2);

    let ids: Vec<&str> = h
        .entity
        .state()
        .matches()
        .iter()
        .filter_map(|m| m.external_image_id.as_deref())
        .collect();
    assert_eq!(ids, vec!["b", "c"]);
    assert!(h.entity.state().matches().iter().all(|m| m.similarity >= 90.0));
    assert_eq!(h.events.events_of(EVENT_FACE_RECOGNISED).len(), 2);
}

#[tokio::test]
async fn test_similarity_rounded_to_two_decimals() {
    let mut h = harness(&face_config(""), MockRekognition::with_faces(vec![face("a", 97.456_78)]));
    h.frames.set_frame(CAMERA, frame(40));
    h.entity.scan_at(at(0)).await.unwrap();

    assert_eq!(h.entity.state().matches()[0].similarity, 97.46);
}

#[tokio::test]
async fn test_empty_scan_keeps_previous_last_detection() {
    let mut h = harness(&face_config(""), MockRekognition::with_faces(vec![person1()]));
    h.frames.set_frame(CAMERA, frame(40));
    h.entity.scan_at(at(0)).await.unwrap();

    h.client.set_faces(vec![]);
    let report = h.entity.scan_at(at(30)).await.unwrap();
    assert_eq!(report.count, 0);
    assert_eq!(report.events_fired, 0);
    assert!(h.entity.state().matches().is_empty());
    assert_eq!(
        h.entity.state().last_detection(),
        Some("2024-05-17T14:03:00+01:00")
    );
    assert_eq!(h.events.events().len(), 1);
}

#[tokio::test]
async fn test_boxes_drawn_unless_disabled() {
    let mut h = harness(&face_config(""), MockRekognition::with_faces(vec![person1()]));
    h.frames.set_frame(CAMERA, frame(40));
    h.entity.scan_at(at(0)).await.unwrap();
    // Top-left corner of the match box on a 64x48 frame.
    assert_eq!(*h.entity.last_image().unwrap().get_pixel(13, 8), MATCH_COLOR);

    let mut h = harness(
        &face_config("show_boxes = false"),
        MockRekognition::with_faces(vec![person1()]),
    );
    h.frames.set_frame(CAMERA, frame(40));
    h.entity.scan_at(at(0)).await.unwrap();
    assert_eq!(*h.entity.last_image().unwrap().get_pixel(13, 8), Rgb([40, 40, 40]));
    assert_eq!(h.entity.state().count, 1);
}

#[tokio::test]
async fn test_latest_file_overwritten_each_scan() {
    let dir = tempfile::tempdir().unwrap();
    let extra = format!(
        "save_file_folder = {:?}\nsave_file_format = \"png\"",
        dir.path().display().to_string()
    );
    let mut h = harness(&face_config(&extra), MockRekognition::with_faces(vec![person1()]));
    let latest = dir.path().join("rekognition_face_front_door_latest.png");

    h.frames.set_frame(CAMERA, frame(10));
    let report = h.entity.scan_at(at(0)).await.unwrap();
    assert_eq!(report.saved.latest.as_deref(), Some(latest.as_path()));
    let first = std::fs::read(&latest).unwrap();

    h.frames.set_frame(CAMERA, frame(200));
    h.entity.scan_at(at(1)).await.unwrap();
    let second = std::fs::read(&latest).unwrap();

    assert_ne!(first, second);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_files_named_after_entity_not_camera() {
    let dir = tempfile::tempdir().unwrap();
    let toml = format!(
        r#"
collection_id = "homeassistant_faces"
save_file_folder = {:?}

[[source]]
entity_id = "{CAMERA}"
name = "Door A"

[[source]]
entity_id = "{CAMERA}"
name = "Door B"
"#,
        dir.path().display().to_string()
    );
    let config = PlatformConfig::from_toml_str(&toml).unwrap();
    let frames = Arc::new(MemoryFrameSource::new());
    frames.set_frame(CAMERA, frame(10));
    let host = Host::new(
        Some(frames),
        Arc::new(MemoryEventBus::new()),
        Arc::new(MemoryStateSink::new()),
    );
    let services = Services::new(Arc::new(MockRekognition::with_faces(vec![face(
        "person1", 99.0,
    )])));

    let mut entities = setup_platform(&config, &services, &host).unwrap();
    for entity in &mut entities {
        entity.scan_at(at(0)).await.unwrap();
    }

    assert!(dir.path().join("door_a_latest.jpg").exists());
    assert!(dir.path().join("door_b_latest.jpg").exists());
    assert!(!dir.path().join("front_door_latest.jpg").exists());
}

#[tokio::test]
async fn test_nothing_saved_without_matches_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let extra = format!("save_file_folder = {:?}", dir.path().display().to_string());
    let mut h = harness(&face_config(&extra), MockRekognition::new());
    h.frames.set_frame(CAMERA, frame(10));

    let report = h.entity.scan_at(at(0)).await.unwrap();
    assert!(report.saved.is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_timestamped_files_do_not_collide() {
    let dir = tempfile::tempdir().unwrap();
    let extra = format!(
        "save_file_folder = {:?}\nsave_timestamped_file = true",
        dir.path().display().to_string()
    );
    let mut h = harness(&face_config(&extra), MockRekognition::with_faces(vec![person1()]));
    h.frames.set_frame(CAMERA, frame(10));

    h.entity.scan_at(at(9)).await.unwrap();
    h.entity.scan_at(at(10)).await.unwrap();

    assert!(dir.path().join("rekognition_face_front_door_latest.jpg").exists());
    assert!(dir.path().join("rekognition_face_front_door_2024-05-17_14.03.09.jpg").exists());
    assert!(dir.path().join("rekognition_face_front_door_2024-05-17_14.03.10.jpg").exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
}

#[tokio::test]
async fn test_bucket_upload_uses_timestamped_name() {
    let dir = tempfile::tempdir().unwrap();
    let extra = format!(
        "save_file_folder = {:?}\nsave_timestamped_file = true\ns3_bucket = \"hass-images\"",
        dir.path().display().to_string()
    );
    let bucket = Arc::new(MemoryObjectStore::new());
    let mut h = harness_with_objects(
        &face_config(&extra),
        MockRekognition::with_faces(vec![person1()]),
        Some(bucket.clone()),
    );
    h.frames.set_frame(CAMERA, frame(10));

    let report = h.entity.scan_at(at(9)).await.unwrap();
    let key = "rekognition_face_front_door_2024-05-17_14.03.09.jpg";
    assert_eq!(report.saved.uploaded.as_deref(), Some(key));
    assert_eq!(bucket.keys("hass-images"), vec![key.to_string()]);
    assert_eq!(
        bucket.get("hass-images", key).unwrap(),
        std::fs::read(dir.path().join(key)).unwrap()
    );
}

#[tokio::test]
async fn test_bucket_failure_does_not_abort_scan() {
    let dir = tempfile::tempdir().unwrap();
    let extra = format!(
        "save_file_folder = {:?}\nsave_timestamped_file = true\ns3_bucket = \"hass-images\"",
        dir.path().display().to_string()
    );
    let mut h = harness_with_objects(
        &face_config(&extra),
        MockRekognition::with_faces(vec![person1()]),
        Some(Arc::new(MemoryObjectStore::failing("AccessDenied"))),
    );
    h.frames.set_frame(CAMERA, frame(10));

    let report = h.entity.scan_at(at(9)).await.unwrap();
    assert_eq!(report.count, 1);
    assert_eq!(report.events_fired, 1);
    assert!(report.saved.uploaded.is_none());
    assert_eq!(report.saved.errors.len(), 1);
    assert!(dir.path().join("rekognition_face_front_door_latest.jpg").exists());
    assert!(dir.path().join("rekognition_face_front_door_2024-05-17_14.03.09.jpg").exists());
    assert_eq!(h.entity.state().count, 1);
}

fn label(name: &str, confidence: f32, instances: Vec<(f32, BoundingBox)>) -> DetectedLabel {
    DetectedLabel {
        name: name.into(),
        confidence,
        instances: instances
            .into_iter()
            .map(|(confidence, bounding_box)| LabelInstance {
                confidence,
                bounding_box,
            })
            .collect(),
    }
}

#[tokio::test]
async fn test_object_mode_counts_targets_inside_roi() {
    let toml = r#"
mode = "object"
roi = { x_min = 0.0, y_min = 0.0, x_max = 0.5, y_max = 1.0 }

[[targets]]
target = "person"

[[targets]]
target = "car"
confidence = 80

[[source]]
entity_id = "camera.driveway"
"#;
    let client = MockRekognition::with_labels(vec![
        label(
            "Person",
            99.1,
            vec![
                (99.1, BoundingBox::new(0.1, 0.2, 0.1, 0.3)),
                (97.0, BoundingBox::new(0.7, 0.2, 0.1, 0.3)),
                (55.0, BoundingBox::new(0.2, 0.2, 0.1, 0.3)),
            ],
        ),
        label("Car", 85.0, vec![(85.0, BoundingBox::new(0.0, 0.5, 0.3, 0.3))]),
        label("Tree", 70.0, vec![]),
    ]);
    let mut h = harness(toml, client);
    h.frames.set_frame("camera.driveway", frame(40));

    let report = h.entity.scan_at(at(0)).await.unwrap();
    assert_eq!(report.count, 2);

    let state = serde_json::to_value(h.entity.state()).unwrap();
    assert_eq!(state["entity_id"], "image_processing.rekognition_driveway");
    assert_eq!(state["unit_of_measurement"], "targets");
    assert_eq!(state["attributes"]["summary"]["person"], 1);
    assert_eq!(state["attributes"]["summary"]["car"], 1);
    assert_eq!(state["attributes"]["labels"].as_array().unwrap().len(), 3);
    assert_eq!(
        state["attributes"]["last_detection"],
        "2024-05-17T14:03:00+01:00"
    );

    let events = h.events.events_of(EVENT_OBJECT_DETECTED);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload["count"], 2);
    assert_eq!(events[0].payload["summary"]["person"], 1);
    assert!(h.events.events_of(EVENT_FACE_RECOGNISED).is_empty());

    // ROI outline is drawn along its left edge.
    assert_eq!(*h.entity.last_image().unwrap().get_pixel(0, 5), ROI_COLOR);
}

#[tokio::test]
async fn test_object_mode_without_targets_fires_nothing() {
    let toml = "mode = \"object\"\n[[source]]\nentity_id = \"camera.driveway\"\n";
    let mut h = harness(toml, MockRekognition::with_labels(vec![label("Tree", 90.0, vec![])]));
    h.frames.set_frame("camera.driveway", frame(40));

    let report = h.entity.scan_at(at(0)).await.unwrap();
    assert_eq!(report.count, 0);
    assert!(h.events.events().is_empty());
    assert!(h.entity.state().last_detection().is_none());
}

#[tokio::test]
async fn test_face_mode_roi_filters_matches() {
    let mut h = harness(
        &face_config("roi = { x_min = 0.5, y_min = 0.0, x_max = 1.0, y_max = 1.0 }"),
        MockRekognition::with_faces(vec![person1(), {
            let mut right = face("right", 99.0);
            right.bounding_box = BoundingBox::new(0.7, 0.1, 0.2, 0.2);
            right
        }]),
    );
    h.frames.set_frame(CAMERA, frame(40));

    let report = h.entity.scan_at(at(0)).await.unwrap();
    // person1 is centered at x = 0.51, the second face at x = 0.8.
    assert_eq!(report.count, 2);

    let mut h = harness(
        &face_config("roi = { x_min = 0.6, y_min = 0.0, x_max = 1.0, y_max = 1.0 }"),
        MockRekognition::with_faces(vec![person1()]),
    );
    h.frames.set_frame(CAMERA, frame(40));
    assert_eq!(h.entity.scan_at(at(0)).await.unwrap().count, 0);
}
