//! AWS SDK backed Rekognition client.

use std::time::Instant;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_rekognition::config::Credentials;
use aws_sdk_rekognition::error::{DisplayErrorContext, SdkError};
use aws_sdk_rekognition::operation::search_faces_by_image::SearchFacesByImageError;
use aws_sdk_rekognition::primitives::Blob;
use aws_sdk_rekognition::types::{self, Image};
use aws_sdk_rekognition::Client;
use tracing::{debug, info, instrument, warn};

use super::{DetectedLabel, FaceMatch, FaceSearch, LabelInstance, RekognitionApi};
use crate::config::AwsSettings;
use crate::error::{RekognitionError, Result};
use crate::geometry::BoundingBox;

const CREDENTIALS_PROVIDER_NAME: &str = "rekognition-config";

/// Build the shared SDK configuration.
///
/// Static credentials are used when the configuration carries them; otherwise
/// the default AWS provider chain (environment, profile, instance role) applies.
pub async fn load_sdk_config(settings: &AwsSettings) -> SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(settings.region.clone()));

    if let Some(credentials) = &settings.credentials {
        loader = loader.credentials_provider(Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.as_str(),
            None,
            None,
            CREDENTIALS_PROVIDER_NAME,
        ));
    } else {
        debug!("No static AWS credentials configured, using default provider chain");
    }

    loader.load().await
}

/// Rekognition client over the official AWS SDK.
pub struct AwsRekognition {
    client: Client,
}

impl AwsRekognition {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        info!(
            region = sdk_config.region().map(|r| r.as_ref()).unwrap_or("unset"),
            "AWS Rekognition client created"
        );
        Self {
            client: Client::new(sdk_config),
        }
    }
}

fn image_payload(image: &[u8]) -> Image {
    Image::builder().bytes(Blob::new(image.to_vec())).build()
}

fn to_bbox(bbox: &types::BoundingBox) -> Option<BoundingBox> {
    Some(BoundingBox {
        width: bbox.width()?,
        height: bbox.height()?,
        left: bbox.left()?,
        top: bbox.top()?,
    })
}

/// The service reports "no face in the frame" as an invalid parameter.
fn is_no_face_error(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("no faces in the image") || message.contains("there are no faces")
}

/// A missing collection is a configuration problem and an empty frame is an
/// empty result; everything else is a service failure.
fn map_search_error<R>(
    err: SdkError<SearchFacesByImageError, R>,
    collection_id: &str,
) -> Result<Vec<FaceMatch>>
where
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let context = DisplayErrorContext(&err).to_string();
    match err.into_service_error() {
        SearchFacesByImageError::ResourceNotFoundException(_) => Err(RekognitionError::Config(
            format!("face collection '{collection_id}' does not exist: {context}"),
        )),
        SearchFacesByImageError::InvalidParameterException(e)
            if e.message().is_some_and(is_no_face_error) =>
        {
            Ok(Vec::new())
        }
        _ => Err(RekognitionError::Service(context)),
    }
}

fn to_face_match(
    raw: &types::FaceMatch,
    searched_box: Option<BoundingBox>,
) -> Option<FaceMatch> {
    let Some(similarity) = raw.similarity() else {
        warn!("Dropping face match without similarity");
        return None;
    };
    let Some(face) = raw.face() else {
        warn!("Dropping face match without face record");
        return None;
    };
    let Some(face_id) = face.face_id() else {
        warn!("Dropping face match without face id");
        return None;
    };
    // The searched face locates the match in this frame; the indexed face box
    // refers to the image the face was indexed from.
    let Some(bounding_box) = searched_box.or_else(|| face.bounding_box().and_then(to_bbox)) else {
        warn!(face_id, "Dropping face match without bounding box");
        return None;
    };

    Some(FaceMatch {
        external_image_id: face.external_image_id().map(str::to_string),
        face_id: face_id.to_string(),
        similarity,
        bounding_box,
    })
}

fn to_label(raw: &types::Label) -> Option<DetectedLabel> {
    let (Some(name), Some(confidence)) = (raw.name(), raw.confidence()) else {
        warn!("Dropping label without name or confidence");
        return None;
    };
    let instances = raw
        .instances()
        .iter()
        .filter_map(|instance| {
            Some(LabelInstance {
                confidence: instance.confidence()?,
                bounding_box: instance.bounding_box().and_then(to_bbox)?,
            })
        })
        .collect();

    Some(DetectedLabel {
        name: name.to_string(),
        confidence,
        instances,
    })
}

#[async_trait]
impl RekognitionApi for AwsRekognition {
    #[instrument(
        level = "debug",
        skip(self, image),
        fields(collection_id = %search.collection_id, bytes = image.len())
    )]
    async fn search_faces(&self, image: &[u8], search: &FaceSearch) -> Result<Vec<FaceMatch>> {
        let start = Instant::now();

        let result = self
            .client
            .search_faces_by_image()
            .collection_id(&search.collection_id)
            .image(image_payload(image))
            .face_match_threshold(search.similarity_threshold)
            .max_faces(search.max_faces as i32)
            .send()
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                let mapped = map_search_error(err, &search.collection_id);
                match &mapped {
                    Ok(_) => debug!(latency_ms, "No faces in the image"),
                    Err(e) => warn!(latency_ms, error = %e, "SearchFacesByImage failed"),
                }
                return mapped;
            }
        };

        let searched_box = output.searched_face_bounding_box().and_then(to_bbox);
        let matches: Vec<FaceMatch> = output
            .face_matches()
            .iter()
            .filter_map(|raw| to_face_match(raw, searched_box))
            .collect();

        debug!(latency_ms, matches = matches.len(), "SearchFacesByImage succeeded");
        Ok(matches)
    }

    #[instrument(level = "debug", skip(self, image), fields(bytes = image.len()))]
    async fn detect_labels(&self, image: &[u8], min_confidence: f32) -> Result<Vec<DetectedLabel>> {
        let start = Instant::now();

        let output = self
            .client
            .detect_labels()
            .image(image_payload(image))
            .min_confidence(min_confidence)
            .send()
            .await
            .map_err(|err| {
                let context = DisplayErrorContext(&err).to_string();
                warn!(error = %context, "DetectLabels failed");
                RekognitionError::Service(context)
            })?;

        let labels: Vec<DetectedLabel> = output.labels().iter().filter_map(to_label).collect();

        debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            labels = labels.len(),
            "DetectLabels succeeded"
        );
        Ok(labels)
    }

    fn backend(&self) -> &'static str {
        "aws"
    }
}
