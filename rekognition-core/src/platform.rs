//! Platform setup: one configuration in, one entity per camera source out.

use std::sync::Arc;

use tracing::{debug, info};

use crate::client::{FaceSearch, RekognitionApi};
use crate::config::{PlatformConfig, ScanMode, SourceConfig};
use crate::draw::Annotator;
use crate::entity::{Detection, EntityConfig, EntityHost, RekognitionEntity};
use crate::error::{RekognitionError, Result};
use crate::host::{
    EventBus, FrameSource, HassClient, MemoryEventBus, MemoryStateSink, SnapshotUrlSource,
    StateSink,
};
use crate::persist::{ImageStore, ObjectStore};

/// Entity id domain of every entity this platform creates.
pub const ENTITY_DOMAIN: &str = "image_processing";

/// Remote services shared by every entity of a platform.
#[derive(Clone)]
pub struct Services {
    pub client: Arc<dyn RekognitionApi>,
    /// Bucket uploads; only needed when `s3_bucket` is configured.
    pub objects: Option<Arc<dyn ObjectStore>>,
}

impl Services {
    pub fn new(client: Arc<dyn RekognitionApi>) -> Self {
        Self {
            client,
            objects: None,
        }
    }

    pub fn with_objects(mut self, objects: Arc<dyn ObjectStore>) -> Self {
        self.objects = Some(objects);
        self
    }

    /// Rekognition and S3 clients sharing one SDK configuration.
    #[cfg(feature = "aws")]
    pub async fn aws(config: &PlatformConfig) -> Self {
        use crate::client::{load_sdk_config, AwsRekognition};
        use crate::persist::S3ObjectStore;

        let sdk_config = load_sdk_config(&config.aws).await;
        let objects = config
            .save
            .s3_bucket
            .as_ref()
            .map(|_| Arc::new(S3ObjectStore::new(&sdk_config)) as Arc<dyn ObjectStore>);
        Self {
            client: Arc::new(AwsRekognition::new(&sdk_config)),
            objects,
        }
    }
}

/// Host endpoints shared by every entity of a platform.
#[derive(Clone)]
pub struct Host {
    /// Frame source for cameras without a `snapshot_url`.
    pub frames: Option<Arc<dyn FrameSource>>,
    pub events: Arc<dyn EventBus>,
    pub states: Arc<dyn StateSink>,
}

impl Host {
    pub fn new(
        frames: Option<Arc<dyn FrameSource>>,
        events: Arc<dyn EventBus>,
        states: Arc<dyn StateSink>,
    ) -> Self {
        Self {
            frames,
            events,
            states,
        }
    }

    /// Home Assistant when `[hass]` is configured; otherwise events and state
    /// stay in memory and only `snapshot_url` cameras can be scanned.
    pub fn from_config(config: &PlatformConfig) -> Result<Self> {
        match &config.hass {
            Some(settings) => {
                let hass = Arc::new(HassClient::new(settings)?);
                Ok(Self::new(Some(hass.clone()), hass.clone(), hass))
            }
            None => {
                debug!("No Home Assistant connection configured, using in-memory host");
                Ok(Self::new(
                    None,
                    Arc::new(MemoryEventBus::new()),
                    Arc::new(MemoryStateSink::new()),
                ))
            }
        }
    }
}

/// Build one entity per configured camera source.
///
/// The Rekognition client, object store, label font and host are shared.
pub fn setup_platform(
    config: &PlatformConfig,
    services: &Services,
    host: &Host,
) -> Result<Vec<RekognitionEntity>> {
    let annotator = Arc::new(match &config.label_font {
        Some(path) => Annotator::with_font_file(path)?,
        None => {
            if config.show_boxes {
                info!("No label_font configured, match boxes are drawn without captions");
            }
            Annotator::new()
        }
    });

    let mut entities = Vec::with_capacity(config.sources.len());
    for source in &config.sources {
        let entity_config = entity_config(config, source);
        if entities
            .iter()
            .any(|e: &RekognitionEntity| e.entity_id() == entity_config.entity_id)
        {
            return Err(RekognitionError::Config(format!(
                "duplicate entity id {}",
                entity_config.entity_id
            )));
        }

        let frames = frame_source(source, host)?;
        let store = ImageStore::new(
            config.save.clone(),
            entity_config.object_id(),
            services.objects.clone(),
        );
        let entity_host = EntityHost {
            frames,
            events: host.events.clone(),
            states: host.states.clone(),
        };

        info!(
            entity_id = %entity_config.entity_id,
            camera = %source.entity_id,
            backend = services.client.backend(),
            "Entity created"
        );
        entities.push(RekognitionEntity::new(
            entity_config,
            services.client.clone(),
            entity_host,
            annotator.clone(),
            store,
        ));
    }

    Ok(entities)
}

fn frame_source(source: &SourceConfig, host: &Host) -> Result<Arc<dyn FrameSource>> {
    if let Some(url) = &source.snapshot_url {
        return Ok(Arc::new(SnapshotUrlSource::new(url.clone())?));
    }
    host.frames.clone().ok_or_else(|| {
        RekognitionError::Config(format!(
            "{} has no snapshot_url and no Home Assistant connection is configured",
            source.entity_id
        ))
    })
}

/// Static description of the entity built for `source`.
pub fn entity_config(config: &PlatformConfig, source: &SourceConfig) -> EntityConfig {
    let name = entity_name(config.mode, source);
    let detection = match config.mode {
        ScanMode::Face => Detection::Faces(FaceSearch {
            collection_id: config.collection_id.clone().unwrap_or_default(),
            similarity_threshold: config.similarity_threshold,
            max_faces: config.max_faces,
        }),
        ScanMode::Object => Detection::Objects(config.targets.clone()),
    };
    EntityConfig {
        entity_id: format!("{ENTITY_DOMAIN}.{}", slugify(&name)),
        name,
        camera_entity: source.entity_id.clone(),
        detection,
        roi: config.roi.clone(),
        show_boxes: config.show_boxes,
    }
}

/// Configured name, or one derived from the camera.
pub fn entity_name(mode: ScanMode, source: &SourceConfig) -> String {
    if let Some(name) = source.name.as_deref().filter(|n| !n.trim().is_empty()) {
        return name.to_string();
    }
    match mode {
        ScanMode::Face => format!("rekognition_face_{}", source.camera_object_id()),
        ScanMode::Object => format!("rekognition_{}", source.camera_object_id()),
    }
}

/// Lowercase, with every run of other characters collapsed to `_`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug.to_string()
    }
}
