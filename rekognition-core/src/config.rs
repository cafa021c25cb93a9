//! Platform configuration.
//!
//! Loaded once at setup from a TOML file whose keys mirror the Home Assistant
//! platform schema, then overridden from the environment and validated.
//! Every failure here is a `Config` error and is fatal to setup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;
use zeroize::Zeroizing;

use crate::error::{RekognitionError, Result};
use crate::geometry::Roi;

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_SIMILARITY: f32 = 90.0;
pub const DEFAULT_MAX_FACES: u32 = 3;
pub const DEFAULT_TARGET: &str = "person";
pub const DEFAULT_TARGET_CONFIDENCE: f32 = 60.0;

/// Regions where Rekognition face search is available.
pub const SUPPORTED_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "ca-central-1",
    "eu-west-1",
    "eu-central-1",
    "eu-west-2",
    "eu-west-3",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-2",
    "ap-northeast-1",
    "ap-south-1",
    "sa-east-1",
];

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "REKOGNITION_CONFIG";

#[derive(Debug, Deserialize, Default)]
struct PlatformConfigFile {
    aws_access_key_id: Option<String>,
    aws_secret_access_key: Option<String>,
    region_name: Option<String>,
    mode: Option<ScanMode>,
    collection_id: Option<String>,
    similarity_threshold: Option<f32>,
    max_faces: Option<u32>,
    targets: Option<Vec<TargetConfig>>,
    roi: Option<Roi>,
    show_boxes: Option<bool>,
    save_file_format: Option<SaveFormat>,
    save_file_folder: Option<PathBuf>,
    save_timestamped_file: Option<bool>,
    always_save_latest_file: Option<bool>,
    s3_bucket: Option<String>,
    label_font: Option<PathBuf>,
    #[serde(default)]
    source: Vec<SourceConfig>,
    hass: Option<HassConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct HassConfigFile {
    url: Option<String>,
    token: Option<String>,
}

/// What a scan asks the service for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Search a face collection (`SearchFacesByImage`).
    #[default]
    Face,
    /// Count configured object targets (`DetectLabels`).
    Object,
}

/// Output image encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveFormat {
    #[default]
    Jpg,
    Png,
}

impl SaveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Jpg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// Object label to count in object mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub target: String,
    #[serde(default = "default_target_confidence")]
    pub confidence: f32,
}

fn default_target_confidence() -> f32 {
    DEFAULT_TARGET_CONFIDENCE
}

/// One camera to build an entity for.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceConfig {
    /// Camera entity id, e.g. `camera.front_door`.
    pub entity_id: String,
    /// Friendly name of the image-processing entity.
    pub name: Option<String>,
    /// Fetch frames from this URL instead of the Home Assistant camera proxy.
    pub snapshot_url: Option<String>,
}

impl SourceConfig {
    /// Object id part of the camera entity id (`front_door` for `camera.front_door`).
    pub fn camera_object_id(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map(|(_, object_id)| object_id)
            .unwrap_or(&self.entity_id)
    }
}

/// Static AWS credentials.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: Zeroizing<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

/// Region plus optional static credentials.
#[derive(Debug, Clone)]
pub struct AwsSettings {
    pub region: String,
    /// `None` means the default AWS provider chain.
    pub credentials: Option<AwsCredentials>,
}

/// Home Assistant REST API endpoint.
#[derive(Clone)]
pub struct HassSettings {
    pub url: String,
    pub token: Zeroizing<String>,
}

impl std::fmt::Debug for HassSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HassSettings")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Where and how processed frames are written.
#[derive(Debug, Clone, Default)]
pub struct SaveSettings {
    pub folder: Option<PathBuf>,
    pub format: SaveFormat,
    pub timestamped: bool,
    pub always_save_latest: bool,
    /// Bucket receiving the timestamped file. Only set together with `timestamped`.
    pub s3_bucket: Option<String>,
}

/// Validated platform configuration.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub aws: AwsSettings,
    pub mode: ScanMode,
    /// Required in face mode.
    pub collection_id: Option<String>,
    /// Clamped to [0, 100].
    pub similarity_threshold: f32,
    pub max_faces: u32,
    pub targets: Vec<TargetConfig>,
    pub roi: Option<Roi>,
    pub show_boxes: bool,
    pub save: SaveSettings,
    /// TTF/OTF font for box captions (`person1: 98.4%`). No font is bundled:
    /// without one, boxes and center markers are drawn uncaptioned.
    pub label_font: Option<PathBuf>,
    pub sources: Vec<SourceConfig>,
    pub hass: Option<HassSettings>,
}

impl PlatformConfig {
    /// Load from the file named by `REKOGNITION_CONFIG`.
    pub fn load_from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).map_err(|_| {
            RekognitionError::Config(format!("{CONFIG_PATH_ENV} environment variable not set"))
        })?;
        Self::load(Path::new(&path))
    }

    /// Load from a TOML file, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RekognitionError::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        let mut cfg = Self::parse(&raw).map_err(|e| match e {
            RekognitionError::Config(msg) => {
                RekognitionError::Config(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        cfg.apply_env(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse and validate TOML text without consulting the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut cfg = Self::parse(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn parse(raw: &str) -> Result<Self> {
        let file: PlatformConfigFile = toml::from_str(raw)
            .map_err(|e| RekognitionError::Config(format!("invalid config: {e}")))?;
        Self::from_file(file)
    }

    fn from_file(file: PlatformConfigFile) -> Result<Self> {
        let credentials = match (file.aws_access_key_id, file.aws_secret_access_key) {
            (Some(access_key_id), Some(secret)) => Some(AwsCredentials {
                access_key_id,
                secret_access_key: Zeroizing::new(secret),
            }),
            (None, None) => None,
            _ => {
                return Err(RekognitionError::Config(
                    "aws_access_key_id and aws_secret_access_key must be set together".into(),
                ))
            }
        };

        let hass = match file.hass {
            Some(hass) => Some(HassSettings {
                url: hass.url.unwrap_or_default(),
                token: Zeroizing::new(hass.token.unwrap_or_default()),
            }),
            None => None,
        };

        Ok(Self {
            aws: AwsSettings {
                region: file
                    .region_name
                    .unwrap_or_else(|| DEFAULT_REGION.to_string()),
                credentials,
            },
            mode: file.mode.unwrap_or_default(),
            collection_id: file.collection_id,
            similarity_threshold: file.similarity_threshold.unwrap_or(DEFAULT_SIMILARITY),
            max_faces: file.max_faces.unwrap_or(DEFAULT_MAX_FACES),
            targets: file.targets.unwrap_or_else(|| {
                vec![TargetConfig {
                    target: DEFAULT_TARGET.to_string(),
                    confidence: DEFAULT_TARGET_CONFIDENCE,
                }]
            }),
            roi: file.roi,
            show_boxes: file.show_boxes.unwrap_or(true),
            save: SaveSettings {
                folder: file.save_file_folder,
                format: file.save_file_format.unwrap_or_default(),
                timestamped: file.save_timestamped_file.unwrap_or(false),
                always_save_latest: file.always_save_latest_file.unwrap_or(false),
                s3_bucket: file.s3_bucket,
            },
            label_font: file.label_font,
            sources: file.source,
            hass,
        })
    }

    /// Apply `HASS_URL` / `HASS_TOKEN` overrides.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let url = lookup("HASS_URL").filter(|v| !v.trim().is_empty());
        let token = lookup("HASS_TOKEN").filter(|v| !v.trim().is_empty());
        if url.is_none() && token.is_none() {
            return;
        }
        let hass = self.hass.get_or_insert_with(|| HassSettings {
            url: String::new(),
            token: Zeroizing::new(String::new()),
        });
        if let Some(url) = url {
            hass.url = url;
        }
        if let Some(token) = token {
            hass.token = Zeroizing::new(token);
        }
    }

    fn validate(&mut self) -> Result<()> {
        if !SUPPORTED_REGIONS.contains(&self.aws.region.as_str()) {
            return Err(RekognitionError::Config(format!(
                "unsupported region_name '{}'",
                self.aws.region
            )));
        }

        if self.mode == ScanMode::Face
            && self
                .collection_id
                .as_deref()
                .map_or(true, |id| id.trim().is_empty())
        {
            return Err(RekognitionError::Config(
                "collection_id is required in face mode".into(),
            ));
        }

        if !self.similarity_threshold.is_finite() {
            return Err(RekognitionError::Config(
                "similarity_threshold must be a number".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.similarity_threshold) {
            let clamped = self.similarity_threshold.clamp(0.0, 100.0);
            warn!(
                configured = self.similarity_threshold,
                clamped, "similarity_threshold outside [0, 100], clamping"
            );
            self.similarity_threshold = clamped;
        }

        if self.max_faces == 0 {
            return Err(RekognitionError::Config("max_faces must be at least 1".into()));
        }

        if self.mode == ScanMode::Object {
            if self.targets.is_empty() {
                return Err(RekognitionError::Config(
                    "targets must not be empty in object mode".into(),
                ));
            }
            for target in &mut self.targets {
                target.target = target.target.trim().to_lowercase();
                if target.target.is_empty() {
                    return Err(RekognitionError::Config("empty target label".into()));
                }
                target.confidence = target.confidence.clamp(0.0, 100.0);
            }
        }

        if let Some(roi) = &self.roi {
            roi.validate()?;
        }

        if self.sources.is_empty() {
            return Err(RekognitionError::Config(
                "at least one [[source]] is required".into(),
            ));
        }
        for source in &self.sources {
            validate_camera_entity_id(&source.entity_id)?;
        }

        self.validate_save()?;

        if let Some(hass) = &self.hass {
            if hass.url.trim().is_empty() {
                return Err(RekognitionError::Config("hass.url must not be empty".into()));
            }
            if hass.token.trim().is_empty() {
                return Err(RekognitionError::Config(
                    "hass.token (or HASS_TOKEN) must not be empty".into(),
                ));
            }
        }

        Ok(())
    }

    fn validate_save(&self) -> Result<()> {
        let save = &self.save;
        if save.s3_bucket.is_some() && !save.timestamped {
            return Err(RekognitionError::Config(
                "s3_bucket requires save_timestamped_file = true".into(),
            ));
        }

        match &save.folder {
            Some(folder) => {
                if !folder.is_dir() {
                    return Err(RekognitionError::Config(format!(
                        "save_file_folder {} is not a directory",
                        folder.display()
                    )));
                }
            }
            None => {
                if save.timestamped || save.always_save_latest {
                    warn!("save_timestamped_file/always_save_latest_file have no effect without save_file_folder");
                }
                if save.s3_bucket.is_some() {
                    return Err(RekognitionError::Config(
                        "s3_bucket requires save_file_folder".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A camera entity id must look like `camera.<object_id>`.
fn validate_camera_entity_id(entity_id: &str) -> Result<()> {
    match entity_id.split_once('.') {
        Some(("camera", object_id))
            if !object_id.is_empty()
                && object_id
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') =>
        {
            Ok(())
        }
        _ => Err(RekognitionError::Config(format!(
            "source entity_id '{entity_id}' is not a camera entity id"
        ))),
    }
}
