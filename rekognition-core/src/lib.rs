//! Rekognition Core - face recognition and object detection for Home Assistant cameras
//!
//! This crate binds camera entities to Amazon Rekognition. Each scan fetches
//! the latest frame, asks the service who (or what) is in it, and turns the
//! answer into entity state, an annotated image and host events.
//!
//! # Features
//!
//! - Face search against a Rekognition collection (`SearchFacesByImage`)
//! - Object counting with per-target confidence (`DetectLabels`)
//! - Rectangle or polygon regions of interest
//! - Annotated "latest" and timestamped images, optional S3 upload
//!   (match boxes carry a text caption only when `label_font` is configured)
//! - Home Assistant REST host: camera proxy, state updates, event bus
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rekognition_core::{setup_platform, Host, MockRekognition, PlatformConfig, Services};
//!
//! # async fn example() -> rekognition_core::Result<()> {
//! let config = PlatformConfig::load_from_env()?;
//! let services = Services::new(Arc::new(MockRekognition::new()));
//! let host = Host::from_config(&config)?;
//!
//! for mut entity in setup_platform(&config, &services, &host)? {
//!     let report = entity.scan().await?;
//!     println!("{}: {}", report.entity_id, report.count);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod draw;
pub mod entity;
pub mod error;
pub mod geometry;
pub mod host;
pub mod persist;
pub mod platform;
pub mod state;

// Re-export main types for convenience
pub use client::{DetectedLabel, FaceMatch, FaceSearch, LabelInstance, MockRekognition, RekognitionApi};
pub use config::{PlatformConfig, SaveFormat, ScanMode, SourceConfig, TargetConfig};
pub use entity::{Detection, EntityConfig, EntityHost, RekognitionEntity, ScanReport};
pub use error::{RekognitionError, Result};
pub use geometry::{in_roi, BoundingBox, Point, Roi};
pub use persist::{ImageStore, MemoryObjectStore, ObjectStore, SaveReport};
pub use platform::{setup_platform, Host, Services};
pub use state::{EntityState, EVENT_FACE_RECOGNISED, EVENT_OBJECT_DETECTED};

#[cfg(feature = "aws")]
pub use client::{load_sdk_config, AwsRekognition};
#[cfg(feature = "aws")]
pub use persist::S3ObjectStore;
