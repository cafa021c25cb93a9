//! Interfaces to the host automation platform.
//!
//! The entity never reaches into the host directly. It fetches frames, shows
//! its state and fires events through these three traits:
//!
//! - `HassClient` - Home Assistant REST API (all three)
//! - `SnapshotUrlSource` / `FileFrameSource` - frames without Home Assistant
//! - `MemoryFrameSource`, `MemoryEventBus`, `MemoryStateSink` - tests and dry runs

mod hass;
mod memory;
mod snapshot;

pub use hass::HassClient;
pub use memory::{MemoryEventBus, MemoryFrameSource, MemoryStateSink, PublishedEvent};
pub use snapshot::{FileFrameSource, SnapshotUrlSource};

use async_trait::async_trait;

use crate::error::Result;
use crate::state::EntityState;

/// Provides the most recent frame of a camera.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Encoded image bytes of the latest frame of `camera_entity`.
    ///
    /// Fails with `SourceUnavailable` when no frame can be retrieved.
    async fn latest_frame(&self, camera_entity: &str) -> Result<Vec<u8>>;
}

/// Host event bus.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event_type: &str, payload: &serde_json::Value) -> Result<()>;
}

/// Receives the displayed state of an entity after every successful scan.
#[async_trait]
pub trait StateSink: Send + Sync {
    async fn update(&self, entity_id: &str, state: &EntityState) -> Result<()>;
}
