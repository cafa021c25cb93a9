//! In-memory host for tests and dry runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::{EventBus, FrameSource, StateSink};
use crate::error::{RekognitionError, Result};
use crate::state::EntityState;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Serves frames set by the caller; cameras without a frame are unavailable.
#[derive(Default)]
pub struct MemoryFrameSource {
    frames: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryFrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_frame(&self, camera_entity: &str, bytes: Vec<u8>) {
        lock(&self.frames).insert(camera_entity.to_string(), bytes);
    }

    pub fn clear(&self, camera_entity: &str) {
        lock(&self.frames).remove(camera_entity);
    }
}

#[async_trait]
impl FrameSource for MemoryFrameSource {
    async fn latest_frame(&self, camera_entity: &str) -> Result<Vec<u8>> {
        lock(&self.frames).get(camera_entity).cloned().ok_or_else(|| {
            RekognitionError::SourceUnavailable(format!("{camera_entity}: no frame"))
        })
    }
}

/// An event captured by [`MemoryEventBus`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub event_type: String,
    pub payload: Value,
}

/// Records published events.
#[derive(Default)]
pub struct MemoryEventBus {
    events: Mutex<Vec<PublishedEvent>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PublishedEvent> {
        lock(&self.events).clone()
    }

    pub fn events_of(&self, event_type: &str) -> Vec<PublishedEvent> {
        lock(&self.events)
            .iter()
            .filter(|event| event.event_type == event_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, event_type: &str, payload: &Value) -> Result<()> {
        lock(&self.events).push(PublishedEvent {
            event_type: event_type.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}

/// Keeps the latest state per entity plus the number of updates received.
#[derive(Default)]
pub struct MemoryStateSink {
    states: Mutex<HashMap<String, EntityState>>,
    updates: Mutex<usize>,
}

impl MemoryStateSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity_id: &str) -> Option<EntityState> {
        lock(&self.states).get(entity_id).cloned()
    }

    pub fn updates(&self) -> usize {
        *lock(&self.updates)
    }
}

#[async_trait]
impl StateSink for MemoryStateSink {
    async fn update(&self, entity_id: &str, state: &EntityState) -> Result<()> {
        lock(&self.states).insert(entity_id.to_string(), state.clone());
        *lock(&self.updates) += 1;
        Ok(())
    }
}
