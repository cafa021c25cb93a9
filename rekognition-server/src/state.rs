//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use rekognition_core::{EntityState, RekognitionEntity, RekognitionError, ScanReport};
use tokio::sync::{watch, Mutex};

/// One entity as seen by the server.
///
/// Scans of the entity run one at a time behind `entity`. Readers use the
/// `state` snapshot, which is republished after every successful scan and
/// never waits for a scan in progress.
pub struct EntityHandle {
    entity: Mutex<RekognitionEntity>,
    state: watch::Sender<EntityState>,
}

impl EntityHandle {
    fn new(entity: RekognitionEntity) -> Self {
        let (state, _) = watch::channel(entity.state().clone());
        Self {
            entity: Mutex::new(entity),
            state,
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> EntityState {
        self.state.borrow().clone()
    }

    /// Receiver notified whenever a scan publishes new state.
    pub fn subscribe(&self) -> watch::Receiver<EntityState> {
        self.state.subscribe()
    }

    /// Scan now, waiting for any scan already running on this entity.
    pub async fn scan(&self) -> Result<(ScanReport, EntityState), RekognitionError> {
        let mut entity = self.entity.lock().await;
        let report = entity.scan().await?;
        let state = entity.state().clone();
        self.state.send_replace(state.clone());
        Ok((report, state))
    }
}

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    entities: Arc<BTreeMap<String, Arc<EntityHandle>>>,
    /// Rekognition backend in use ("aws" or "mock")
    pub backend: &'static str,
}

impl AppState {
    pub fn new(entities: Vec<RekognitionEntity>, backend: &'static str) -> Self {
        let entities = entities
            .into_iter()
            .map(|entity| {
                (
                    entity.entity_id().to_string(),
                    Arc::new(EntityHandle::new(entity)),
                )
            })
            .collect();
        Self {
            entities: Arc::new(entities),
            backend,
        }
    }

    pub fn entity(&self, entity_id: &str) -> Option<Arc<EntityHandle>> {
        self.entities.get(entity_id).cloned()
    }

    /// All entities, ordered by entity id.
    pub fn entities(&self) -> impl Iterator<Item = &Arc<EntityHandle>> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
