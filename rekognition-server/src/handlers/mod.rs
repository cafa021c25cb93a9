//! HTTP request handlers
//!
//! Contains all endpoint handlers for the Rekognition server.

mod entities;
mod health;
mod scan;

pub use entities::{get_entity, list_entities};
pub use health::{health, HealthResponse};
pub use scan::{scan_handler, ScanResponse};
