//! Rekognition Server Library - HTTP surface over the Rekognition entities
//!
//! This library exposes the server components for use in integration tests.
//! The main binary uses these same components.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::ApiError;
pub use routes::{create_router, create_router_with_config};
pub use state::AppState;
