//! Check-config command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use rekognition_core::{setup_platform, Host, MockRekognition, Services};

use crate::utils::{display_path, load_config, mode_label};

/// Execute the check-config command.
///
/// Builds the entities with the mock client, so no AWS call is made.
pub async fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let host = Host::from_config(&config)?;
    let services = Services::new(Arc::new(MockRekognition::new()));
    let entities = setup_platform(&config, &services, &host)?;

    println!("{}", "Configuration OK".green().bold());
    println!();
    println!("   {} {}", "Region:".dimmed(), config.aws.region);
    println!("   {} {}", "Mode:".dimmed(), mode_label(config.mode));
    if let Some(collection) = &config.collection_id {
        println!("   {} {}", "Collection:".dimmed(), collection);
    }
    println!(
        "   {} {}",
        "Save folder:".dimmed(),
        display_path(config.save.folder.as_deref())
    );
    println!(
        "   {} {}",
        "Home Assistant:".dimmed(),
        config.hass.as_ref().map_or("-", |h| h.url.as_str())
    );
    if config.roi.is_some() {
        println!("   {} configured", "ROI:".dimmed());
    }
    println!();

    for (entity, source) in entities.iter().zip(&config.sources) {
        let frames = match &source.snapshot_url {
            Some(url) => url.as_str(),
            None => "camera proxy",
        };
        println!(
            "{} <- {} ({})",
            entity.entity_id().bold(),
            entity.camera_entity(),
            frames
        );
    }

    Ok(())
}
