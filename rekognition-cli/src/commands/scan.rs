//! Scan command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use rekognition_core::host::{FileFrameSource, MemoryEventBus, MemoryStateSink};
use rekognition_core::{setup_platform, Host, MockRekognition, Services};
use tracing::{info, warn};

use crate::exit_codes::UsageError;
use crate::utils::load_config;

/// Execute the scan command.
pub async fn execute(
    config_path: Option<PathBuf>,
    entity: Option<String>,
    image: Option<PathBuf>,
    use_mock: bool,
    json: bool,
) -> Result<()> {
    let mut config = load_config(config_path)?;

    // A frame file replaces every camera, snapshot URLs included
    if image.is_some() {
        for source in &mut config.sources {
            source.snapshot_url = None;
        }
    }

    let services = if use_mock {
        warn!("Using MOCK Rekognition client (no faces or labels are ever detected)");
        if !json {
            eprintln!("{}", "Using MOCK Rekognition client".yellow());
        }
        Services::new(Arc::new(MockRekognition::new()))
    } else {
        Services::aws(&config).await
    };

    let local_events = Arc::new(MemoryEventBus::new());
    let mut host = match &config.hass {
        Some(_) => Host::from_config(&config)?,
        None => Host::new(
            None,
            local_events.clone(),
            Arc::new(MemoryStateSink::new()),
        ),
    };
    if let Some(path) = &image {
        info!(path = %path.display(), "Reading frames from file");
        host.frames = Some(Arc::new(FileFrameSource::new(path)));
    }

    let mut entities = setup_platform(&config, &services, &host)?;
    if let Some(wanted) = &entity {
        entities.retain(|e| e.entity_id() == wanted.as_str());
        if entities.is_empty() {
            return Err(UsageError(format!("No entity named {wanted} in the configuration")).into());
        }
    }

    let mut first_error = None;
    for entity in &mut entities {
        let entity_id = entity.entity_id().to_string();
        match entity.scan().await {
            Ok(report) => {
                if json {
                    let state = serde_json::to_string(entity.state())
                        .context("Failed to serialize entity state")?;
                    println!("{state}");
                    continue;
                }
                let state = entity.state();
                println!(
                    "{} {} {}",
                    entity_id.bold(),
                    report.count.to_string().green().bold(),
                    state.unit_of_measurement
                );
                for face in state.matches() {
                    println!("   {} {}", "match:".dimmed(), face.caption());
                }
                for path in [&report.saved.latest, &report.saved.timestamped]
                    .into_iter()
                    .flatten()
                {
                    println!("   {} {}", "saved:".dimmed(), path.display());
                }
                if let Some(key) = &report.saved.uploaded {
                    println!("   {} {}", "uploaded:".dimmed(), key);
                }
                for error in &report.saved.errors {
                    println!("   {} {}", "save failed:".yellow(), error);
                }
            }
            Err(e) => {
                if !json {
                    println!("{} {}", entity_id.bold(), "scan failed".red());
                }
                if first_error.is_none() {
                    first_error =
                        Some(anyhow::Error::new(e).context(format!("Scan of {entity_id} failed")));
                }
            }
        }
    }

    if !json && config.hass.is_none() {
        for event in local_events.events() {
            println!(
                "{} {} {}",
                "event:".dimmed(),
                event.event_type.cyan(),
                event.payload
            );
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
