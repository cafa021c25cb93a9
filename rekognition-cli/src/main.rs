//! Rekognition CLI - scan Home Assistant cameras with Amazon Rekognition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Usage error (unknown entity)
  66  Camera frame unavailable or undecodable
  69  Rekognition or Home Assistant unavailable
  78  Invalid configuration";

#[derive(Parser)]
#[command(name = "rekognition")]
#[command(author, version, about = "Amazon Rekognition scans for Home Assistant cameras", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Platform configuration file (TOML)
    #[arg(short, long, global = true, env = "REKOGNITION_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan every configured camera once (or only the selected entity)
    Scan {
        /// Only scan this entity (e.g. image_processing.rekognition_face_front_door)
        #[arg(short, long, value_name = "ENTITY_ID")]
        entity: Option<String>,

        /// Read the frame from this image file instead of the camera
        #[arg(short, long, value_name = "FILE")]
        image: Option<PathBuf>,

        /// Use the scripted mock client instead of AWS (never recognizes anything)
        #[arg(long)]
        mock: bool,

        /// Print each entity state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate the configuration and list the entities it creates
    CheckConfig,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Scan {
            entity,
            image,
            mock,
            json,
        } => commands::scan::execute(cli.config, entity, image, mock, json).await,
        Commands::CheckConfig => commands::check_config::execute(cli.config).await,
    };

    let exit = match result {
        Ok(()) => ExitCode::success(),
        Err(err) => ExitCode::from_anyhow(&err),
    };
    if let Some(message) = &exit.message {
        eprintln!("{} {}", "Error:".red().bold(), message);
    }
    std::process::exit(exit.code);
}
