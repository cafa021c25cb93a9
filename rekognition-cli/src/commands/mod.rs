//! Subcommand implementations.

pub mod check_config;
pub mod scan;
