//! Command-line interface module.

mod commands;
mod plan;
mod run;

pub use commands::{Cli, Commands};
pub use plan::plan_job;
pub use run::run_job;

use colloquy::{ColloquyConfig, ColloquyResult};
use std::path::Path;

/// Load an explicit config file, or the layered defaults.
fn load_config(path: Option<&Path>) -> ColloquyResult<ColloquyConfig> {
    match path {
        Some(path) => ColloquyConfig::from_file(path),
        None => ColloquyConfig::load(),
    }
}
