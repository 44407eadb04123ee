//! CLI command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Colloquy - batch LLM interviews with ordered, fault-tolerant collection
#[derive(Parser, Debug)]
#[command(name = "colloquy")]
#[command(about = "Batch LLM interviews with ordered, fault-tolerant collection", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a job file
    Run {
        /// Path to the job TOML file
        #[arg(long)]
        job: PathBuf,

        /// Repetitions of every interview
        #[arg(short = 'n', long)]
        repetitions: Option<u32>,

        /// Fixed number of concurrent workers
        #[arg(long)]
        concurrency: Option<usize>,

        /// Abort on the first failed interview
        #[arg(long)]
        stop_on_exception: bool,

        /// Write results as JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Configuration file layered over the bundled defaults
        #[arg(long)]
        config: Option<PathBuf>,

        /// Response cache file to resume from and update
        #[arg(long)]
        cache: Option<PathBuf>,
    },

    /// Print the work items a run would execute
    Plan {
        /// Path to the job TOML file
        #[arg(long)]
        job: PathBuf,

        /// Repetitions of every interview
        #[arg(short = 'n', long)]
        repetitions: Option<u32>,

        /// Configuration file layered over the bundled defaults
        #[arg(long)]
        config: Option<PathBuf>,
    },
}
