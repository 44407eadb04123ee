//! Colloquy CLI binary.
//!
//! - Run a job file against live or scripted models
//! - Print the work-item plan of a job without calling any model

use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use cli::{Cli, Commands, plan_job, run_job};

    let cli = Cli::parse();

    // API keys may live in a .env file
    dotenvy::dotenv().ok();
    colloquy::init_console_telemetry(cli.verbose)?;

    match cli.command {
        Commands::Run {
            job,
            repetitions,
            concurrency,
            stop_on_exception,
            output,
            config,
            cache,
        } => {
            run_job(
                &job,
                config.as_deref(),
                colloquy::RunOptions::default()
                    .with_repetitions(repetitions)
                    .with_concurrency(concurrency)
                    .with_stop_on_exception(stop_on_exception)
                    .with_output(output)
                    .with_cache(cache),
            )
            .await?;
        }

        Commands::Plan {
            job,
            repetitions,
            config,
        } => {
            plan_job(&job, repetitions, config.as_deref())?;
        }
    }

    Ok(())
}
