use crate::cli::RunArgs;
use crate::commands;
use crate::config::PartialLimeConfig;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use lime_rt::engine::progress::ProgressReporter;
use lime_rt::workflows;
use tracing::info;

pub fn run(args: RunArgs, threads: Option<usize>) -> Result<()> {
    let mut partial = PartialLimeConfig::from_file(&args.config)?;
    let model = partial.take_model().ok_or_else(|| {
        CliError::Config("A `[model]` section is required for 'run'.".to_string())
    })?;
    info!("Merging configuration from file and CLI arguments...");
    let config = partial.merge_with_cli(&args.overrides, threads)?;

    let (molecules, dust) = commands::load_species(&args.species)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting solve for {} species...", molecules.len());
    let outcome = workflows::solve::run(&model, &molecules, dust.as_ref(), &config, &reporter)?;
    info!(status = ?outcome.status, "Workflow finished.");

    commands::write_outputs(&outcome, &args.species.output)?;
    commands::finish(outcome)
}
