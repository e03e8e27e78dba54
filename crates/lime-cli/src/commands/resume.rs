use crate::cli::ResumeArgs;
use crate::commands;
use crate::config::PartialLimeConfig;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use lime_rt::core::io::snapshot::Snapshot;
use lime_rt::engine::progress::ProgressReporter;
use lime_rt::workflows;
use tracing::{info, warn};

pub fn run(args: ResumeArgs, threads: Option<usize>) -> Result<()> {
    let mut partial = PartialLimeConfig::from_file(&args.config)?;
    if partial.take_model().is_some() {
        warn!("The `[model]` section is ignored when resuming; fields come from the snapshot.");
    }
    let config = partial.merge_with_cli(&args.overrides, threads)?;

    info!("Loading snapshot from {:?}", &args.snapshot);
    let snapshot = Snapshot::read_from_path(&args.snapshot).map_err(|e| CliError::FileParsing {
        path: args.snapshot.clone(),
        source: e.into(),
    })?;
    let (molecules, dust) = commands::load_species(&args.species)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Resuming after {} passes...", snapshot.passes);
    let outcome =
        workflows::solve::resume(snapshot, &molecules, dust.as_ref(), &config, &reporter)?;
    info!(status = ?outcome.status, "Workflow finished.");

    commands::write_outputs(&outcome, &args.species.output)?;
    commands::finish(outcome)
}
