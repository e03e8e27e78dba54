use crate::core::io::snapshot::Snapshot;
use crate::core::models::dust::DustOpacity;
use crate::core::models::grid::Grid;
use crate::core::models::molecule::MolecularData;
use crate::core::physics::fields::PhysicalModel;
use crate::engine::config::{ConfigError, EngineConfig};
use crate::engine::context::SolveContext;
use crate::engine::error::EngineError;
use crate::engine::progress::{PassReport, Progress, ProgressReporter};
use crate::engine::state::{ConvergenceController, ConvergenceState};
use crate::engine::tasks::{field_sampling, grid_build, level_pops, species_setup};
use tracing::{debug, info, instrument, warn};

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Converged { passes: usize },
    MaxIterExceeded { passes: usize },
}

impl SolveStatus {
    pub fn passes(&self) -> usize {
        match *self {
            Self::Converged { passes } | Self::MaxIterExceeded { passes } => passes,
        }
    }
}

/// Final grid of a run together with how it ended.
///
/// A run that hits the iteration limit still returns its best-effort populations; use
/// [`SolveOutcome::ensure_converged`] to treat that as an error.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    pub grid: Grid,
    /// Reports of the passes run by this call, in order.
    pub reports: Vec<PassReport>,
    pub species: Vec<String>,
}

impl SolveOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self.status, SolveStatus::Converged { .. })
    }

    /// Fraction of interior points converged in the last pass.
    pub fn fraction_converged(&self) -> f64 {
        self.reports.last().map(|r| r.fraction_converged).unwrap_or(0.0)
    }

    pub fn ensure_converged(self) -> Result<Self, EngineError> {
        match self.status {
            SolveStatus::Converged { .. } => Ok(self),
            SolveStatus::MaxIterExceeded { passes } => Err(EngineError::NonConvergence {
                passes,
                fraction: self.fraction_converged(),
            }),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.grid.clone(), self.species.clone(), self.status.passes())
    }
}

/// Runs `job` on a dedicated worker pool sized by `config.threads`.
#[cfg(feature = "parallel")]
fn with_workers<T: Send>(
    config: &EngineConfig,
    job: impl FnOnce() -> Result<T, EngineError> + Send,
) -> Result<T, EngineError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads.unwrap_or(0))
        .build()
        .map_err(|e| EngineError::Internal(format!("failed to start worker threads: {}", e)))?;
    pool.install(job)
}

#[cfg(not(feature = "parallel"))]
fn with_workers<T: Send>(
    config: &EngineConfig,
    job: impl FnOnce() -> Result<T, EngineError> + Send,
) -> Result<T, EngineError> {
    if config.threads.is_some_and(|t| t > 1) {
        warn!("Built without the `parallel` feature; running on a single thread.");
    }
    job()
}

fn worker_count() -> usize {
    #[cfg(feature = "parallel")]
    {
        rayon::current_num_threads()
    }
    #[cfg(not(feature = "parallel"))]
    {
        1
    }
}

/// Builds a grid for `model`, solves the level populations of every species and returns
/// the final grid.
///
/// # Errors
///
/// Configuration, molecular-data and geometry errors abort the run before iterating.
/// Local solve failures are logged and never abort it.
#[instrument(skip_all, name = "solve_workflow")]
pub fn run(
    model: &dyn PhysicalModel,
    molecules: &[MolecularData],
    dust: Option<&DustOpacity>,
    config: &EngineConfig,
    reporter: &ProgressReporter,
) -> Result<SolveOutcome, EngineError> {
    with_workers(config, || -> Result<SolveOutcome, EngineError> {
        // === Phase 0: Validation ===
        let context = SolveContext::new(config, molecules, dust, reporter)?;
        info!(
            species = ?context.species_names(),
            threads = worker_count(),
            seed = config.seed,
            "Starting solve."
        );

        // === Phase 1: Grid construction ===
        let mut grid = grid_build::run(config, model, reporter)?;

        // === Phase 2: Fields and local quantities ===
        field_sampling::run(&mut grid, model, &context)?;
        species_setup::run(&mut grid, &context)?;

        // === Phase 3: Iteration ===
        let (status, reports) = iterate(&mut grid, &context, 0)?;
        Ok(SolveOutcome {
            status,
            grid,
            reports,
            species: context.species_names(),
        })
    })
}

/// Continues iterating a grid restored from a snapshot.
///
/// The species must match the snapshot by name, order and level count. Pass numbers and
/// the iteration limit count on from the passes stored in the snapshot.
#[instrument(skip_all, name = "resume_workflow")]
pub fn resume(
    snapshot: Snapshot,
    molecules: &[MolecularData],
    dust: Option<&DustOpacity>,
    config: &EngineConfig,
    reporter: &ProgressReporter,
) -> Result<SolveOutcome, EngineError> {
    with_workers(config, || -> Result<SolveOutcome, EngineError> {
        let context = SolveContext::new(config, molecules, dust, reporter)?;
        check_snapshot(&snapshot, &context)?;
        if dust.is_some() {
            warn!("Dust coefficients come from the snapshot; the dust table is not re-applied.");
        }
        info!(
            passes = snapshot.passes,
            points = snapshot.grid.len(),
            "Resuming from snapshot."
        );

        let Snapshot { passes, species, mut grid, .. } = snapshot;
        let (status, reports) = iterate(&mut grid, &context, passes)?;
        Ok(SolveOutcome {
            status,
            grid,
            reports,
            species,
        })
    })
}

fn check_snapshot(snapshot: &Snapshot, context: &SolveContext) -> Result<(), EngineError> {
    let names = context.species_names();
    if snapshot.species != names {
        return Err(ConfigError::InvalidValue {
            parameter: "species",
            reason: format!(
                "snapshot holds {:?} but {:?} were loaded",
                snapshot.species, names
            ),
        }
        .into());
    }
    for point in snapshot.grid.points() {
        if point.populations.len() != names.len() {
            return Err(EngineError::Internal(format!(
                "snapshot point {} has {} population sets for {} species",
                point.id,
                point.populations.len(),
                names.len()
            )));
        }
        for (pops, molecule) in point.populations.iter().zip(context.molecules) {
            if pops.level_count() != molecule.level_count()
                || pops.jbar.len() != molecule.line_count()
            {
                return Err(EngineError::MolecularData {
                    species: molecule.name().to_string(),
                    message: format!(
                        "snapshot has {} levels and {} lines, molecular data has {} and {}",
                        pops.level_count(),
                        pops.jbar.len(),
                        molecule.level_count(),
                        molecule.line_count()
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Drives the convergence state machine until it reaches a terminal state.
fn iterate(
    grid: &mut Grid,
    context: &SolveContext,
    completed_passes: usize,
) -> Result<(SolveStatus, Vec<PassReport>), EngineError> {
    context.reporter.report(Progress::PhaseStart { name: "Iterating" });
    let mut controller = ConvergenceController::new(&context.config.convergence);
    let mut state = controller.start(completed_passes)?;
    let mut reports = Vec::new();

    while let ConvergenceState::Iterating { pass, .. } = state {
        let report = level_pops::run(grid, context, pass + 1);
        context.reporter.report(Progress::PassComplete(report.clone()));
        state = controller.record_pass(report.fraction_converged)?;
        reports.push(report);

        if !state.is_terminal() {
            let escalated = level_pops::escalate_rays(grid, &context.config.transport, |converged| {
                controller.should_escalate(converged)
            });
            debug!(escalated, "Ray counts updated.");
        }
    }
    context.reporter.report(Progress::PhaseFinish);

    let status = match state {
        ConvergenceState::Converged { passes } => {
            info!(passes, "Populations converged.");
            SolveStatus::Converged { passes }
        }
        ConvergenceState::MaxIterExceeded { passes } => {
            warn!(
                passes,
                fraction = reports.last().map(|r| r.fraction_converged).unwrap_or(0.0),
                "Iteration limit reached before convergence."
            );
            SolveStatus::MaxIterExceeded { passes }
        }
        other => {
            return Err(EngineError::Internal(format!(
                "iteration stopped in non-terminal state {:?}",
                other
            )));
        }
    };
    Ok((status, reports))
}
