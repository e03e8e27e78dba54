use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "LIME-RT - non-LTE molecular line excitation on unstructured 3D grids.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Number of worker threads for the solve.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a grid from the model in the config file and solve the level populations.
    Run(RunArgs),
    /// Continue iterating a grid saved by an earlier run.
    Resume(ResumeArgs),
}

/// Inputs shared by every solve.
#[derive(Args, Debug)]
pub struct SpeciesArgs {
    /// LAMDA molecular data file; repeat for several species, in abundance order.
    #[arg(short, long = "molecule", required = true, value_name = "PATH")]
    pub molecules: Vec<PathBuf>,

    /// Two-column dust opacity table (wavelength in micron, kappa in cm^2/g).
    #[arg(long, value_name = "PATH")]
    pub dust: Option<PathBuf>,

    /// Output prefix; writes PREFIX.grid.json and PREFIX.pops.csv.
    #[arg(short, long, required = true, value_name = "PREFIX")]
    pub output: PathBuf,
}

/// Command-line overrides of the config file.
#[derive(Args, Debug, Default)]
pub struct SolveOverrides {
    /// Override the random seed.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Override the maximum number of convergence passes.
    #[arg(long, value_name = "INT")]
    pub max_iterations: Option<usize>,

    /// Solve every species in LTE.
    #[arg(long)]
    pub lte_only: bool,

    /// Disable line blending.
    #[arg(long)]
    pub no_blend: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S transport.max-rays=2000
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the configuration file in TOML format, including the `[model]` section.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    #[command(flatten)]
    pub species: SpeciesArgs,

    #[command(flatten)]
    pub overrides: SolveOverrides,
}

/// Arguments for the `resume` subcommand.
#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Grid snapshot written by an earlier run.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub snapshot: PathBuf,

    /// Path to the configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    #[command(flatten)]
    pub species: SpeciesArgs,

    #[command(flatten)]
    pub overrides: SolveOverrides,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accepts_repeated_molecules_and_overrides() {
        let cli = Cli::parse_from([
            "lime", "-j", "4", "run", "-c", "model.toml", "-m", "co.dat", "-m", "hco+.dat", "-o",
            "out/disk", "--seed", "7", "--no-blend", "-S", "transport.max-rays=200",
        ]);
        assert_eq!(cli.threads, Some(4));
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.species.molecules.len(), 2);
        assert_eq!(args.overrides.seed, Some(7));
        assert!(args.overrides.no_blend);
        assert!(!args.overrides.lte_only);
        assert_eq!(args.overrides.set_values, vec!["transport.max-rays=200"]);
    }

    #[test]
    fn resume_requires_a_snapshot() {
        let args = ["lime", "resume", "-c", "c.toml", "-m", "co.dat", "-o", "x"];
        assert!(Cli::try_parse_from(args).is_err());
        let cli = Cli::try_parse_from([
            "lime", "resume", "-s", "x.grid.json", "-c", "c.toml", "-m", "co.dat", "-o", "x",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Resume(_)));
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let args = ["lime", "-q", "-v", "run", "-c", "c", "-m", "m", "-o", "o"];
        assert!(Cli::try_parse_from(args).is_err());
    }
}
