use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use synth_adapters::FailurePolicy;
use synth_core::constants::DEFAULT_PROGRAM_VERSION;
use synth_hardware::{init_dotenv, HardwareError, OptaConfig};

use crate::error::CliError;
use crate::pipeline;

#[derive(Debug, Parser)]
#[command(name = "spps", about = "Peptide synthesizer: compile step tables and run synthesis schedules")]
pub struct Cli {
    /// Debug logging (RUST_LOG wins when set)
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Only warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compile one step table at a scale
    Compile(CompileArgs),
    /// Build the schedule and export the atomic command recipe, no hardware
    Recipe(ScheduleArgs),
    /// Run the schedule against the simulated clock
    Simulate(SimulateArgs),
    /// Run the schedule on the Opta controller
    Run(RunArgs),
}

#[derive(Debug, Args, Clone)]
pub struct CompileArgs {
    #[arg(value_name = "TABLE")]
    pub table: PathBuf,
    #[arg(short = 'm', long, default_value_t = 0.1)]
    pub scale: f64,
    #[arg(long = "version", default_value = DEFAULT_PROGRAM_VERSION)]
    pub program_version: String,
    #[arg(long)]
    pub build_dir: Option<PathBuf>,
    /// Print the compiled program as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ScheduleArgs {
    /// Peptide sequence (e.g. Ac-FMRF-NH2) or a file containing it
    #[arg(value_name = "SEQUENCE")]
    pub sequence: Option<String>,
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Target scale in mmol
    #[arg(short = 'm', long)]
    pub scale: Option<f64>,
    #[arg(long)]
    pub resin_mass: Option<f64>,
    /// Default residue program
    #[arg(short, long)]
    pub program: Option<String>,
    #[arg(long)]
    pub programs_dir: Option<PathBuf>,
    #[arg(long)]
    pub build_dir: Option<PathBuf>,
    #[arg(long)]
    pub no_double_couple: bool,
    #[arg(short = 'o', long, default_value = "output")]
    pub output_dir: PathBuf,
    /// Audit CSV path (default: inside the output directory)
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Also save the schedule as JSON here
    #[arg(long)]
    pub schedule: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub schedule: ScheduleArgs,
    /// Speed multiplier (0.1-10)
    #[arg(long, default_value_t = 1.0)]
    pub speed: f64,
    /// Same as --speed 10
    #[arg(long)]
    pub fast: bool,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub schedule: ScheduleArgs,
    /// Record failed steps and continue
    #[arg(long)]
    pub keep_going: bool,
    /// Overrides OPTA_HOST
    #[arg(long)]
    pub host: Option<String>,
    /// Overrides OPTA_PORT
    #[arg(long)]
    pub port: Option<u16>,
}

impl RunArgs {
    fn opta_config(&self) -> Result<OptaConfig, CliError> {
        init_dotenv();
        let mut config = OptaConfig::from_lookup(|key| match (key, &self.host) {
                             ("OPTA_HOST", Some(host)) => Some(host.clone()),
                             _ => std::env::var(key).ok(),
                         }).map_err(|e| match e {
                               HardwareError::Config(msg) => CliError::Usage(msg),
                               other => other.into(),
                           })?;
        if let Some(port) = self.port {
            config.port = port;
        }
        Ok(config)
    }

    fn policy(&self) -> FailurePolicy {
        if self.keep_going {
            FailurePolicy::KeepGoing
        } else {
            FailurePolicy::HaltOnFailure
        }
    }
}

impl Cli {
    pub fn init_logging(&self) {
        let fallback = if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        };
        let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(fallback))
                                                      .unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
    }

    pub fn run(self) -> Result<(), CliError> {
        match self.command {
            Command::Compile(args) => pipeline::compile(&args),
            Command::Recipe(args) => pipeline::recipe(&args),
            Command::Simulate(args) => pipeline::simulate(&args.schedule, if args.fast { 10.0 } else { args.speed }),
            Command::Run(args) => pipeline::run_hardware(&args.schedule, args.opta_config()?, args.policy()),
        }
    }
}
