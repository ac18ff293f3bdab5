//! Flujo de cada subcomando: configuración -> plan -> ejecución -> auditoría.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use synth_adapters::{ExecutionResult, FailurePolicy, HardwareExecutor, LogSink, RecipeExecutor, ScheduleExecutor, ScheduleRunner, SimulationExecutor,
                     SynthesisCoordinator, SynthesisOptions, SynthesisSchedule};
use synth_core::program::{ProgramCompiler, ProgramLibrary, ProgramSource};
use synth_core::{CommandEngine, DeviceBackend, FunctionRegistry};
use synth_domain::{load_synthesis_config, ParsedSequence, SynthesisConfig};
use synth_hardware::{OptaBackend, OptaConfig};

use crate::cli::{CompileArgs, ScheduleArgs};
use crate::error::CliError;

pub struct Plan {
    pub library: Arc<ProgramLibrary>,
    pub registry: Arc<FunctionRegistry>,
    pub schedule: SynthesisSchedule,
}

pub fn compile(args: &CompileArgs) -> Result<(), CliError> {
    let program_id = args.table
                         .file_stem()
                         .and_then(|s| s.to_str())
                         .ok_or_else(|| CliError::Usage(format!("cannot derive a program id from {}", args.table.display())))?
                         .to_string();
    let text = fs::read_to_string(&args.table).map_err(|e| CliError::Usage(format!("{}: {e}", args.table.display())))?;
    let source = ProgramSource { program_id,
                                 source_file: Some(args.table.display().to_string()),
                                 text };
    let program = ProgramCompiler::new().compile(&source, args.scale, &args.program_version)?;
    FunctionRegistry::with_defaults().check_program(&program)?;
    if let Some(dir) = &args.build_dir {
        let path = program.persist(dir)?;
        info!("wrote compiled program {}", path.display());
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(program.as_ref()).map_err(synth_core::CoreError::from)?);
    } else {
        println!("{} @ {} mmol: {} steps, ~{:.1} min, hash {}",
                 program.program_id,
                 program.target_scale_mmol,
                 program.step_count(),
                 program.estimated_duration_minutes,
                 program.content_hash);
    }
    Ok(())
}

/// El argumento de secuencia puede ser la secuencia o un fichero que la contiene.
fn read_sequence(arg: &str) -> Result<String, CliError> {
    let path = Path::new(arg);
    if !path.is_file() {
        return Ok(arg.trim().to_string());
    }
    let text = fs::read_to_string(path).map_err(|e| CliError::Usage(format!("{arg}: {e}")))?;
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .ok_or_else(|| CliError::Usage(format!("{arg}: no sequence found")))
}

pub fn resolve_config(args: &ScheduleArgs) -> Result<SynthesisConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => load_synthesis_config(path)?,
        None => SynthesisConfig::default(),
    };
    if let Some(sequence) = &args.sequence {
        config.sequence = read_sequence(sequence)?;
    }
    if let Some(scale) = args.scale {
        config.scale.target_mmol = scale;
    }
    if let Some(mass) = args.resin_mass {
        config.scale.resin_mass_g = Some(mass);
    }
    if let Some(program) = &args.program {
        config.default_aa_program = program.clone();
    }
    if let Some(dir) = &args.programs_dir {
        config.programs_dir = dir.clone();
    }
    if let Some(dir) = &args.build_dir {
        config.build_dir = Some(dir.clone());
    }
    if args.no_double_couple {
        config.double_couple_difficult = false;
    }
    config.validate()?;
    if config.sequence.trim().is_empty() {
        return Err(CliError::Usage("no sequence given (argument or `sequence:` in the config)".into()));
    }
    Ok(config)
}

pub fn plan(args: &ScheduleArgs) -> Result<Plan, CliError> {
    let config = resolve_config(args)?;
    let mut library = ProgramLibrary::discover(&config.programs_dir)?;
    if let Some(dir) = &config.build_dir {
        library = library.with_build_dir(dir);
    }
    let library = Arc::new(library);
    let registry = Arc::new(FunctionRegistry::with_defaults());
    let parsed = ParsedSequence::parse(&config.sequence)?;
    let schedule = SynthesisCoordinator::new(Arc::clone(&library)).with_registry(Arc::clone(&registry))
                                                                  .build_schedule(&parsed, config.scale.target_mmol, &SynthesisOptions::from(&config))?;
    println!("{}: {} steps, ~{:.1} min, resin {:.3} g",
             schedule.synthesis_id,
             schedule.steps.len(),
             schedule.total_estimated_time_minutes,
             schedule.resin_mass_g);
    if let Some(path) = &args.schedule {
        schedule.save(path)?;
    }
    Ok(Plan { library,
              registry,
              schedule })
}

fn audit_path(args: &ScheduleArgs, default_name: String) -> PathBuf { args.output.clone().unwrap_or_else(|| args.output_dir.join(default_name)) }

/// Exporta la auditoría y resume; cualquier paso fallido es un error.
fn finish(executor: &dyn ScheduleExecutor, schedule: &SynthesisSchedule, results: &[ExecutionResult], csv: &Path) -> Result<(), CliError> {
    executor.export_audit(csv, schedule)?;
    let failed = results.iter().filter(|r| !r.success).count();
    println!("{:?}: {}/{} steps ok, {} commands, audit {}",
             executor.mode(),
             results.len() - failed,
             schedule.steps.len(),
             executor.ledger().len(),
             csv.display());
    if failed > 0 {
        return Err(CliError::StepsFailed { failed,
                                           total: schedule.steps.len() });
    }
    Ok(())
}

pub fn recipe(args: &ScheduleArgs) -> Result<(), CliError> {
    let plan = plan(args)?;
    let schedule_path = args.output_dir.join(format!("{}_schedule.json", plan.schedule.synthesis_id));
    plan.schedule.save(&schedule_path)?;
    let mut executor = RecipeExecutor::new(plan.library, plan.registry);
    let results = executor.execute(&plan.schedule, &LogSink)?;
    let csv = audit_path(args, format!("atomic_commands_{}.csv", plan.schedule.synthesis_id));
    finish(&executor, &plan.schedule, &results, &csv)
}

pub fn simulate(args: &ScheduleArgs, speed: f64) -> Result<(), CliError> {
    let plan = plan(args)?;
    let executor = SimulationExecutor::new(plan.library, plan.registry, speed);
    info!("simulating at {}x", executor.control().speed());
    let handle = ScheduleRunner::spawn(Box::new(executor), plan.schedule.clone(), Arc::new(LogSink))?;
    let outcome = handle.join()?;
    let csv = audit_path(args, format!("simulation_{}.csv", plan.schedule.synthesis_id));
    finish(outcome.executor.as_ref(), &plan.schedule, &outcome.results, &csv)
}

pub fn run_hardware(args: &ScheduleArgs, opta: OptaConfig, policy: FailurePolicy) -> Result<(), CliError> {
    let plan = plan(args)?;
    let mut backend = OptaBackend::new(opta.clone());
    backend.try_connect()?;
    let mut executor = HardwareExecutor::new(plan.library, plan.registry, Box::new(backend)).with_engine(CommandEngine::new(opta.engine_config()))
                                                                                              .with_policy(policy);
    let results = executor.execute(&plan.schedule, &LogSink);
    if !executor.backend_mut().disconnect() {
        warn!("controller did not acknowledge disconnect");
    }
    let results = results?;

    let summary = executor.summary();
    println!("success rate {:.0}% ({} ok, {} failed{})",
             summary.success_rate * 100.0,
             summary.successful_steps,
             summary.failed_steps,
             if summary.aborted { ", aborted" } else { "" });
    let csv = audit_path(args, format!("hardware_run_{}_{}.csv", plan.schedule.synthesis_id, executor.ledger().run_id()));
    finish(&executor, &plan.schedule, &results, &csv)
}
