//! Modos de ejecución de un `SynthesisSchedule`.
//!
//! Los tres modos (sólo receta, simulación, hardware) recorren el plan con
//! el mismo driver: compilar el programa del paso a su escala, expandir cada
//! paso ejecutable en comandos atómicos y entregarlos al motor. Sólo cambia
//! qué hace el motor con ellos. El abort se comprueba entre pasos de
//! programa; un paso fallido detiene el plan salvo `FailurePolicy::KeepGoing`.

pub mod hardware;
pub mod progress;
pub mod recipe;
pub mod runner;
pub mod simulation;

use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use synth_core::command::AtomicCommand;
use synth_core::engine::{export_csv, CommandContext, CommandLedger, CommandResult, ExecutionControl, ExportMetadata};
use synth_core::program::ProgramLibrary;
use synth_core::{CoreError, FunctionRegistry};

use crate::coordinator::{SynthesisSchedule, SynthesisStep};

pub use hardware::{HardwareExecutor, RunSummary};
pub use progress::{CollectingSink, LogSink, NullSink, ProgressEvent, ProgressSink};
pub use recipe::RecipeExecutor;
pub use runner::{RunHandle, RunOutcome, ScheduleRunner};
pub use simulation::SimulationExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    RecipeOnly,
    Simulation,
    Hardware,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    #[default]
    HaltOnFailure,
    /// Barridos de diagnóstico: registra el fallo y sigue.
    KeepGoing,
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("device backend is not connected")]
    NotConnected,
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("worker thread failed: {0}")]
    Worker(String),
}

/// Resultado uniforme por paso del plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub step_number: u32,
    pub residue_code: Option<String>,
    pub program_name: String,
    pub success: bool,
    pub commands_executed: usize,
    pub elapsed_seconds: f64,
    pub error: Option<String>,
}

/// Contrato común de los modos.
pub trait ScheduleExecutor: Send {
    fn mode(&self) -> ExecutionMode;
    /// Handle de control compartido con el motor.
    fn control(&self) -> ExecutionControl;
    fn ledger(&self) -> &CommandLedger;
    fn execute(&mut self, schedule: &SynthesisSchedule, sink: &dyn ProgressSink) -> Result<Vec<ExecutionResult>, ExecutionError>;

    /// Exporta el ledger a CSV con los metadatos del plan.
    fn export_audit(&self, path: &Path, schedule: &SynthesisSchedule) -> Result<(), CoreError> {
        let metadata = ExportMetadata { synthesis_id: schedule.synthesis_id.clone(),
                                        target_scale_mmol: schedule.target_scale_mmol,
                                        generated_at: Utc::now(),
                                        total_steps: schedule.steps.len() };
        export_csv(path, self.ledger().records(), Some(&metadata))?;
        info!("exported {} command records to {}", self.ledger().len(), path.display());
        Ok(())
    }
}

/// Comandos de un paso de programa, listos para el motor.
pub struct StepCommands<'a> {
    pub schedule_step: &'a SynthesisStep,
    pub commands: &'a [AtomicCommand],
    pub context: &'a CommandContext,
}

/// Recorre el plan. `run` ejecuta los comandos de un paso de programa.
pub(crate) fn drive_schedule(schedule: &SynthesisSchedule,
                             library: &ProgramLibrary,
                             registry: &FunctionRegistry,
                             control: &ExecutionControl,
                             policy: FailurePolicy,
                             sink: &dyn ProgressSink,
                             run: &mut dyn FnMut(StepCommands<'_>) -> Vec<CommandResult>)
                             -> Vec<ExecutionResult> {
    let total_steps = schedule.steps.len();
    let mut results = Vec::with_capacity(total_steps);

    for step in &schedule.steps {
        if control.is_aborted() {
            sink.emit(&ProgressEvent::Aborted { step_number: step.step_number });
            break;
        }
        sink.emit(&ProgressEvent::StepStarted { step_number: step.step_number,
                                                residue_code: step.residue_code.clone(),
                                                program_name: step.program_name.clone(),
                                                total_steps });
        info!("executing step {}/{}: {} ({})",
              step.step_number,
              total_steps,
              step.residue_code.as_deref().unwrap_or("program"),
              step.program_name);
        let started = Instant::now();
        let (commands_executed, error) = run_schedule_step(step, schedule.target_scale_mmol, library, registry, control, run);
        let aborted = control.is_aborted();
        let result = ExecutionResult { step_number: step.step_number,
                                       residue_code: step.residue_code.clone(),
                                       program_name: step.program_name.clone(),
                                       success: error.is_none(),
                                       commands_executed,
                                       elapsed_seconds: started.elapsed().as_secs_f64(),
                                       error };
        sink.emit(&ProgressEvent::StepCompleted { result: result.clone() });
        let failed = !result.success;
        if let Some(e) = &result.error {
            error!("step {} failed: {e}", result.step_number);
        }
        results.push(result);

        if aborted {
            warn!("execution aborted after step {}", step.step_number);
            sink.emit(&ProgressEvent::Aborted { step_number: step.step_number });
            break;
        }
        if failed && policy == FailurePolicy::HaltOnFailure {
            break;
        }
    }
    results
}

fn run_schedule_step(step: &SynthesisStep,
                     default_scale: f64,
                     library: &ProgramLibrary,
                     registry: &FunctionRegistry,
                     control: &ExecutionControl,
                     run: &mut dyn FnMut(StepCommands<'_>) -> Vec<CommandResult>)
                     -> (usize, Option<String>) {
    let scale = step.target_scale_mmol().unwrap_or(default_scale);
    let program = match library.compile_for_scale(&step.program_name, scale) {
        Ok(p) => p,
        Err(e) => return (0, Some(e.to_string())),
    };
    let mut executed = 0;
    for exec in &program.steps {
        if control.is_aborted() {
            return (executed, Some("aborted".to_string()));
        }
        let commands = match registry.expand_step(exec) {
            Ok(c) => c,
            Err(e) => return (executed, Some(e.to_string())),
        };
        let context = CommandContext { sequence_number: exec.sequence_number,
                                       function_id: exec.function_id.clone(),
                                       comments: exec.comments.clone(),
                                       atomic_offset: 0 };
        let outcome = run(StepCommands { schedule_step: step,
                                         commands: &commands,
                                         context: &context });
        executed += outcome.len();
        if let Some(failed) = outcome.iter().find(|r| !r.is_success()) {
            let reason = failed.error
                               .as_ref()
                               .map(|e| e.to_string())
                               .unwrap_or_else(|| "command failed".to_string());
            return (executed, Some(format!("program step {} ({}) failed: {reason}", exec.sequence_number, exec.function_id)));
        }
    }
    (executed, None)
}
