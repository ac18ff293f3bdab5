//! Modo simulación: registra los comandos como en sólo-receta y además
//! reproduce su duración estimada, dividida por el multiplicador de
//! velocidad, en trozos de `poll_interval`. La pausa congela el reloj; la
//! velocidad se puede cambiar en caliente (se lee al empezar cada comando).
//!
//! Cada comando se registra en el ledger al terminar su espera: un abort a
//! mitad deja fuera el comando en curso y los siguientes.

use std::sync::Arc;
use std::time::Duration;

use log::info;

use synth_core::engine::{duration_from_secs, CommandEngine, CommandLedger, EngineConfig, ExecutionControl};
use synth_core::program::ProgramLibrary;
use synth_core::FunctionRegistry;

use super::{drive_schedule, ExecutionError, ExecutionMode, ExecutionResult, FailurePolicy, ProgressEvent, ProgressSink, ScheduleExecutor};
use crate::coordinator::SynthesisSchedule;

#[derive(Debug)]
pub struct SimulationExecutor {
    library: Arc<ProgramLibrary>,
    registry: Arc<FunctionRegistry>,
    engine: CommandEngine,
}

impl SimulationExecutor {
    pub fn new(library: Arc<ProgramLibrary>, registry: Arc<FunctionRegistry>, speed: f64) -> Self {
        let engine = CommandEngine::new(EngineConfig::default());
        engine.control().set_speed(speed);
        Self { library,
               registry,
               engine }
    }

    /// Sustituye el motor conservando la velocidad configurada.
    pub fn with_engine(mut self, engine: CommandEngine) -> Self {
        engine.control().set_speed(self.engine.control().speed());
        self.engine = engine;
        self
    }
}

impl ScheduleExecutor for SimulationExecutor {
    fn mode(&self) -> ExecutionMode { ExecutionMode::Simulation }

    fn control(&self) -> ExecutionControl { self.engine.control().clone() }

    fn ledger(&self) -> &CommandLedger { self.engine.ledger() }

    fn execute(&mut self, schedule: &SynthesisSchedule, sink: &dyn ProgressSink) -> Result<Vec<ExecutionResult>, ExecutionError> {
        let control = self.engine.control().clone();
        let engine = &mut self.engine;
        Ok(drive_schedule(schedule,
                          &self.library,
                          &self.registry,
                          &control,
                          FailurePolicy::HaltOnFailure,
                          sink,
                          &mut |step| {
                              let step_number = step.schedule_step.step_number;
                              let program_step = step.context.sequence_number;
                              let mut results = Vec::with_capacity(step.commands.len());
                              for (index, command) in step.commands.iter().enumerate() {
                                  let atomic_index = index as u32 + 1;
                                  let estimated = command.estimated_duration_seconds();
                                  sink.emit(&ProgressEvent::CommandStarted { step_number,
                                                                             program_step,
                                                                             atomic_index,
                                                                             description: command.description(),
                                                                             estimated_seconds: estimated });
                                  let total = duration_from_secs(estimated / control.speed());
                                  let mut elapsed = Duration::ZERO;
                                  while elapsed < total && !control.is_aborted() {
                                      if control.is_paused() {
                                          engine.sleeper().sleep(control.poll_interval());
                                          continue;
                                      }
                                      let chunk = (total - elapsed).min(control.poll_interval());
                                      engine.sleeper().sleep(chunk);
                                      elapsed += chunk;
                                      sink.emit(&ProgressEvent::CommandProgress { step_number,
                                                                                  program_step,
                                                                                  atomic_index,
                                                                                  fraction: elapsed.as_secs_f64() / total.as_secs_f64(),
                                                                                  elapsed_seconds: elapsed.as_secs_f64() });
                                  }
                                  if control.is_aborted() {
                                      info!("step {step_number}: simulation aborted during program step {program_step} [{atomic_index}]");
                                      break;
                                  }
                                  let context = step.context.at_offset(index as u32);
                                  let Some(result) = engine.execute(std::slice::from_ref(command), &context, None, true).pop() else {
                                      break;
                                  };
                                  let success = result.is_success();
                                  sink.emit(&ProgressEvent::CommandCompleted { step_number,
                                                                               program_step,
                                                                               atomic_index,
                                                                               success });
                                  results.push(result);
                                  if !success {
                                      break;
                                  }
                              }
                              results
                          }))
    }
}
