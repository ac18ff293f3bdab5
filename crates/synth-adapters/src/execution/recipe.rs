//! Modo sólo-receta: compila y expande todo el plan en el ledger sin
//! backend ni esperas. Sirve para revisar y exportar el CSV de auditoría
//! antes de tocar hardware.

use std::sync::Arc;

use synth_core::engine::{CommandEngine, CommandLedger, EngineConfig, ExecutionControl};
use synth_core::program::ProgramLibrary;
use synth_core::FunctionRegistry;

use super::{drive_schedule, ExecutionError, ExecutionMode, ExecutionResult, FailurePolicy, ProgressSink, ScheduleExecutor};
use crate::coordinator::SynthesisSchedule;

#[derive(Debug)]
pub struct RecipeExecutor {
    library: Arc<ProgramLibrary>,
    registry: Arc<FunctionRegistry>,
    engine: CommandEngine,
}

impl RecipeExecutor {
    pub fn new(library: Arc<ProgramLibrary>, registry: Arc<FunctionRegistry>) -> Self {
        Self { library,
               registry,
               engine: CommandEngine::new(EngineConfig::default()) }
    }

    pub fn with_engine(mut self, engine: CommandEngine) -> Self {
        self.engine = engine;
        self
    }
}

impl ScheduleExecutor for RecipeExecutor {
    fn mode(&self) -> ExecutionMode { ExecutionMode::RecipeOnly }

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
                          &mut |step| engine.execute(step.commands, step.context, None, true)))
    }
}
