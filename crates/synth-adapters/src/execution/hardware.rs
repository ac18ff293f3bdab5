//! Modo hardware: despacha cada comando al backend real a través del motor.
//!
//! Exige un backend conectado antes de empezar. Por defecto se detiene en el
//! primer paso fallido; `KeepGoing` sigue y deja constancia del fallo. Al
//! abortar se emite una parada de emergencia (bomba STOP, solenoide OFF).

use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use synth_core::engine::{CommandEngine, CommandLedger, DeviceBackend, EngineConfig, ExecutionControl, LedgerSummary};
use synth_core::program::ProgramLibrary;
use synth_core::FunctionRegistry;

use super::{drive_schedule, ExecutionError, ExecutionMode, ExecutionResult, FailurePolicy, ProgressEvent, ProgressSink, ScheduleExecutor};
use crate::coordinator::SynthesisSchedule;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_steps: usize,
    pub successful_steps: usize,
    pub failed_steps: usize,
    pub success_rate: f64,
    pub aborted: bool,
    pub commands: LedgerSummary,
}

pub struct HardwareExecutor {
    library: Arc<ProgramLibrary>,
    registry: Arc<FunctionRegistry>,
    engine: CommandEngine,
    backend: Box<dyn DeviceBackend>,
    policy: FailurePolicy,
    results: Vec<ExecutionResult>,
}

impl std::fmt::Debug for HardwareExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareExecutor")
         .field("backend", &self.backend)
         .field("policy", &self.policy)
         .field("engine", &self.engine)
         .finish()
    }
}

impl HardwareExecutor {
    pub fn new(library: Arc<ProgramLibrary>, registry: Arc<FunctionRegistry>, backend: Box<dyn DeviceBackend>) -> Self {
        Self { library,
               registry,
               engine: CommandEngine::new(EngineConfig::default()),
               backend,
               policy: FailurePolicy::default(),
               results: Vec::new() }
    }

    pub fn with_engine(mut self, engine: CommandEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn backend(&self) -> &dyn DeviceBackend { self.backend.as_ref() }

    pub fn backend_mut(&mut self) -> &mut dyn DeviceBackend { self.backend.as_mut() }

    pub fn summary(&self) -> RunSummary {
        let total_steps = self.results.len();
        let successful_steps = self.results.iter().filter(|r| r.success).count();
        RunSummary { total_steps,
                     successful_steps,
                     failed_steps: total_steps - successful_steps,
                     success_rate: if total_steps > 0 { successful_steps as f64 / total_steps as f64 } else { 0.0 },
                     aborted: self.engine.control().is_aborted(),
                     commands: self.engine.ledger().summary() }
    }
}

impl ScheduleExecutor for HardwareExecutor {
    fn mode(&self) -> ExecutionMode { ExecutionMode::Hardware }

    fn control(&self) -> ExecutionControl { self.engine.control().clone() }

    fn ledger(&self) -> &CommandLedger { self.engine.ledger() }

    fn execute(&mut self, schedule: &SynthesisSchedule, sink: &dyn ProgressSink) -> Result<Vec<ExecutionResult>, ExecutionError> {
        if !self.backend.is_connected() {
            return Err(ExecutionError::NotConnected);
        }
        info!("starting hardware execution of {} steps ({:?})", schedule.steps.len(), self.policy);
        let control = self.engine.control().clone();
        let engine = &mut self.engine;
        let backend = self.backend.as_mut();
        let results = drive_schedule(schedule,
                                     &self.library,
                                     &self.registry,
                                     &control,
                                     self.policy,
                                     sink,
                                     &mut |step| {
                                         let results = engine.execute(step.commands, step.context, Some(&mut *backend), false);
                                         for r in &results {
                                             sink.emit(&ProgressEvent::CommandCompleted { step_number: step.schedule_step.step_number,
                                                                                          program_step: step.context.sequence_number,
                                                                                          atomic_index: r.atomic_index,
                                                                                          success: r.is_success() });
                                         }
                                         results
                                     });
        if control.is_aborted() {
            warn!("hardware execution aborted; issuing emergency stop");
            self.engine.emergency_stop(self.backend.as_mut());
        }
        info!("hardware execution completed: {} steps processed", results.len());
        self.results = results.clone();
        Ok(results)
    }
}
