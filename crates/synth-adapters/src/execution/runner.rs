//! Ejecución en un hilo de trabajo con control desde el llamador.
//!
//! El plan corre en su propio hilo; el `RunHandle` comparte el
//! `ExecutionControl` del ejecutor para pausar, reanudar, abortar o cambiar
//! la velocidad mientras tanto. `join` devuelve el ejecutor (con su ledger)
//! y los resultados por paso.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, info};

use synth_core::engine::ExecutionControl;

use super::{ExecutionError, ExecutionResult, ProgressSink, ScheduleExecutor};
use crate::coordinator::SynthesisSchedule;

pub struct RunOutcome {
    pub executor: Box<dyn ScheduleExecutor>,
    pub results: Vec<ExecutionResult>,
}

type WorkerResult = (Box<dyn ScheduleExecutor>, Result<Vec<ExecutionResult>, ExecutionError>);

pub struct RunHandle {
    control: ExecutionControl,
    thread: JoinHandle<WorkerResult>,
}

pub struct ScheduleRunner;

impl ScheduleRunner {
    pub fn spawn(mut executor: Box<dyn ScheduleExecutor>,
                 schedule: SynthesisSchedule,
                 sink: Arc<dyn ProgressSink>)
                 -> Result<RunHandle, ExecutionError> {
        let control = executor.control();
        let name = format!("synthesis-{}", schedule.synthesis_id);
        info!("spawning {:?} run {}", executor.mode(), schedule.synthesis_id);
        let thread = thread::Builder::new().name(name)
                                           .spawn(move || {
                                               let result = executor.execute(&schedule, sink.as_ref());
                                               (executor, result)
                                           })
                                           .map_err(|e| ExecutionError::Worker(e.to_string()))?;
        Ok(RunHandle { control, thread })
    }
}

impl RunHandle {
    pub fn control(&self) -> &ExecutionControl { &self.control }

    pub fn pause(&self) {
        debug!("pause requested");
        self.control.pause();
    }

    pub fn resume(&self) {
        debug!("resume requested");
        self.control.resume();
    }

    pub fn abort(&self) {
        info!("abort requested");
        self.control.abort();
    }

    /// Devuelve la velocidad aplicada tras acotarla.
    pub fn set_speed(&self, speed: f64) -> f64 { self.control.set_speed(speed) }

    pub fn is_finished(&self) -> bool { self.thread.is_finished() }

    pub fn join(self) -> Result<RunOutcome, ExecutionError> {
        let (executor, result) = self.thread
                                     .join()
                                     .map_err(|_| ExecutionError::Worker("execution thread panicked".to_string()))?;
        Ok(RunOutcome { executor,
                        results: result? })
    }
}
