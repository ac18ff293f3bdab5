//! Eventos de progreso y sumideros.

use std::sync::Mutex;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::ExecutionResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    StepStarted {
        step_number: u32,
        residue_code: Option<String>,
        program_name: String,
        total_steps: usize,
    },
    CommandStarted {
        step_number: u32,
        program_step: u32,
        atomic_index: u32,
        description: String,
        estimated_seconds: f64,
    },
    CommandProgress {
        step_number: u32,
        program_step: u32,
        atomic_index: u32,
        fraction: f64,
        elapsed_seconds: f64,
    },
    CommandCompleted {
        step_number: u32,
        program_step: u32,
        atomic_index: u32,
        success: bool,
    },
    StepCompleted {
        result: ExecutionResult,
    },
    Aborted {
        step_number: u32,
    },
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: &ProgressEvent) {}
}

/// Vuelca los eventos al log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::StepStarted { step_number,
                                         residue_code,
                                         program_name,
                                         total_steps, } => {
                info!("[{step_number}/{total_steps}] {} - {program_name}", residue_code.as_deref().unwrap_or("program"))
            }
            ProgressEvent::CommandStarted { program_step, description, .. } => debug!("  step {program_step}: {description}"),
            ProgressEvent::CommandProgress { .. } => {}
            ProgressEvent::CommandCompleted { program_step,
                                              atomic_index,
                                              success: false,
                                              .. } => warn!("  step {program_step} [{atomic_index}] failed"),
            ProgressEvent::CommandCompleted { .. } => {}
            ProgressEvent::StepCompleted { result } => info!("step {} done: success={} commands={} ({:.1}s)",
                                                             result.step_number,
                                                             result.success,
                                                             result.commands_executed,
                                                             result.elapsed_seconds),
            ProgressEvent::Aborted { step_number } => warn!("aborted at step {step_number}"),
        }
    }
}

/// Acumula eventos en memoria (tests, UIs que sondean).
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self { Self::default() }

    pub fn events(&self) -> Vec<ProgressEvent> { self.events.lock().map(|e| e.clone()).unwrap_or_default() }
}

impl ProgressSink for CollectingSink {
    fn emit(&self, event: &ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
