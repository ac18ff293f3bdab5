//! Registro de auditoría de comandos ejecutados.
//!
//! Append-only: el motor añade exactamente un `CommandRecord` por comando
//! intentado (o renderizado en modo mock), con éxito o sin él. Los registros
//! no se modifican después de creados.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::command::{DeviceClass, DirectionSymbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    /// Sólo seguimiento: no se tocó hardware.
    Tracked,
    Succeeded,
    /// Respuesta ambigua aceptada como éxito.
    Tentative,
    Failed,
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool { !matches!(self, CommandOutcome::Failed) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Posición global en el ledger (1-based).
    pub sequence: u64,
    /// `sequence_number` del paso de programa de origen.
    pub program_step: u32,
    pub function_id: String,
    /// Índice (1-based) dentro de la expansión de la función compuesta.
    pub atomic_index: u32,
    pub device_class: DeviceClass,
    pub device_id: String,
    pub command_type: String,
    pub parameters: IndexMap<String, String>,
    pub mock_command: String,
    pub estimated_duration_seconds: f64,
    pub actual_duration_seconds: Option<f64>,
    pub rpm: Option<f64>,
    pub direction: Option<DirectionSymbol>,
    pub revolutions: Option<f64>,
    pub outcome: CommandOutcome,
    pub attempts: u32,
    pub last_response: Option<String>,
    pub error: Option<String>,
    pub comments: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub run_id: Uuid,
    pub total_commands: usize,
    pub failed_commands: usize,
    pub total_estimated_seconds: f64,
    pub average_duration_seconds: f64,
    pub device_usage: BTreeMap<String, usize>,
    pub command_types: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandLedger {
    run_id: Uuid,
    records: Vec<CommandRecord>,
}

impl Default for CommandLedger {
    fn default() -> Self { Self::new() }
}

impl CommandLedger {
    pub fn new() -> Self {
        Self { run_id: Uuid::new_v4(),
               records: Vec::new() }
    }

    pub fn run_id(&self) -> Uuid { self.run_id }

    pub fn records(&self) -> &[CommandRecord] { &self.records }

    pub fn len(&self) -> usize { self.records.len() }

    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    pub fn next_sequence(&self) -> u64 { self.records.len() as u64 + 1 }

    /// Sólo el motor añade registros.
    pub(crate) fn append(&mut self, record: CommandRecord) -> &CommandRecord {
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    pub fn summary(&self) -> LedgerSummary {
        let total_estimated_seconds: f64 = self.records.iter().map(|r| r.estimated_duration_seconds).sum();
        let mut device_usage = BTreeMap::new();
        let mut command_types = BTreeMap::new();
        for r in &self.records {
            *device_usage.entry(r.device_class.as_str().to_string()).or_insert(0) += 1;
            *command_types.entry(r.command_type.clone()).or_insert(0) += 1;
        }
        let total = self.records.len();
        LedgerSummary { run_id: self.run_id,
                        total_commands: total,
                        failed_commands: self.records.iter().filter(|r| r.outcome == CommandOutcome::Failed).count(),
                        total_estimated_seconds,
                        average_duration_seconds: if total > 0 { total_estimated_seconds / total as f64 } else { 0.0 },
                        device_usage,
                        command_types }
    }
}
