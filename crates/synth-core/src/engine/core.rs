//! `CommandEngine`: ejecuta listas de comandos atómicos contra un backend.
//!
//! Por comando: espera si hay pausa, despacha (o sólo registra en modo
//! seguimiento) y añade exactamente un `CommandRecord` al ledger. Dentro de
//! una lista, un fallo detiene los comandos restantes del mismo paso: una
//! bomba nunca se arranca tras un movimiento de válvula fallido.
//!
//! El abort se comprueba entre pasos (lo hace el llamador); dentro de un
//! paso sólo corta esperas, y las operaciones temporizadas igualmente
//! envían su `STOP`/`OFF`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, error, info};

use super::backend::{BackendSettings, DeviceBackend};
use super::control::{duration_from_secs, ExecutionControl, PauseBehavior};
use super::controller::{BusState, DeviceController, Dispatch};
use super::ledger::{CommandLedger, CommandOutcome, CommandRecord};
use super::retry::{EngineConfig, Sleeper, ThreadSleeper};
use crate::command::{AtomicCommand, PumpMode, SolenoidAction};
use crate::constants::DEFAULT_DRAIN_SECONDS;
use crate::errors::CoreError;

/// Origen de una lista de comandos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    pub sequence_number: u32,
    pub function_id: String,
    pub comments: Option<String>,
    /// Comandos de la misma expansión ya ejecutados en llamadas anteriores;
    /// `atomic_index` se numera a partir de aquí.
    pub atomic_offset: u32,
}

impl CommandContext {
    pub fn new(sequence_number: u32, function_id: impl Into<String>) -> Self {
        Self { sequence_number,
               function_id: function_id.into(),
               comments: None,
               atomic_offset: 0 }
    }

    /// Mismo origen, numerando desde `offset`.
    pub fn at_offset(&self, offset: u32) -> Self {
        Self { atomic_offset: offset,
               ..self.clone() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    pub atomic_index: u32,
    pub command: AtomicCommand,
    pub outcome: CommandOutcome,
    pub attempts: u32,
    pub last_response: Option<String>,
    pub error: Option<CoreError>,
    pub elapsed: Duration,
}

impl CommandResult {
    pub fn is_success(&self) -> bool { self.outcome.is_success() }
}

pub struct CommandEngine {
    config: EngineConfig,
    sleeper: Arc<dyn Sleeper>,
    control: ExecutionControl,
    ledger: CommandLedger,
    bus: BusState,
}

impl std::fmt::Debug for CommandEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEngine")
         .field("config", &self.config)
         .field("records", &self.ledger.len())
         .field("bus", &self.bus)
         .finish()
    }
}

impl Default for CommandEngine {
    fn default() -> Self { Self::new(EngineConfig::default()) }
}

impl CommandEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config,
               sleeper: Arc::new(ThreadSleeper),
               control: ExecutionControl::new(),
               ledger: CommandLedger::new(),
               bus: BusState::default() }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_control(mut self, control: ExecutionControl) -> Self {
        self.control = control;
        self
    }

    pub fn config(&self) -> &EngineConfig { &self.config }
    pub fn control(&self) -> &ExecutionControl { &self.control }
    pub fn sleeper(&self) -> &dyn Sleeper { self.sleeper.as_ref() }
    pub fn ledger(&self) -> &CommandLedger { &self.ledger }
    pub fn into_ledger(self) -> CommandLedger { self.ledger }

    pub fn execute(&mut self,
                   commands: &[AtomicCommand],
                   context: &CommandContext,
                   backend: Option<&mut dyn DeviceBackend>,
                   track_only: bool)
                   -> Vec<CommandResult> {
        let mut backend = if track_only { None } else { backend };
        let settings = match backend.as_deref() {
            Some(b) => b.settings().clone(),
            None => BackendSettings { calibration: self.config.tracking_calibration,
                                      ..Default::default() },
        };

        let mut results = Vec::with_capacity(commands.len());
        for (index, command) in commands.iter().enumerate() {
            let atomic_index = context.atomic_offset + index as u32 + 1;
            if !self.control.wait_while_paused(self.sleeper.as_ref()) {
                info!("step {}: aborted before command {}", context.sequence_number, atomic_index);
                break;
            }
            let started = Instant::now();
            let (outcome, dispatched) = match backend.as_deref_mut() {
                None => (CommandOutcome::Tracked, track(command, &settings)),
                Some(b) => (CommandOutcome::Succeeded, self.dispatch(command, b)),
            };
            let elapsed = started.elapsed();
            let (outcome, dispatch, error) = match dispatched {
                Ok(d) if d.tentative => (CommandOutcome::Tentative, d, None),
                Ok(d) => (outcome, d, None),
                Err(e) => (CommandOutcome::Failed, Dispatch::default(), Some(e)),
            };
            let last_response = match &error {
                Some(CoreError::DeviceComm { last_response, .. }) => last_response.clone(),
                _ => dispatch.last_response.clone(),
            };
            let attempts = match &error {
                Some(CoreError::DeviceComm { attempts, .. }) => *attempts,
                _ => dispatch.attempts,
            };

            let class = command.device_class();
            let record = CommandRecord { sequence: self.ledger.next_sequence(),
                                         program_step: context.sequence_number,
                                         function_id: context.function_id.clone(),
                                         atomic_index,
                                         device_class: class,
                                         device_id: settings.device_ids.for_class(class).to_string(),
                                         command_type: command.command_type().to_string(),
                                         parameters: command.parameters(),
                                         mock_command: command.mock_text(),
                                         estimated_duration_seconds: command.estimated_duration_seconds(),
                                         actual_duration_seconds: (outcome != CommandOutcome::Tracked).then(|| elapsed.as_secs_f64()),
                                         rpm: dispatch.metrics.map(|m| m.rpm),
                                         direction: dispatch.metrics.map(|m| m.direction),
                                         revolutions: dispatch.metrics.and_then(|m| m.revolutions),
                                         outcome,
                                         attempts,
                                         last_response: last_response.clone(),
                                         error: error.as_ref().map(|e| e.to_string()),
                                         comments: context.comments.clone(),
                                         recorded_at: Utc::now() };
            let record = self.ledger.append(record);
            match &error {
                Some(e) => error!("step {} [{}] {} failed: {e}", record.program_step, record.atomic_index, record.mock_command),
                None => debug!("step {} [{}] {} -> {:?}", record.program_step, record.atomic_index, record.mock_command, record.outcome),
            }

            let failed = error.is_some();
            results.push(CommandResult { atomic_index,
                                         command: command.clone(),
                                         outcome,
                                         attempts,
                                         last_response,
                                         error,
                                         elapsed });
            if failed {
                break;
            }
        }
        results
    }

    fn dispatch(&mut self, command: &AtomicCommand, backend: &mut dyn DeviceBackend) -> Result<Dispatch, CoreError> {
        if let AtomicCommand::Wait { duration_seconds, .. } = command {
            let done = self.control.sleep(duration_from_secs(*duration_seconds), self.sleeper.as_ref(), PauseBehavior::Suspend);
            return Ok(Dispatch { interrupted: !done, ..Default::default() });
        }
        let mut device = DeviceController::new(backend, &self.config, self.sleeper.as_ref(), &self.control, &mut self.bus);
        match command {
            AtomicCommand::MoveValve { position, .. } => device.move_valve(*position),
            AtomicCommand::Pump { mode: PumpMode::ByVolume { volume_ml, flow_rate_ml_min }, direction } => {
                device.pump_dispense_volume(*volume_ml, *flow_rate_ml_min, direction)
            }
            AtomicCommand::Pump { mode: PumpMode::ByDuration { duration_seconds, flow_rate_ml_min }, direction } => {
                device.pump_run_for_time(*duration_seconds, *flow_rate_ml_min, direction)
            }
            AtomicCommand::Solenoid { action: SolenoidAction::On, .. } => device.solenoid_on(),
            AtomicCommand::Solenoid { action: SolenoidAction::Off, .. } => device.solenoid_off(),
            AtomicCommand::Solenoid { action: SolenoidAction::Drain, duration_seconds } => {
                device.solenoid_drain(duration_seconds.unwrap_or(DEFAULT_DRAIN_SECONDS))
            }
            AtomicCommand::Wait { .. } => Ok(Dispatch::default()),
        }
    }

    /// Para bomba y solenoide sin reintentos.
    pub fn emergency_stop(&mut self, backend: &mut dyn DeviceBackend) {
        DeviceController::new(backend, &self.config, self.sleeper.as_ref(), &self.control, &mut self.bus).emergency_stop();
    }
}

/// Modo seguimiento: sólo métricas derivadas, sin hardware.
fn track(command: &AtomicCommand, settings: &BackendSettings) -> Result<Dispatch, CoreError> {
    match command {
        AtomicCommand::Pump { mode, direction } => Ok(Dispatch { metrics: Some(settings.calibration.metrics(mode, direction)?),
                                                                 ..Default::default() }),
        _ => Ok(Dispatch::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::{BackendKind, DeviceCommand, TransportError};
    use crate::engine::mock::MockBackend;
    use crate::engine::retry::RecordingSleeper;

    /// Backend que rechaza todo lo dirigido a una clase de dispositivo.
    struct Rejecting {
        settings: BackendSettings,
        reject: crate::command::DeviceClass,
        sent: Vec<String>,
    }

    impl DeviceBackend for Rejecting {
        fn kind(&self) -> BackendKind { BackendKind::Hardware }
        fn settings(&self) -> &BackendSettings { &self.settings }
        fn connect(&mut self) -> bool { true }
        fn disconnect(&mut self) -> bool { true }
        fn is_connected(&self) -> bool { true }
        fn send(&mut self, command: &DeviceCommand) -> Result<String, TransportError> {
            let line = command.wire(&self.settings.device_ids);
            self.sent.push(line.clone());
            if command.device_class() == self.reject {
                Ok(format!("ERROR:{line}"))
            } else {
                Ok(format!("OK:{line}"))
            }
        }
    }

    fn meter_commands() -> Vec<AtomicCommand> {
        vec![AtomicCommand::MoveValve { position: 2,
                                        reagent: Some("Oxyma".into()) },
             AtomicCommand::Pump { mode: PumpMode::ByVolume { volume_ml: 0.8,
                                                              flow_rate_ml_min: 10.0 },
                                   direction: "clockwise".into() }]
    }

    fn engine() -> (CommandEngine, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::new());
        (CommandEngine::default().with_sleeper(sleeper.clone()), sleeper)
    }

    #[test]
    fn track_only_records_metrics_without_sleeping() {
        let (mut engine, sleeper) = engine();
        let results = engine.execute(&meter_commands(), &CommandContext::new(1, "METER_R2_MV"), None, true);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.outcome == CommandOutcome::Tracked));
        let pump = &engine.ledger().records()[1];
        assert_eq!(pump.rpm, Some(12.5));
        assert_eq!(pump.revolutions, Some(1.0));
        assert_eq!(pump.device_id, "MFLEX_01");
        assert!(sleeper.recorded().is_empty());
    }

    #[test]
    fn dispatch_reinitialises_pump_after_valve() {
        let (mut engine, sleeper) = engine();
        let mut backend = MockBackend::new(BackendSettings::default());
        let results = engine.execute(&meter_commands(), &CommandContext::new(1, "METER_R2_MV"), Some(&mut backend), false);
        assert!(results.iter().all(|r| r.outcome == CommandOutcome::Succeeded));
        assert_eq!(backend.sent(),
                   ["VICI_01:GOTO:2", "MFLEX_01:INIT", "MFLEX_01:SPEED:12.5:+", "MFLEX_01:REV:1", "MFLEX_01:START", "MFLEX_01:STOP"]);
        // aislamiento doble válvula -> bomba
        assert_eq!(sleeper.recorded()[0], Duration::from_millis(1000));
    }

    #[test]
    fn failure_stops_remaining_commands_of_the_step() {
        let (mut engine, _) = engine();
        let mut backend = Rejecting { settings: BackendSettings::default(),
                                      reject: crate::command::DeviceClass::Valve,
                                      sent: Vec::new() };
        let results = engine.execute(&meter_commands(), &CommandContext::new(3, "METER_R2_MV"), Some(&mut backend), false);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].attempts, 3);
        assert!(matches!(results[0].error, Some(CoreError::DeviceComm { attempts: 3, .. })));
        assert!(backend.sent.iter().all(|l| l.starts_with("VICI_01")));
        let record = &engine.ledger().records()[0];
        assert_eq!(record.outcome, CommandOutcome::Failed);
        assert_eq!(record.last_response.as_deref(), Some("ERROR:VICI_01:GOTO:2"));
        assert_eq!(engine.ledger().len(), 1);
    }

    #[test]
    fn aborted_engine_attempts_nothing() {
        let (mut engine, _) = engine();
        engine.control().abort();
        let results = engine.execute(&meter_commands(), &CommandContext::new(1, "METER_R2_MV"), None, true);
        assert!(results.is_empty());
        assert!(engine.ledger().is_empty());
    }

    #[test]
    fn offset_context_continues_atomic_numbering() {
        let (mut engine, _) = engine();
        let commands = meter_commands();
        let ctx = CommandContext::new(4, "METER_R2_MV");
        engine.execute(&commands[..1], &ctx, None, true);
        let results = engine.execute(&commands[1..], &ctx.at_offset(1), None, true);
        assert_eq!(results[0].atomic_index, 2);
        let indices: Vec<u32> = engine.ledger().records().iter().map(|r| r.atomic_index).collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[test]
    fn wait_is_paced_in_poll_chunks() {
        let (mut engine, sleeper) = engine();
        let mut backend = MockBackend::new(BackendSettings::default());
        let wait = [AtomicCommand::Wait { duration_seconds: 0.25,
                                          reason: None }];
        engine.execute(&wait, &CommandContext::new(1, "MIX"), Some(&mut backend), false);
        assert_eq!(sleeper.total(), Duration::from_millis(250));
        assert!(backend.sent().is_empty());
    }
}
