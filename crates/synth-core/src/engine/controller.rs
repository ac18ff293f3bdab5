//! Operaciones de dispositivo sobre un backend: la interfaz de capacidades
//! (`move_valve`, `pump_dispense_volume`, `pump_run_for_time`, solenoide).
//!
//! Cada primitiva se envía con reintentos acotados y backoff progresivo. Al
//! cambiar de clase de dispositivo se inserta un retardo de aislamiento;
//! válvula -> bomba usa el doble y reinicializa la bomba, porque su interfaz
//! pierde sincronía si se le habla justo después de la válvula en el bus
//! compartido. Las operaciones temporizadas las detiene el motor: `START`,
//! espera, `STOP`.

use log::{debug, warn};

use super::backend::{DeviceBackend, DeviceCommand};
use super::control::{duration_from_secs, ExecutionControl, PauseBehavior};
use super::response::{classify_response, ResponseVerdict};
use super::retry::{EngineConfig, Sleeper};
use crate::command::{DeviceClass, PumpMetrics, PumpMode};
use crate::errors::CoreError;

/// Última clase de dispositivo direccionada en el bus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusState {
    pub last_class: Option<DeviceClass>,
}

/// Acuse de una primitiva.
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub attempts: u32,
    pub response: String,
    pub tentative: bool,
}

/// Resultado agregado de una operación (varias primitivas).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dispatch {
    pub attempts: u32,
    pub last_response: Option<String>,
    pub tentative: bool,
    pub metrics: Option<PumpMetrics>,
    /// La espera se cortó por un abort (el `STOP`/`OFF` igualmente se envió).
    pub interrupted: bool,
}

impl Dispatch {
    fn absorb(&mut self, ack: Ack) {
        self.attempts += ack.attempts;
        self.tentative |= ack.tentative;
        self.last_response = Some(ack.response);
    }
}

pub struct DeviceController<'a> {
    backend: &'a mut dyn DeviceBackend,
    config: &'a EngineConfig,
    sleeper: &'a dyn Sleeper,
    control: &'a ExecutionControl,
    bus: &'a mut BusState,
}

impl<'a> DeviceController<'a> {
    pub fn new(backend: &'a mut dyn DeviceBackend,
               config: &'a EngineConfig,
               sleeper: &'a dyn Sleeper,
               control: &'a ExecutionControl,
               bus: &'a mut BusState)
               -> Self {
        Self { backend,
               config,
               sleeper,
               control,
               bus }
    }

    pub fn move_valve(&mut self, position: u32) -> Result<Dispatch, CoreError> {
        self.isolate(DeviceClass::Valve);
        let mut d = Dispatch::default();
        d.absorb(self.send(DeviceCommand::ValveGoto { position })?);
        Ok(d)
    }

    pub fn pump_dispense_volume(&mut self, volume_ml: f64, flow_rate_ml_min: f64, direction: &str) -> Result<Dispatch, CoreError> {
        let mode = PumpMode::ByVolume { volume_ml, flow_rate_ml_min };
        let metrics = self.backend.settings().calibration.metrics(&mode, direction)?;
        let revolutions = metrics.revolutions.unwrap_or(0.0);
        self.isolate(DeviceClass::Pump);

        let mut d = Dispatch { metrics: Some(metrics), ..Default::default() };
        d.absorb(self.send(DeviceCommand::PumpSpeed { rpm: metrics.rpm,
                                                      direction: metrics.direction })?);
        d.absorb(self.send(DeviceCommand::PumpRevolutions { revolutions })?);
        let run = (revolutions / metrics.rpm * 60.0).max(1.0);
        self.run_pump(d, run)
    }

    pub fn pump_run_for_time(&mut self, duration_seconds: f64, flow_rate_ml_min: f64, direction: &str) -> Result<Dispatch, CoreError> {
        let mode = PumpMode::ByDuration { duration_seconds, flow_rate_ml_min };
        let metrics = self.backend.settings().calibration.metrics(&mode, direction)?;
        self.isolate(DeviceClass::Pump);

        let mut d = Dispatch { metrics: Some(metrics), ..Default::default() };
        d.absorb(self.send(DeviceCommand::PumpSpeed { rpm: metrics.rpm,
                                                      direction: metrics.direction })?);
        self.run_pump(d, duration_seconds)
    }

    /// START, espera `seconds`, STOP (siempre), asentamiento.
    fn run_pump(&mut self, mut d: Dispatch, seconds: f64) -> Result<Dispatch, CoreError> {
        match self.send(DeviceCommand::PumpStart) {
            Ok(ack) => d.absorb(ack),
            Err(e) => {
                self.best_effort(DeviceCommand::PumpStop);
                return Err(e);
            }
        }
        d.interrupted = !self.control.sleep(duration_from_secs(seconds), self.sleeper, PauseBehavior::Ignore);
        if d.interrupted {
            warn!("pump run interrupted by abort; stopping pump");
        }
        d.absorb(self.send(DeviceCommand::PumpStop)?);
        self.sleeper.sleep(self.config.pump_settling_delay);
        Ok(d)
    }

    pub fn solenoid_on(&mut self) -> Result<Dispatch, CoreError> {
        self.isolate(DeviceClass::Solenoid);
        let mut d = Dispatch::default();
        d.absorb(self.send(DeviceCommand::SolenoidOn)?);
        Ok(d)
    }

    pub fn solenoid_off(&mut self) -> Result<Dispatch, CoreError> {
        self.isolate(DeviceClass::Solenoid);
        let mut d = Dispatch::default();
        d.absorb(self.send(DeviceCommand::SolenoidOff)?);
        Ok(d)
    }

    /// ON, espera, OFF (siempre).
    pub fn solenoid_drain(&mut self, duration_seconds: f64) -> Result<Dispatch, CoreError> {
        let mut d = self.solenoid_on()?;
        d.interrupted = !self.control.sleep(duration_from_secs(duration_seconds), self.sleeper, PauseBehavior::Ignore);
        d.absorb(self.send(DeviceCommand::SolenoidOff)?);
        Ok(d)
    }

    /// Para la bomba y cierra el solenoide ignorando fallos.
    pub fn emergency_stop(&mut self) {
        warn!("emergency stop: pump STOP + solenoid OFF");
        self.best_effort(DeviceCommand::PumpStop);
        self.best_effort(DeviceCommand::SolenoidOff);
    }

    fn best_effort(&mut self, command: DeviceCommand) {
        if let Err(e) = self.backend.send(&command) {
            warn!("{} failed: {e}", command.wire(&self.backend.settings().device_ids));
        }
    }

    fn isolate(&mut self, next: DeviceClass) {
        let previous = self.bus.last_class;
        if let Some(delay) = self.config.isolation_delay(previous, next) {
            debug!("isolation delay {:?} -> {:?}: {}ms", previous, next, delay.as_millis());
            self.sleeper.sleep(delay);
            if previous == Some(DeviceClass::Valve) && next == DeviceClass::Pump {
                if let Err(e) = self.send(DeviceCommand::PumpInit) {
                    warn!("pump re-init after valve command failed: {e}");
                }
            }
        }
        self.bus.last_class = Some(next);
    }

    /// Envía una primitiva con hasta K intentos.
    pub fn send(&mut self, command: DeviceCommand) -> Result<Ack, CoreError> {
        let class = command.device_class();
        let ids = self.backend.settings().device_ids.clone();
        let wire = command.wire(&ids);
        let attempts = self.config.retry_count.max(1);
        let mut last_response = None;

        for attempt in 1..=attempts {
            match self.backend.send(&command) {
                Ok(raw) => match classify_response(&raw) {
                    ResponseVerdict::Accepted => {
                        debug!("{wire} -> {raw}");
                        return Ok(Ack { attempts: attempt,
                                        response: raw,
                                        tentative: false });
                    }
                    ResponseVerdict::Tentative => {
                        warn!("ambiguous response to {wire}: {raw:?} (treated as success)");
                        return Ok(Ack { attempts: attempt,
                                        response: raw,
                                        tentative: true });
                    }
                    ResponseVerdict::Rejected => last_response = Some(raw),
                },
                Err(e) => debug!("{wire}: {e}"),
            }
            if attempt < attempts {
                let delay = self.config.backoff(class, attempt);
                warn!("retryable device error (attempt {}): {} -> sleeping {}ms", attempt, wire, delay.as_millis());
                self.sleeper.sleep(delay);
            }
        }
        Err(CoreError::DeviceComm { device: ids.for_class(class).to_string(),
                                    command: wire,
                                    attempts,
                                    last_response })
    }
}
