//! Configuración del motor, política de reintentos y abstracción de espera.

use std::sync::Mutex;
use std::time::Duration;

use crate::command::{DeviceClass, PumpCalibration};

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Intentos por comando (K), incluido el primero.
    pub retry_count: u32,
    /// Retardo base entre intentos para válvula y solenoide.
    pub valve_backoff: Duration,
    /// Retardo base entre intentos para la bomba (tarda más en asentarse).
    pub pump_backoff: Duration,
    /// Aislamiento al cambiar de clase de dispositivo.
    pub inter_device_delay: Duration,
    /// Espera tras detener la bomba.
    pub pump_settling_delay: Duration,
    /// Calibración usada en modo sólo-seguimiento (sin backend).
    pub tracking_calibration: PumpCalibration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { retry_count: 3,
               valve_backoff: Duration::from_millis(300),
               pump_backoff: Duration::from_millis(500),
               inter_device_delay: Duration::from_millis(500),
               pump_settling_delay: Duration::from_millis(500),
               tracking_calibration: PumpCalibration::default() }
    }
}

impl EngineConfig {
    /// Backoff progresivo: intento × base, con base mayor para la bomba.
    pub fn backoff(&self, class: DeviceClass, attempt: u32) -> Duration {
        let base = match class {
            DeviceClass::Pump => self.pump_backoff,
            _ => self.valve_backoff,
        };
        base * attempt.max(1)
    }

    /// Aislamiento antes de hablar con `next` si antes se habló con `previous`.
    /// Válvula -> bomba duplica el retardo.
    pub fn isolation_delay(&self, previous: Option<DeviceClass>, next: DeviceClass) -> Option<Duration> {
        match previous {
            Some(prev) if prev == next => None,
            Some(DeviceClass::Valve) if next == DeviceClass::Pump => Some(self.inter_device_delay * 2),
            Some(_) => Some(self.inter_device_delay),
            None => None,
        }
    }
}

/// Punto único de suspensión del motor; los tests inyectan uno que no duerme.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Registra las esperas solicitadas sin bloquear.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self { Self::default() }

    pub fn recorded(&self) -> Vec<Duration> { self.slept.lock().map(|v| v.clone()).unwrap_or_default() }

    pub fn total(&self) -> Duration { self.recorded().into_iter().sum() }

    pub fn clear(&self) {
        if let Ok(mut v) = self.slept.lock() {
            v.clear();
        }
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut v) = self.slept.lock() {
            v.push(duration);
        }
    }
}
