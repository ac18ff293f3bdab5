//! Configuración de conexión al controlador desde variables de entorno.
//! `OPTA_HOST` es obligatoria; el resto tiene valores por defecto.

use std::env;
use std::time::Duration;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

use synth_core::constants::DEFAULT_ML_PER_REVOLUTION;
use synth_core::engine::{BackendSettings, EngineConfig};
use synth_core::PumpCalibration;

use crate::error::HardwareError;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

pub const DEFAULT_PORT: u16 = 502;
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq)]
pub struct OptaConfig {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub ml_per_revolution: f64,
    pub retry_count: u32,
    pub inter_device_delay: Duration,
    /// Espera tras conectar antes del primer comando.
    pub warmup: Duration,
}

impl OptaConfig {
    pub fn new(host: impl Into<String>) -> Self {
        let engine = EngineConfig::default();
        Self { host: host.into(),
               port: DEFAULT_PORT,
               timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
               ml_per_revolution: DEFAULT_ML_PER_REVOLUTION,
               retry_count: engine.retry_count,
               inter_device_delay: engine.inter_device_delay,
               warmup: Duration::ZERO }
    }

    pub fn from_env() -> Result<Self, HardwareError> {
        // asegura que .env se haya cargado
        Lazy::force(&DOTENV_LOADED);
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env` pero leyendo de `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, HardwareError> {
        let host = lookup("OPTA_HOST").map(|h| h.trim().to_string())
                                      .filter(|h| !h.is_empty())
                                      .ok_or_else(|| HardwareError::Config("OPTA_HOST is not set".into()))?;
        let mut config = Self::new(host);
        if let Some(port) = parsed(&lookup, "OPTA_PORT")? {
            config.port = port;
        }
        if let Some(ms) = parsed::<u64>(&lookup, "OPTA_TIMEOUT_MS")? {
            config.timeout = Duration::from_millis(ms.max(1));
        }
        if let Some(ml) = parsed::<f64>(&lookup, "OPTA_ML_PER_REV")? {
            if !(ml > 0.0) || !ml.is_finite() {
                return Err(HardwareError::Config(format!("OPTA_ML_PER_REV must be > 0, got {ml}")));
            }
            config.ml_per_revolution = ml;
        }
        if let Some(n) = parsed::<u32>(&lookup, "OPTA_RETRY_COUNT")? {
            config.retry_count = n.max(1);
        }
        if let Some(ms) = parsed(&lookup, "OPTA_INTER_DEVICE_DELAY_MS")? {
            config.inter_device_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parsed(&lookup, "OPTA_WARMUP_MS")? {
            config.warmup = Duration::from_millis(ms);
        }
        Ok(config)
    }

    pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings { calibration: PumpCalibration { ml_per_revolution: Some(self.ml_per_revolution),
                                                         ..Default::default() },
                          ..Default::default() }
    }

    /// Configuración del motor con los reintentos y el aislamiento del entorno.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig { retry_count: self.retry_count,
                       inter_device_delay: self.inter_device_delay,
                       tracking_calibration: self.backend_settings().calibration,
                       ..Default::default() }
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, HardwareError> {
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v.parse::<T>()
                    .map(Some)
                    .map_err(|_| HardwareError::Config(format!("{key}: invalid value {v:?}"))),
    }
}

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() { Lazy::force(&DOTENV_LOADED); }
