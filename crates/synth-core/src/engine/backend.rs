//! Interfaz de backend de dispositivos.
//!
//! El backend sólo transporta comandos primitivos y devuelve la respuesta
//! cruda. Reintentos, retardos entre dispositivos, validación de respuestas
//! y el ritmo de las operaciones temporizadas los hace el motor.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::{fmt_quantity, DeviceClass, DirectionSymbol, PumpCalibration};

/// Sabor de backend, fijado al construirlo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    Mock,
    Hardware,
}

/// Identificadores de dispositivo en el controlador.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIds {
    pub valve: String,
    pub pump: String,
    pub solenoid: String,
}

impl Default for DeviceIds {
    fn default() -> Self {
        Self { valve: "VICI_01".into(),
               pump: "MFLEX_01".into(),
               solenoid: "REL_04".into() }
    }
}

impl DeviceIds {
    pub fn for_class(&self, class: DeviceClass) -> &str {
        match class {
            DeviceClass::Valve => &self.valve,
            DeviceClass::Pump => &self.pump,
            DeviceClass::Solenoid => &self.solenoid,
            DeviceClass::System => "SYSTEM",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BackendSettings {
    pub device_ids: DeviceIds,
    pub calibration: PumpCalibration,
}

/// Comando primitivo del protocolo de línea del controlador.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceCommand {
    ValveGoto { position: u32 },
    PumpInit,
    PumpSpeed { rpm: f64, direction: DirectionSymbol },
    PumpRevolutions { revolutions: f64 },
    PumpStart,
    PumpStop,
    SolenoidOn,
    SolenoidOff,
    Status,
}

impl DeviceCommand {
    pub fn device_class(&self) -> DeviceClass {
        match self {
            DeviceCommand::ValveGoto { .. } => DeviceClass::Valve,
            DeviceCommand::PumpInit
            | DeviceCommand::PumpSpeed { .. }
            | DeviceCommand::PumpRevolutions { .. }
            | DeviceCommand::PumpStart
            | DeviceCommand::PumpStop => DeviceClass::Pump,
            DeviceCommand::SolenoidOn | DeviceCommand::SolenoidOff => DeviceClass::Solenoid,
            DeviceCommand::Status => DeviceClass::System,
        }
    }

    /// Texto de línea: `VICI_01:GOTO:2`, `MFLEX_01:SPEED:12.5:+`, `REL_04:ON`, `STATUS`.
    pub fn wire(&self, ids: &DeviceIds) -> String {
        match self {
            DeviceCommand::ValveGoto { position } => format!("{}:GOTO:{position}", ids.valve),
            DeviceCommand::PumpInit => format!("{}:INIT", ids.pump),
            DeviceCommand::PumpSpeed { rpm, direction } => format!("{}:SPEED:{}:{direction}", ids.pump, fmt_quantity(*rpm)),
            DeviceCommand::PumpRevolutions { revolutions } => format!("{}:REV:{}", ids.pump, fmt_quantity(*revolutions)),
            DeviceCommand::PumpStart => format!("{}:START", ids.pump),
            DeviceCommand::PumpStop => format!("{}:STOP", ids.pump),
            DeviceCommand::SolenoidOn => format!("{}:ON", ids.solenoid),
            DeviceCommand::SolenoidOff => format!("{}:OFF", ids.solenoid),
            DeviceCommand::Status => "STATUS".to_string(),
        }
    }
}

/// Fallo de transporte (sin respuesta, desconexión, timeout).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("transport: {0}")]
pub struct TransportError(pub String);

/// Backend de dispositivos. Un único escritor: el motor serializa todo el
/// tráfico a través de `&mut self`.
pub trait DeviceBackend: Send {
    fn kind(&self) -> BackendKind;
    fn settings(&self) -> &BackendSettings;
    fn connect(&mut self) -> bool;
    fn disconnect(&mut self) -> bool;
    fn is_connected(&self) -> bool;
    /// Envía un comando y devuelve la respuesta cruda del controlador.
    fn send(&mut self, command: &DeviceCommand) -> Result<String, TransportError>;
}

impl fmt::Debug for dyn DeviceBackend + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBackend")
         .field("kind", &self.kind())
         .field("connected", &self.is_connected())
         .finish()
    }
}
