//! Errores del core: compilación de programas, funciones compuestas y
//! ejecución de comandos.
//!
//! Los errores de compilación (tabla mal formada, escala inválida, programa
//! desconocido) son fatales y no se reintentan. `DeviceCommError` sólo aparece
//! tras agotar los reintentos locales de un comando.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone, Serialize, Deserialize)]
pub enum CoreError {
    #[error("malformed step table (line {line}): {reason}")]
    MalformedStepTable { line: usize, reason: String },
    #[error("invalid scale {0}: target scale must be > 0 mmol")]
    InvalidScale(f64),
    #[error("step {sequence_number}: unknown function '{function_id}'")]
    UnknownFunction { sequence_number: u32, function_id: String },
    #[error("{0}")]
    Param(#[from] ParamError),
    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),
    #[error("device {device} failed '{command}' after {attempts} attempt(s); last response: {}", or_none(.last_response))]
    DeviceComm { device: String,
                 command: String,
                 attempts: u32,
                 last_response: Option<String> },
    #[error("unknown program '{0}'")]
    UnknownProgram(String),
    #[error("nested loop in group '{group_id}' (line {line}) is not supported")]
    UnsupportedNestedLoop { group_id: String, line: usize },
    #[error("io: {0}")]
    Io(String),
    #[error("serialization: {0}")]
    Serialization(String),
}

/// Fallo de validación de parámetros de una función compuesta.
///
/// Lleva el último mensaje de error de la función; el llamador decide si el
/// paso se aborta.
#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[error("{function_id}: {reason}")]
pub struct ParamError {
    pub function_id: String,
    pub reason: String,
}

impl ParamError {
    pub fn new(function_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { function_id: function_id.into(),
               reason: reason.into() }
    }
}

fn or_none(response: &Option<String>) -> &str { response.as_deref().unwrap_or("<none>") }

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self { Self::Io(e.to_string()) }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self { Self::Serialization(e.to_string()) }
}

impl From<csv::Error> for CoreError {
    fn from(e: csv::Error) -> Self {
        let line = e.position().map(|p| p.line() as usize).unwrap_or(0);
        Self::MalformedStepTable { line,
                                   reason: e.to_string() }
    }
}
