//! Programa compilado: pasos ejecutables con parámetros resueltos a una escala.
//!
//! `CompiledProgram` es inmutable y se comparte vía `Arc` desde la caché del
//! compilador. La forma persistida (`ProgramDocument`) añade `compiled_at` y
//! `step_count`; se escribe de forma atómica (`.tmp` + rename).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::expand::LoopContext;
use crate::errors::CoreError;
use crate::hashing::short_hash;

/// Parámetros concretos de un paso tras aplicar la escala objetivo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedParams {
    pub target_scale_mmol: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_ml: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_per_mmol: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valve_position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_context: Option<LoopContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeCalculation {
    pub volume_per_mmol: f64,
    pub target_scale_mmol: f64,
    pub calculated_volume_ml: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutableStep {
    pub sequence_number: u32,
    pub source_step_id: String,
    pub group_id: String,
    pub function_id: String,
    pub resolved_params: ResolvedParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_calculation: Option<VolumeCalculation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    pub estimated_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledProgram {
    pub program_id: String,
    pub source_file: Option<String>,
    pub source_version: String,
    pub target_scale_mmol: f64,
    pub steps: Vec<ExecutableStep>,
    pub estimated_duration_minutes: f64,
    pub content_hash: String,
    /// blake3 del JSON canónico de `steps`.
    pub steps_fingerprint: String,
}

/// Posición de la válvula selectora para un nombre de puerto.
pub fn port_to_valve_position(port: &str) -> u32 {
    match port.trim().to_ascii_uppercase().as_str() {
        "R1" => 1,
        "R2" => 2,
        "R3" => 3,
        "R4" => 4,
        "R5" => 5,
        "R6" => 6,
        "RV" => 7,
        _ => 0,
    }
}

/// Documento persistido de un programa compilado.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramDocument {
    pub program_id: String,
    pub version: String,
    pub source_file: Option<String>,
    pub target_scale_mmol: f64,
    pub compiled_at: DateTime<Utc>,
    pub content_hash: String,
    pub steps: Vec<ExecutableStep>,
    pub step_count: usize,
    pub estimated_duration_minutes: f64,
}

impl CompiledProgram {
    pub fn step_count(&self) -> usize { self.steps.len() }

    pub fn to_document(&self, compiled_at: DateTime<Utc>) -> ProgramDocument {
        ProgramDocument { program_id: self.program_id.clone(),
                          version: self.source_version.clone(),
                          source_file: self.source_file.clone(),
                          target_scale_mmol: self.target_scale_mmol,
                          compiled_at,
                          content_hash: self.content_hash.clone(),
                          steps: self.steps.clone(),
                          step_count: self.steps.len(),
                          estimated_duration_minutes: self.estimated_duration_minutes }
    }

    /// `{program_id}_{escala:.1}mmol_{hash8}.json`, con `.` -> `p` en la escala.
    pub fn file_name(&self) -> String {
        let scale = format!("{:.1}mmol", self.target_scale_mmol).replace('.', "p");
        format!("{}_{}_{}.json", self.program_id, scale, short_hash(&self.content_hash))
    }

    /// Persiste el programa en `dir` y devuelve la ruta final.
    pub fn persist(&self, dir: &Path) -> Result<PathBuf, CoreError> {
        let path = dir.join(self.file_name());
        let doc = serde_json::to_value(self.to_document(Utc::now()))?;
        write_json_atomically(&doc, &path)?;
        Ok(path)
    }
}

/// Reconstruye recursivamente los objetos con claves ordenadas.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sort_keys(v))).collect::<Map<String, Value>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Escribe `value` como JSON indentado con claves ordenadas.
///
/// Escribe primero `<ruta>.tmp` y luego renombra: un fallo a mitad de
/// escritura nunca deja contenido corrupto bajo el nombre final.
pub fn write_json_atomically(value: &Value, path: &Path) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    let body = serde_json::to_string_pretty(&sort_keys(value.clone()))?;
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
