//! Lectura de tablas de pasos (CSV con cabecera).
//!
//! Se aceptan dos esquemas históricos que se normalizan a `RawStep`:
//! - legado: columnas genéricas `param1`, `param2`, `type`
//! - actual: columnas `volume_per_mmol`, `time_seconds`, `loop_type`, `loop_times`
//!
//! Filas vacías, comentarios (`#` en `step_id`) y filas con `step_id` no
//! numérico se ignoran.

use std::collections::HashMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::constants::LEGACY_VOLUME_FACTOR;
use crate::errors::CoreError;

/// Marcador de bucle que usan ambos esquemas.
pub const LOOP_MARKER: &str = "NL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepTableSchema {
    Legacy,
    Current,
}

/// Marca de bucle de una fila. Todas las filas de un bloque llevan la marca;
/// el número de iteraciones se toma de la primera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopMarker {
    None,
    Repeat { count: Option<u32> },
}

/// Parámetros libres de tablas legadas; algunas funciones compuestas aún los
/// interpretan directamente (p.ej. `"60s"`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyParams {
    pub param1: Option<String>,
    pub param2: Option<String>,
}

/// Una fila útil de la tabla.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStep {
    /// Línea (1-based, cabecera incluida) en el fichero fuente.
    pub line: usize,
    pub sequence_id: String,
    pub group_id: String,
    pub loop_marker: LoopMarker,
    pub function_id: String,
    pub volume_per_scale_unit: Option<f64>,
    pub fixed_time_seconds: Option<f64>,
    pub source_port: Option<String>,
    pub dest_port: Option<String>,
    pub legacy: LegacyParams,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepTable {
    pub schema: StepTableSchema,
    pub steps: Vec<RawStep>,
}

/// Índice de columnas por nombre normalizado.
struct Columns(HashMap<String, usize>);

impl Columns {
    fn has(&self, name: &str) -> bool { self.0.contains_key(name) }

    fn cell<'r>(&self, record: &'r csv::StringRecord, name: &str) -> Option<&'r str> {
        self.0
            .get(name)
            .and_then(|&i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

pub fn parse_step_table(source: &str) -> Result<StepTable, CoreError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true)
                                              .trim(csv::Trim::All)
                                              .from_reader(source.as_bytes());
    let headers = reader.headers()?.clone();
    let columns = Columns(headers.iter()
                                 .enumerate()
                                 .map(|(i, h)| (h.trim().to_ascii_lowercase(), i))
                                 .collect());

    for required in ["step_id", "function_id"] {
        if !columns.has(required) {
            return Err(CoreError::MalformedStepTable { line: 1,
                                                       reason: format!("missing required column '{required}'") });
        }
    }
    let schema = if ["param1", "param2", "type"].iter().all(|c| columns.has(c)) {
        StepTableSchema::Legacy
    } else if ["volume_per_mmol", "time_seconds"].iter().all(|c| columns.has(c)) {
        StepTableSchema::Current
    } else {
        return Err(CoreError::MalformedStepTable { line: 1,
                                                   reason: "unrecognized column schema (expected param1/param2/type or volume_per_mmol/time_seconds)".into() });
    };
    info!("step table schema detected: {:?}", schema);

    let mut steps = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
        let Some(step_id) = columns.cell(&record, "step_id") else { continue };
        if step_id.starts_with('#') || !step_id.chars().all(|c| c.is_ascii_digit()) {
            debug!("skipping row at line {line}: step_id '{step_id}'");
            continue;
        }
        let Some(function_id) = columns.cell(&record, "function_id") else {
            debug!("skipping row at line {line}: empty function_id");
            continue;
        };
        let step = match schema {
            StepTableSchema::Legacy => legacy_row(&columns, &record, line, step_id, function_id)?,
            StepTableSchema::Current => current_row(&columns, &record, line, step_id, function_id)?,
        };
        steps.push(step);
    }
    Ok(StepTable { schema, steps })
}

fn current_row(columns: &Columns,
               record: &csv::StringRecord,
               line: usize,
               step_id: &str,
               function_id: &str)
               -> Result<RawStep, CoreError> {
    let loop_marker = loop_marker(columns, record, line, "loop_type")?;
    let source_port = columns.cell(record, "reagent_port")
                             .or_else(|| columns.cell(record, "source_port"))
                             .map(str::to_string);
    Ok(RawStep { line,
                 sequence_id: step_id.to_string(),
                 group_id: columns.cell(record, "group_id").unwrap_or(step_id).to_string(),
                 loop_marker,
                 function_id: function_id.to_ascii_uppercase(),
                 volume_per_scale_unit: parse_number(columns.cell(record, "volume_per_mmol"), line, "volume_per_mmol")?,
                 fixed_time_seconds: parse_number(columns.cell(record, "time_seconds"), line, "time_seconds")?,
                 source_port,
                 dest_port: columns.cell(record, "dest_port").map(str::to_string),
                 legacy: LegacyParams::default(),
                 comments: columns.cell(record, "comments").map(str::to_string) })
}

fn legacy_row(columns: &Columns,
              record: &csv::StringRecord,
              line: usize,
              step_id: &str,
              function_id: &str)
              -> Result<RawStep, CoreError> {
    let loop_marker = loop_marker(columns, record, line, "type")?;
    let param1 = columns.cell(record, "param1").map(str::to_string);
    let param2 = columns.cell(record, "param2").map(str::to_string);

    // "v_2" -> 2 * factor mL/mmol; un sufijo no numérico queda como parámetro libre.
    let volume_per_scale_unit = param1.as_deref()
                                      .and_then(|p| p.strip_prefix("v_"))
                                      .and_then(|x| x.parse::<f64>().ok())
                                      .map(|x| x * LEGACY_VOLUME_FACTOR);
    let fixed_time_seconds = [param1.as_deref(), param2.as_deref()].into_iter()
                                                                   .flatten()
                                                                   .find_map(parse_seconds_suffix);

    Ok(RawStep { line,
                 sequence_id: step_id.to_string(),
                 group_id: columns.cell(record, "group_id").unwrap_or(step_id).to_string(),
                 loop_marker,
                 function_id: function_id.to_ascii_uppercase(),
                 volume_per_scale_unit,
                 fixed_time_seconds,
                 source_port: None,
                 dest_port: None,
                 legacy: LegacyParams { param1, param2 },
                 comments: columns.cell(record, "comments").map(str::to_string) })
}

fn loop_marker(columns: &Columns, record: &csv::StringRecord, line: usize, type_column: &str) -> Result<LoopMarker, CoreError> {
    match columns.cell(record, type_column) {
        Some(t) if t.eq_ignore_ascii_case(LOOP_MARKER) => {
            let count = match columns.cell(record, "loop_times") {
                Some(raw) => Some(raw.parse::<u32>().map_err(|_| CoreError::MalformedStepTable {
                    line,
                    reason: format!("loop_times '{raw}' is not a non-negative integer"),
                })?),
                None => None,
            };
            Ok(LoopMarker::Repeat { count })
        }
        _ => Ok(LoopMarker::None),
    }
}

fn parse_number(cell: Option<&str>, line: usize, column: &str) -> Result<Option<f64>, CoreError> {
    match cell {
        None => Ok(None),
        Some(raw) => raw.parse::<f64>()
                        .ok()
                        .filter(|v| v.is_finite())
                        .map(Some)
                        .ok_or_else(|| CoreError::MalformedStepTable { line,
                                                                       reason: format!("{column} '{raw}' is not a number") }),
    }
}

/// `"60s"` -> 60.0
pub(crate) fn parse_seconds_suffix(raw: &str) -> Option<f64> {
    raw.trim().strip_suffix('s').and_then(|n| n.trim().parse::<f64>().ok()).filter(|v| v.is_finite())
}
