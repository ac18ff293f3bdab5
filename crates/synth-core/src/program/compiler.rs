//! Compilador de programas: tabla de pasos -> `CompiledProgram`.
//!
//! Pipeline: parseo -> expansión de bucles -> numeración -> resolución de
//! parámetros a la escala objetivo -> estimación de duración -> hashing.
//!
//! La caché se indexa por `program_id` + `content_hash`; una misma terna
//! (fuente, escala, versión) siempre devuelve el mismo `Arc`.

use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info};
use serde_json::to_value;

use super::compiled::{port_to_valve_position, CompiledProgram, ExecutableStep, ResolvedParams, VolumeCalculation};
use super::expand::{expand_loops, ExpandedStep};
use super::table::parse_step_table;
use crate::constants::{COMPILER_VERSION, DEFAULT_STEP_MINUTES, DEFAULT_TRANSFER_MINUTES};
use crate::errors::CoreError;
use crate::hashing::{content_hash, hash_value, short_hash};

/// Fuente de un programa con nombre.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSource {
    pub program_id: String,
    pub source_file: Option<String>,
    pub text: String,
}

impl ProgramSource {
    pub fn inline(program_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { program_id: program_id.into(),
               source_file: None,
               text: text.into() }
    }
}

#[derive(Debug, Default)]
pub struct ProgramCompiler {
    cache: DashMap<String, Arc<CompiledProgram>>,
}

impl ProgramCompiler {
    pub fn new() -> Self { Self::default() }

    /// Número de programas distintos en caché.
    pub fn cached(&self) -> usize { self.cache.len() }

    pub fn compile(&self, source: &ProgramSource, target_scale_mmol: f64, version: &str) -> Result<Arc<CompiledProgram>, CoreError> {
        if !(target_scale_mmol > 0.0) || !target_scale_mmol.is_finite() {
            return Err(CoreError::InvalidScale(target_scale_mmol));
        }
        let full_version = format!("{version}+{COMPILER_VERSION}");
        let hash = content_hash(source.text.as_bytes(), target_scale_mmol, &full_version);
        let key = format!("{}:{}", source.program_id, hash);
        if let Some(hit) = self.cache.get(&key) {
            debug!("compile cache hit for {} ({})", source.program_id, short_hash(&hash));
            return Ok(Arc::clone(hit.value()));
        }

        let table = parse_step_table(&source.text)?;
        let expanded = expand_loops(&table.steps)?;
        let steps: Vec<ExecutableStep> = expanded.iter().map(|s| resolve_step(s, target_scale_mmol)).collect();
        let estimated_duration_minutes = steps.iter().map(|s| s.estimated_minutes).sum();
        let steps_fingerprint = hash_value(&to_value(&steps)?);

        let program = Arc::new(CompiledProgram { program_id: source.program_id.clone(),
                                                 source_file: source.source_file.clone(),
                                                 source_version: version.to_string(),
                                                 target_scale_mmol,
                                                 steps,
                                                 estimated_duration_minutes,
                                                 content_hash: hash,
                                                 steps_fingerprint });
        info!("compiled {} at {} mmol: {} steps, ~{:.1} min",
              program.program_id,
              target_scale_mmol,
              program.step_count(),
              program.estimated_duration_minutes);
        // Otro hilo pudo compilar la misma terna; nos quedamos con la primera entrada.
        let entry = self.cache.entry(key).or_insert(program);
        Ok(Arc::clone(entry.value()))
    }
}

fn resolve_step(step: &ExpandedStep, target_scale_mmol: f64) -> ExecutableStep {
    let raw = &step.raw;
    let volume_ml = raw.volume_per_scale_unit.map(|f| f * target_scale_mmol);
    let resolved_params = ResolvedParams { target_scale_mmol,
                                           volume_ml,
                                           volume_per_mmol: raw.volume_per_scale_unit,
                                           time_seconds: raw.fixed_time_seconds,
                                           time_minutes: raw.fixed_time_seconds.map(|t| t / 60.0),
                                           source_port: raw.source_port.clone(),
                                           valve_position: raw.source_port.as_deref().map(port_to_valve_position),
                                           dest_port: raw.dest_port.clone(),
                                           param1: raw.legacy.param1.clone(),
                                           param2: raw.legacy.param2.clone(),
                                           loop_context: step.loop_context.clone() };
    let volume_calculation = raw.volume_per_scale_unit.map(|f| VolumeCalculation { volume_per_mmol: f,
                                                                                   target_scale_mmol,
                                                                                   calculated_volume_ml: f * target_scale_mmol });
    ExecutableStep { sequence_number: step.sequence_number,
                     source_step_id: raw.sequence_id.clone(),
                     group_id: raw.group_id.clone(),
                     function_id: raw.function_id.clone(),
                     resolved_params,
                     volume_calculation,
                     comments: raw.comments.clone(),
                     estimated_minutes: estimate_minutes(&raw.function_id, raw.fixed_time_seconds) }
}

/// Estimación de duración de un paso; sólo para planificación.
pub fn estimate_minutes(function_id: &str, time_seconds: Option<f64>) -> f64 {
    match time_seconds {
        Some(t) if t > 0.0 => t / 60.0,
        _ if function_id.starts_with("TRANSFER") => DEFAULT_TRANSFER_MINUTES,
        _ => DEFAULT_STEP_MINUTES,
    }
}
