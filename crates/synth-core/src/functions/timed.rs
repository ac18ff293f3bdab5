//! Funciones sólo temporizadas: mezcla (espera) y drenaje (solenoide).

use super::params::{time_seconds, ParsedParams};
use super::CompositeFunction;
use crate::command::{AtomicCommand, SolenoidAction};
use crate::constants::{DEFAULT_DRAIN_SECONDS, DEFAULT_MIX_SECONDS};
use crate::errors::ParamError;
use crate::program::ResolvedParams;

pub const MIX: &str = "MIX";
pub const DRAIN: &str = "DRAIN_RV_TIME";

/// Agitación. Aún no hay actuador: se modela como una espera.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mix;

#[derive(Debug, Clone, Copy, Default)]
pub struct Drain;

fn timed(function_id: &str, params: &ResolvedParams, default_seconds: f64) -> Result<ParsedParams, ParamError> {
    Ok(ParsedParams { duration_seconds: Some(time_seconds(function_id, params)?.unwrap_or(default_seconds)),
                      ..Default::default() })
}

impl CompositeFunction for Mix {
    fn function_id(&self) -> &str { MIX }

    fn parse_parameters(&self, params: &ResolvedParams) -> Result<ParsedParams, ParamError> { timed(MIX, params, DEFAULT_MIX_SECONDS) }

    fn generate_commands(&self, parsed: &ParsedParams) -> Vec<AtomicCommand> {
        vec![AtomicCommand::Wait { duration_seconds: parsed.duration_seconds.unwrap_or(DEFAULT_MIX_SECONDS),
                                   reason: Some("mixing".into()) }]
    }
}

impl CompositeFunction for Drain {
    fn function_id(&self) -> &str { DRAIN }

    fn parse_parameters(&self, params: &ResolvedParams) -> Result<ParsedParams, ParamError> { timed(DRAIN, params, DEFAULT_DRAIN_SECONDS) }

    fn generate_commands(&self, parsed: &ParsedParams) -> Vec<AtomicCommand> {
        vec![AtomicCommand::Solenoid { action: SolenoidAction::Drain,
                                       duration_seconds: Some(parsed.duration_seconds.unwrap_or(DEFAULT_DRAIN_SECONDS)) }]
    }
}
