//! `TRANSFER_MV_RV_TIME`: bombea desde la válvula multipuerto al reactor
//! durante un tiempo fijo, en sentido inverso.

use super::params::{time_seconds, ParsedParams};
use super::CompositeFunction;
use crate::command::{AtomicCommand, PumpMode};
use crate::constants::{DEFAULT_FLOW_RATE_ML_MIN, REACTOR_VALVE_POSITION};
use crate::errors::ParamError;
use crate::program::ResolvedParams;

pub const TRANSFER_TO_REACTOR: &str = "TRANSFER_MV_RV_TIME";

#[derive(Debug, Clone, Copy, Default)]
pub struct TransferToReactor;

impl CompositeFunction for TransferToReactor {
    fn function_id(&self) -> &str { TRANSFER_TO_REACTOR }

    fn parse_parameters(&self, params: &ResolvedParams) -> Result<ParsedParams, ParamError> {
        let duration = time_seconds(TRANSFER_TO_REACTOR, params)?
            .ok_or_else(|| ParamError::new(TRANSFER_TO_REACTOR, "time is required (time_seconds or \"60s\")"))?;
        Ok(ParsedParams { valve_position: Some(REACTOR_VALVE_POSITION),
                          volume_ml: None,
                          duration_seconds: Some(duration),
                          flow_rate_ml_min: DEFAULT_FLOW_RATE_ML_MIN })
    }

    fn generate_commands(&self, parsed: &ParsedParams) -> Vec<AtomicCommand> {
        let mut commands = vec![AtomicCommand::MoveValve { position: parsed.valve_position.unwrap_or(REACTOR_VALVE_POSITION),
                                                           reagent: None }];
        if let Some(duration_seconds) = parsed.duration_seconds {
            commands.push(AtomicCommand::Pump { mode: PumpMode::ByDuration { duration_seconds,
                                                                            flow_rate_ml_min: parsed.flow_rate_ml_min },
                                                direction: "counterclockwise".into() });
        }
        commands
    }
}
