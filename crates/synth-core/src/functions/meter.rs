//! `METER_R{n}_MV`: dosifica reactivo desde el puerto `n` hacia la válvula
//! multipuerto.

use super::params::ParsedParams;
use super::CompositeFunction;
use crate::command::{AtomicCommand, PumpMode};
use crate::constants::DEFAULT_FLOW_RATE_ML_MIN;
use crate::errors::ParamError;
use crate::program::ResolvedParams;

const PREFIX: &str = "METER_R";
const SUFFIX: &str = "_MV";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterReagent {
    function_id: String,
    position: u32,
}

impl MeterReagent {
    pub fn new(position: u32) -> Self {
        Self { function_id: format!("{PREFIX}{position}{SUFFIX}"),
               position }
    }

    /// Reconoce ids `METER_R{n}_MV` (sin distinguir mayúsculas).
    pub fn from_function_id(function_id: &str) -> Option<Self> {
        let upper = function_id.trim().to_ascii_uppercase();
        let n = upper.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
        if n.is_empty() || !n.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        n.parse::<u32>().ok().filter(|p| *p >= 1).map(Self::new)
    }

    pub fn position(&self) -> u32 { self.position }
}

/// Etiqueta del reactivo conectado a cada puerto de la válvula.
pub fn reagent_label(position: u32) -> Option<&'static str> {
    match position {
        1 => Some("AA"),
        2 => Some("Oxyma"),
        3 => Some("pip"),
        4 => Some("DMF"),
        5 => Some("RV"),
        6 => Some("W1"),
        _ => None,
    }
}

impl CompositeFunction for MeterReagent {
    fn function_id(&self) -> &str { &self.function_id }

    fn parse_parameters(&self, params: &ResolvedParams) -> Result<ParsedParams, ParamError> {
        let volume = params.volume_ml
                           .ok_or_else(|| ParamError::new(&self.function_id, "volume_ml is required"))?;
        if !(volume > 0.0) || !volume.is_finite() {
            return Err(ParamError::new(&self.function_id, format!("volume_ml must be > 0, got {volume}")));
        }
        Ok(ParsedParams { valve_position: Some(self.position),
                          volume_ml: Some(volume),
                          duration_seconds: None,
                          flow_rate_ml_min: DEFAULT_FLOW_RATE_ML_MIN })
    }

    fn generate_commands(&self, parsed: &ParsedParams) -> Vec<AtomicCommand> {
        let position = parsed.valve_position.unwrap_or(self.position);
        let mut commands = vec![AtomicCommand::MoveValve { position,
                                                           reagent: reagent_label(position).map(str::to_string) }];
        if let Some(volume_ml) = parsed.volume_ml {
            commands.push(AtomicCommand::Pump { mode: PumpMode::ByVolume { volume_ml,
                                                                          flow_rate_ml_min: parsed.flow_rate_ml_min },
                                                direction: "clockwise".into() });
        }
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_recognition() {
        assert_eq!(MeterReagent::from_function_id("METER_R2_MV").map(|m| m.position()), Some(2));
        assert_eq!(MeterReagent::from_function_id("meter_r12_mv").map(|m| m.position()), Some(12));
        assert!(MeterReagent::from_function_id("METER_R0_MV").is_none());
        assert!(MeterReagent::from_function_id("METER_RX_MV").is_none());
        assert!(MeterReagent::from_function_id("METER_R2").is_none());
    }

    #[test]
    fn emits_valve_then_pump() {
        let f = MeterReagent::new(2);
        let params = ResolvedParams { target_scale_mmol: 0.1,
                                      volume_ml: Some(0.8),
                                      ..Default::default() };
        let cmds = f.expand(&params).unwrap();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0], AtomicCommand::MoveValve { position: 2, reagent: Some("Oxyma".into()) });
        match &cmds[1] {
            AtomicCommand::Pump { mode: PumpMode::ByVolume { volume_ml, flow_rate_ml_min }, direction } => {
                assert!((volume_ml - 0.8).abs() < 1e-12);
                assert_eq!(*flow_rate_ml_min, DEFAULT_FLOW_RATE_ML_MIN);
                assert_eq!(direction, "clockwise");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn volume_is_required_and_positive() {
        let f = MeterReagent::new(1);
        let missing = ResolvedParams { target_scale_mmol: 0.1, ..Default::default() };
        assert!(f.parse_parameters(&missing).unwrap_err().reason.contains("required"));
        let zero = ResolvedParams { volume_ml: Some(0.0), ..missing };
        assert!(f.parse_parameters(&zero).is_err());
    }
}
