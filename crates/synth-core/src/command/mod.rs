//! Comandos atómicos de dispositivo.
//!
//! Cada comando sabe describirse (texto humano), renderizar su forma mock de
//! una línea (estable, independiente del modo de ejecución) y estimar su
//! duración. La ejecución real la hace el motor (`engine`).

pub mod pump;

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_DRAIN_SECONDS, VALVE_MOVE_SECONDS};
pub use pump::{normalize_direction, DirectionSymbol, PumpCalibration, PumpMetrics, PumpMode};

/// Clase de dispositivo destino de un comando.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceClass {
    Valve,
    Pump,
    Solenoid,
    System,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Valve => "vici_valve",
            DeviceClass::Pump => "masterflex_pump",
            DeviceClass::Solenoid => "solenoid_valve",
            DeviceClass::System => "system",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolenoidAction {
    On,
    Off,
    Drain,
}

impl SolenoidAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolenoidAction::On => "on",
            SolenoidAction::Off => "off",
            SolenoidAction::Drain => "drain",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AtomicCommand {
    MoveValve {
        position: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reagent: Option<String>,
    },
    Pump { mode: PumpMode, direction: String },
    Solenoid {
        action: SolenoidAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_seconds: Option<f64>,
    },
    Wait {
        duration_seconds: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

/// Número compacto para textos: hasta 3 decimales, sin ceros finales.
pub fn fmt_quantity(value: f64) -> String {
    let s = format!("{value:.3}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-0" { "0".to_string() } else { s.to_string() }
}

impl AtomicCommand {
    pub fn device_class(&self) -> DeviceClass {
        match self {
            AtomicCommand::MoveValve { .. } => DeviceClass::Valve,
            AtomicCommand::Pump { .. } => DeviceClass::Pump,
            AtomicCommand::Solenoid { .. } => DeviceClass::Solenoid,
            AtomicCommand::Wait { .. } => DeviceClass::System,
        }
    }

    pub fn command_type(&self) -> &'static str {
        match self {
            AtomicCommand::MoveValve { .. } => "move_valve",
            AtomicCommand::Pump { mode: PumpMode::ByVolume { .. }, .. } => "pump_volume",
            AtomicCommand::Pump { mode: PumpMode::ByDuration { .. }, .. } => "pump_time",
            AtomicCommand::Solenoid { .. } => "solenoid",
            AtomicCommand::Wait { .. } => "wait",
        }
    }

    pub fn description(&self) -> String {
        match self {
            AtomicCommand::MoveValve { position, reagent: Some(r) } => format!("Move valve to position {position} ({r})"),
            AtomicCommand::MoveValve { position, reagent: None } => format!("Move valve to position {position}"),
            AtomicCommand::Pump { mode: PumpMode::ByVolume { volume_ml, flow_rate_ml_min }, direction } => {
                format!("Pump {} mL at {} mL/min ({direction})", fmt_quantity(*volume_ml), fmt_quantity(*flow_rate_ml_min))
            }
            AtomicCommand::Pump { mode: PumpMode::ByDuration { duration_seconds, flow_rate_ml_min }, direction } => {
                format!("Pump for {} s at {} mL/min ({direction})",
                        fmt_quantity(*duration_seconds),
                        fmt_quantity(*flow_rate_ml_min))
            }
            AtomicCommand::Solenoid { action, duration_seconds: Some(d) } => {
                format!("Solenoid {} for {} s", action.as_str(), fmt_quantity(*d))
            }
            AtomicCommand::Solenoid { action, duration_seconds: None } => format!("Solenoid {}", action.as_str()),
            AtomicCommand::Wait { duration_seconds, reason } => match reason {
                Some(r) => format!("Wait {} s ({r})", fmt_quantity(*duration_seconds)),
                None => format!("Wait {} s", fmt_quantity(*duration_seconds)),
            },
        }
    }

    /// Texto mock de una línea, usado en el CSV de auditoría y en el progreso.
    pub fn mock_text(&self) -> String {
        match self {
            AtomicCommand::MoveValve { position, reagent } => match reagent {
                Some(r) => format!("move vici to R{position} ({r})"),
                None => format!("move vici to R{position}"),
            },
            AtomicCommand::Pump { mode, direction } => {
                let dir = if direction.eq_ignore_ascii_case("clockwise") {
                    String::new()
                } else {
                    format!(" {direction}")
                };
                match mode {
                    PumpMode::ByVolume { volume_ml, .. } => format!("masterflex pump{dir} {} ml", fmt_quantity(*volume_ml)),
                    PumpMode::ByDuration { duration_seconds, .. } => {
                        format!("masterflex pump{dir} {}s", fmt_quantity(*duration_seconds))
                    }
                }
            }
            AtomicCommand::Solenoid { action, duration_seconds } => match duration_seconds {
                Some(d) => format!("solenoid valve {} {}s", action.as_str(), fmt_quantity(*d)),
                None => format!("solenoid valve {}", action.as_str()),
            },
            AtomicCommand::Wait { duration_seconds, reason } => match reason {
                Some(r) => format!("wait {}s ({r})", fmt_quantity(*duration_seconds)),
                None => format!("wait {}s", fmt_quantity(*duration_seconds)),
            },
        }
    }

    /// Parámetros en orden estable para exportación (`k=v, k=v`).
    pub fn parameters(&self) -> IndexMap<String, String> {
        let mut p = IndexMap::new();
        match self {
            AtomicCommand::MoveValve { position, reagent } => {
                p.insert("position".into(), position.to_string());
                if let Some(r) = reagent {
                    p.insert("reagent".into(), r.clone());
                }
            }
            AtomicCommand::Pump { mode, direction } => {
                match mode {
                    PumpMode::ByVolume { volume_ml, .. } => p.insert("volume_ml".into(), fmt_quantity(*volume_ml)),
                    PumpMode::ByDuration { duration_seconds, .. } => p.insert("duration_seconds".into(), fmt_quantity(*duration_seconds)),
                };
                p.insert("flow_rate_ml_min".into(), fmt_quantity(mode.flow_rate_ml_min()));
                p.insert("direction".into(), direction.clone());
            }
            AtomicCommand::Solenoid { action, duration_seconds } => {
                p.insert("action".into(), action.as_str().to_string());
                if let Some(d) = duration_seconds {
                    p.insert("duration_seconds".into(), fmt_quantity(*d));
                }
            }
            AtomicCommand::Wait { duration_seconds, reason } => {
                p.insert("duration_seconds".into(), fmt_quantity(*duration_seconds));
                if let Some(r) = reason {
                    p.insert("reason".into(), r.clone());
                }
            }
        }
        p
    }

    pub fn rendered_parameters(&self) -> String {
        self.parameters().iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(", ")
    }

    /// Duración estimada en segundos (planificación y simulación).
    pub fn estimated_duration_seconds(&self) -> f64 {
        match self {
            AtomicCommand::MoveValve { .. } => VALVE_MOVE_SECONDS,
            AtomicCommand::Pump { mode: PumpMode::ByVolume { volume_ml, flow_rate_ml_min }, .. } => {
                if *flow_rate_ml_min > 0.0 {
                    volume_ml / flow_rate_ml_min * 60.0
                } else {
                    0.0
                }
            }
            AtomicCommand::Pump { mode: PumpMode::ByDuration { duration_seconds, .. }, .. } => *duration_seconds,
            AtomicCommand::Solenoid { duration_seconds, .. } => duration_seconds.unwrap_or(DEFAULT_DRAIN_SECONDS),
            AtomicCommand::Wait { duration_seconds, .. } => *duration_seconds,
        }
    }
}

impl fmt::Display for AtomicCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.description()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pump_volume(v: f64, dir: &str) -> AtomicCommand {
        AtomicCommand::Pump { mode: PumpMode::ByVolume { volume_ml: v, flow_rate_ml_min: 10.0 },
                              direction: dir.into() }
    }

    #[test]
    fn mock_text_is_stable() {
        let valve = AtomicCommand::MoveValve { position: 2, reagent: Some("Oxyma".into()) };
        assert_eq!(valve.mock_text(), "move vici to R2 (Oxyma)");
        assert_eq!(pump_volume(0.8, "clockwise").mock_text(), "masterflex pump 0.8 ml");
        let transfer = AtomicCommand::Pump { mode: PumpMode::ByDuration { duration_seconds: 60.0, flow_rate_ml_min: 10.0 },
                                             direction: "counterclockwise".into() };
        assert_eq!(transfer.mock_text(), "masterflex pump counterclockwise 60s");
        let drain = AtomicCommand::Solenoid { action: SolenoidAction::Drain, duration_seconds: Some(30.0) };
        assert_eq!(drain.mock_text(), "solenoid valve drain 30s");
        let wait = AtomicCommand::Wait { duration_seconds: 120.0, reason: Some("mixing".into()) };
        assert_eq!(wait.mock_text(), "wait 120s (mixing)");
    }

    #[test]
    fn parameters_render_in_insertion_order() {
        assert_eq!(pump_volume(0.8, "clockwise").rendered_parameters(),
                   "volume_ml=0.8, flow_rate_ml_min=10, direction=clockwise");
    }

    #[test]
    fn estimated_durations() {
        assert_eq!(AtomicCommand::MoveValve { position: 1, reagent: None }.estimated_duration_seconds(), 2.0);
        assert!((pump_volume(5.0, "cw").estimated_duration_seconds() - 30.0).abs() < 1e-9);
        let s = AtomicCommand::Solenoid { action: SolenoidAction::On, duration_seconds: None };
        assert_eq!(s.estimated_duration_seconds(), DEFAULT_DRAIN_SECONDS);
    }

    #[test]
    fn quantity_formatting() {
        assert_eq!(fmt_quantity(0.8000000000000002), "0.8");
        assert_eq!(fmt_quantity(30.0), "30");
        assert_eq!(fmt_quantity(0.0), "0");
        assert_eq!(fmt_quantity(12.3456), "12.346");
    }
}
