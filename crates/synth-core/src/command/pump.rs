//! Bomba peristáltica: modo de operación, dirección y métricas derivadas.
//!
//! Ambos modos convergen en la misma constante física (`ml_per_revolution`):
//! - `ByVolume`: rpm = caudal / mL_rev, revoluciones = volumen / mL_rev
//! - `ByDuration`: rpm igual, sin revoluciones (se corre durante `duration_seconds`)

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_ML_PER_REVOLUTION;
use crate::errors::{CoreError, ParamError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PumpMode {
    ByVolume { volume_ml: f64, flow_rate_ml_min: f64 },
    ByDuration { duration_seconds: f64, flow_rate_ml_min: f64 },
}

impl PumpMode {
    pub fn flow_rate_ml_min(&self) -> f64 {
        match *self {
            PumpMode::ByVolume { flow_rate_ml_min, .. } | PumpMode::ByDuration { flow_rate_ml_min, .. } => flow_rate_ml_min,
        }
    }

    pub fn volume_ml(&self) -> Option<f64> {
        match *self {
            PumpMode::ByVolume { volume_ml, .. } => Some(volume_ml),
            PumpMode::ByDuration { .. } => None,
        }
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        match *self {
            PumpMode::ByDuration { duration_seconds, .. } => Some(duration_seconds),
            PumpMode::ByVolume { .. } => None,
        }
    }
}

/// Sentido de giro en el protocolo del controlador.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirectionSymbol {
    Forward,
    Reverse,
}

impl DirectionSymbol {
    pub fn symbol(&self) -> char {
        match self {
            DirectionSymbol::Forward => '+',
            DirectionSymbol::Reverse => '-',
        }
    }

    pub fn from_symbol(s: &str) -> Option<Self> {
        match s.trim() {
            "+" => Some(DirectionSymbol::Forward),
            "-" => Some(DirectionSymbol::Reverse),
            _ => None,
        }
    }
}

impl fmt::Display for DirectionSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.symbol()) }
}

/// Normaliza nombres libres de dirección ("clockwise", "ccw", "-", ...).
/// Lo que no se reconoce cae en `default` en lugar de fallar: cada revisión
/// de firmware nombra la dirección a su manera.
pub fn normalize_direction(raw: &str, default: DirectionSymbol) -> DirectionSymbol {
    let d = raw.trim().to_ascii_lowercase();
    if d == "-" || d == "ccw" || d.starts_with("counter") || d.starts_with("anti") || d.starts_with("rev") {
        DirectionSymbol::Reverse
    } else if d == "+" || d == "cw" || d.starts_with("clock") || d.starts_with("forw") {
        DirectionSymbol::Forward
    } else {
        default
    }
}

/// Calibración del backend de bombeo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PumpCalibration {
    pub ml_per_revolution: Option<f64>,
    pub default_direction: DirectionSymbol,
}

impl Default for PumpCalibration {
    fn default() -> Self {
        Self { ml_per_revolution: Some(DEFAULT_ML_PER_REVOLUTION),
               default_direction: DirectionSymbol::Forward }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PumpMetrics {
    pub rpm: f64,
    pub revolutions: Option<f64>,
    pub direction: DirectionSymbol,
}

impl PumpCalibration {
    /// Constante de calibración validada; nunca se sustituye por cero.
    pub fn ml_per_revolution(&self) -> Result<f64, CoreError> {
        match self.ml_per_revolution {
            Some(v) if v > 0.0 && v.is_finite() => Ok(v),
            Some(v) => Err(CoreError::InvalidCalibration(format!("ml_per_revolution must be > 0, got {v}"))),
            None => Err(CoreError::InvalidCalibration("ml_per_revolution is not configured".into())),
        }
    }

    pub fn metrics(&self, mode: &PumpMode, direction: &str) -> Result<PumpMetrics, CoreError> {
        let ml_rev = self.ml_per_revolution()?;
        let flow = mode.flow_rate_ml_min();
        if !(flow > 0.0) {
            return Err(ParamError::new("PUMP", format!("flow rate must be > 0 mL/min, got {flow}")).into());
        }
        Ok(PumpMetrics { rpm: flow / ml_rev,
                         revolutions: mode.volume_ml().map(|v| v / ml_rev),
                         direction: normalize_direction(direction, self.default_direction) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_mode_derives_rpm_and_revolutions() {
        let cal = PumpCalibration { ml_per_revolution: Some(0.8),
                                    default_direction: DirectionSymbol::Forward };
        let m = cal.metrics(&PumpMode::ByVolume { volume_ml: 2.0, flow_rate_ml_min: 10.0 }, "clockwise").unwrap();
        assert!((m.rpm - 12.5).abs() < 1e-12);
        assert!((m.revolutions.unwrap() - 2.5).abs() < 1e-12);
        assert_eq!(m.direction, DirectionSymbol::Forward);
    }

    #[test]
    fn duration_mode_has_rpm_but_no_revolutions() {
        let cal = PumpCalibration::default();
        let m = cal.metrics(&PumpMode::ByDuration { duration_seconds: 60.0, flow_rate_ml_min: 8.0 }, "ccw").unwrap();
        assert!((m.rpm - 10.0).abs() < 1e-12);
        assert_eq!(m.revolutions, None);
        assert_eq!(m.direction, DirectionSymbol::Reverse);
    }

    #[test]
    fn zero_or_missing_calibration_is_rejected() {
        let mode = PumpMode::ByVolume { volume_ml: 1.0, flow_rate_ml_min: 10.0 };
        for bad in [Some(0.0), Some(-1.0), None] {
            let cal = PumpCalibration { ml_per_revolution: bad,
                                        default_direction: DirectionSymbol::Forward };
            assert!(matches!(cal.metrics(&mode, "+"), Err(CoreError::InvalidCalibration(_))));
        }
    }

    #[test]
    fn direction_names_normalize_with_default_fallback() {
        let f = DirectionSymbol::Forward;
        let r = DirectionSymbol::Reverse;
        for (raw, expected) in [("clockwise", f), ("CW", f), ("forward", f), ("+", f),
                                ("counterclockwise", r), ("anticlockwise", r), ("reverse", r), ("ccw", r), ("-", r)]
        {
            let opposite = if expected == f { r } else { f };
            assert_eq!(normalize_direction(raw, opposite), expected, "{raw}");
        }
        assert_eq!(normalize_direction("sideways", r), r);
        assert_eq!(normalize_direction("", f), f);
    }
}
