//! Lectura de parámetros compartida por las funciones compuestas.

use crate::errors::ParamError;
use crate::program::ResolvedParams;

/// Parámetros validados de una función compuesta.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ParsedParams {
    pub valve_position: Option<u32>,
    pub volume_ml: Option<f64>,
    pub duration_seconds: Option<f64>,
    pub flow_rate_ml_min: f64,
}

/// Tiempo del paso en segundos.
///
/// Se acepta el campo numérico `time_seconds` o, en tablas legadas, un
/// `param1`/`param2` con forma `"60s"` o sólo dígitos. Los marcadores de
/// volumen (`v_N`) se ignoran. Cualquier otro texto es un error.
pub fn time_seconds(function_id: &str, params: &ResolvedParams) -> Result<Option<f64>, ParamError> {
    let seconds = match params.time_seconds {
        Some(t) => Some(t),
        None => {
            let candidate = [params.param1.as_deref(), params.param2.as_deref()].into_iter()
                                                                                 .flatten()
                                                                                 .map(str::trim)
                                                                                 .find(|p| !p.is_empty() && !p.starts_with("v_"));
            match candidate {
                None => None,
                Some(raw) => Some(parse_legacy_time(raw).ok_or_else(|| {
                                                             ParamError::new(function_id, format!("unrecognized time value '{raw}'"))
                                                         })?),
            }
        }
    };
    match seconds {
        Some(t) if !(t > 0.0) || !t.is_finite() => Err(ParamError::new(function_id, format!("duration must be > 0 s, got {t}"))),
        other => Ok(other),
    }
}

fn parse_legacy_time(raw: &str) -> Option<f64> {
    let digits = raw.strip_suffix('s').unwrap_or(raw).trim();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    digits.parse::<f64>().ok()
}
