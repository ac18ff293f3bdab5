//! Cálculos de resina.

use crate::DomainError;

/// Sustitución típica de resina (mmol/g).
pub const DEFAULT_RESIN_LOADING_MMOL_G: f64 = 0.5;

/// Masa de resina (g) para una escala (mmol) y una sustitución (mmol/g).
pub fn estimate_resin_mass(target_scale_mmol: f64, loading_mmol_g: f64) -> Result<f64, DomainError> {
    if !(loading_mmol_g > 0.0) || !loading_mmol_g.is_finite() {
        return Err(DomainError::ValidationError(format!("resin loading must be > 0 mmol/g, got {loading_mmol_g}")));
    }
    if !(target_scale_mmol > 0.0) || !target_scale_mmol.is_finite() {
        return Err(DomainError::ValidationError(format!("target scale must be > 0 mmol, got {target_scale_mmol}")));
    }
    let mass = target_scale_mmol / loading_mmol_g;
    log::debug!("estimated resin mass: {mass:.3}g for {target_scale_mmol:.3} mmol at {loading_mmol_g} mmol/g");
    Ok(mass)
}
