//! Configuración de síntesis en YAML.
//!
//! ```yaml
//! sequence: FMRF-NH2
//! scale:
//!   target_mmol: 0.1
//!   loading_mmol_g: 0.5
//! default_aa_program: aa_oxyma_dic_v1
//! start_program: resin_swell
//! end_program: final_wash
//! double_couple_difficult: true
//! per_aa_overrides:
//!   3: aa_hbtu_dipea_v1
//! programs_dir: programs
//! build_dir: build/programs
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resin::DEFAULT_RESIN_LOADING_MMOL_G;

pub const DEFAULT_AA_PROGRAM: &str = "aa_oxyma_dic_v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleConfig {
    #[serde(default = "default_target")]
    pub target_mmol: f64,
    #[serde(default = "default_loading")]
    pub loading_mmol_g: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resin_mass_g: Option<f64>,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self { target_mmol: default_target(),
               loading_mmol_g: default_loading(),
               resin_mass_g: None }
    }
}

fn default_target() -> f64 { 0.1 }
fn default_loading() -> f64 { DEFAULT_RESIN_LOADING_MMOL_G }
fn default_program() -> String { DEFAULT_AA_PROGRAM.to_string() }
fn default_true() -> bool { true }
fn default_programs_dir() -> PathBuf { PathBuf::from("programs") }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default, alias = "peptide_sequence")]
    pub sequence: String,
    #[serde(default)]
    pub scale: ScaleConfig,
    #[serde(default = "default_program", alias = "aa_program")]
    pub default_aa_program: String,
    #[serde(default, alias = "begin_program")]
    pub start_program: Option<String>,
    #[serde(default)]
    pub end_program: Option<String>,
    /// Programa por posición (1-based, N -> C tal como se escribe).
    #[serde(default)]
    pub per_aa_overrides: BTreeMap<usize, String>,
    #[serde(default = "default_true")]
    pub double_couple_difficult: bool,
    #[serde(default = "default_programs_dir")]
    pub programs_dir: PathBuf,
    #[serde(default)]
    pub build_dir: Option<PathBuf>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self { sequence: String::new(),
               scale: ScaleConfig::default(),
               default_aa_program: default_program(),
               start_program: None,
               end_program: None,
               per_aa_overrides: BTreeMap::new(),
               double_couple_difficult: true,
               programs_dir: default_programs_dir(),
               build_dir: None }
    }
}

impl SynthesisConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SynthesisConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> { Ok(serde_yaml::to_string(self)?) }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.scale.target_mmol > 0.0) || !self.scale.target_mmol.is_finite() {
            return Err(ConfigError::Invalid(format!("scale.target_mmol must be > 0, got {}", self.scale.target_mmol)));
        }
        if !(self.scale.loading_mmol_g > 0.0) {
            return Err(ConfigError::Invalid(format!("scale.loading_mmol_g must be > 0, got {}", self.scale.loading_mmol_g)));
        }
        if matches!(self.scale.resin_mass_g, Some(m) if !(m > 0.0)) {
            return Err(ConfigError::Invalid("scale.resin_mass_g must be > 0 when set".to_string()));
        }
        if self.default_aa_program.trim().is_empty() {
            return Err(ConfigError::Invalid("default_aa_program must not be empty".to_string()));
        }
        if let Some(pos) = self.per_aa_overrides.keys().find(|&&p| p == 0) {
            return Err(ConfigError::Invalid(format!("per_aa_overrides position {pos} is not 1-based")));
        }
        Ok(())
    }
}

pub fn load_synthesis_config(path: &Path) -> Result<SynthesisConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    SynthesisConfig::from_yaml_str(&content)
}
