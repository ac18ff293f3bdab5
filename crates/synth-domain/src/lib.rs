// synth-domain library entry point
pub mod config;
pub mod error;
pub mod residue;
pub mod resin;
pub mod sequence;
pub use config::{load_synthesis_config, ConfigError, ScaleConfig, SynthesisConfig};
pub use error::DomainError;
pub use residue::{fmoc_reagent_name, is_difficult, port_reagent, AminoAcid, DIFFICULT_RESIDUES};
pub use resin::{estimate_resin_mass, DEFAULT_RESIN_LOADING_MMOL_G};
pub use sequence::{ParsedSequence, Residue};
