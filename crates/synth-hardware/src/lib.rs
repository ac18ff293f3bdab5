//! synth-hardware: backend de red para el controlador Opta (protocolo de
//! líneas sobre TCP) y su configuración desde el entorno.
pub mod config;
pub mod error;
pub mod opta;

pub use config::{init_dotenv, OptaConfig};
pub use error::HardwareError;
pub use opta::OptaBackend;
