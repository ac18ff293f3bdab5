//! Errores del backend de red.

use thiserror::Error;

use synth_core::engine::TransportError;

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("configuration: {0}")]
    Config(String),
    #[error("cannot connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("not connected")]
    NotConnected,
    /// El controlador no respondió o cerró la conexión a mitad de un intercambio.
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
