//! Errores de la CLI y su código de salida.

use thiserror::Error;

use synth_adapters::{CoordinatorError, ExecutionError};
use synth_core::CoreError;
use synth_domain::{ConfigError, DomainError};
use synth_hardware::HardwareError;

pub const EXIT_USAGE: i32 = 2;
pub const EXIT_COMPILE: i32 = 3;
pub const EXIT_EXECUTION: i32 = 4;
pub const EXIT_CONNECTION: i32 = 5;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid argument: {0}")]
    Usage(String),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("sequence: {0}")]
    Sequence(#[from] DomainError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Schedule(#[from] CoordinatorError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("{failed} of {total} steps failed")]
    StepsFailed { failed: usize, total: usize },
    #[error("device connection: {0}")]
    Connection(#[from] HardwareError),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) | CliError::Config(_) | CliError::Sequence(_) => EXIT_USAGE,
            CliError::Core(_) | CliError::Schedule(_) => EXIT_COMPILE,
            CliError::Execution(ExecutionError::NotConnected) | CliError::Connection(_) => EXIT_CONNECTION,
            CliError::Execution(_) | CliError::StepsFailed { .. } => EXIT_EXECUTION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_by_failure_class() {
        assert_eq!(CliError::Usage("x".into()).exit_code(), 2);
        assert_eq!(CliError::Config(ConfigError::Invalid("x".into())).exit_code(), 2);
        assert_eq!(CliError::Core(CoreError::UnknownProgram("p".into())).exit_code(), 3);
        assert_eq!(CliError::StepsFailed { failed: 1, total: 3 }.exit_code(), 4);
        assert_eq!(CliError::Execution(ExecutionError::Worker("x".into())).exit_code(), 4);
        assert_eq!(CliError::Execution(ExecutionError::NotConnected).exit_code(), 5);
        assert_eq!(CliError::Connection(HardwareError::NotConnected).exit_code(), 5);
    }
}
