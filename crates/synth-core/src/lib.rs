//! synth-core: compilación determinista de programas de síntesis y motor de
//! ejecución de comandos de dispositivo.
pub mod command;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod functions;
pub mod hashing;
pub mod program;

pub use command::{AtomicCommand, DeviceClass, DirectionSymbol, PumpCalibration, PumpMetrics, PumpMode, SolenoidAction};
pub use engine::{CommandContext, CommandEngine, CommandLedger, CommandOutcome, CommandRecord, DeviceBackend, EngineConfig, ExecutionControl, MockBackend};
pub use errors::{CoreError, ParamError};
pub use functions::{CompositeFunction, FunctionRegistry};
pub use program::{CompiledProgram, ExecutableStep, ProgramCompiler, ProgramLibrary, ProgramSource};
