//! Compilación de programas: tabla de pasos -> pasos expandidos -> programa
//! compilado a una escala concreta.

pub mod compiled;
pub mod compiler;
pub mod expand;
pub mod library;
pub mod table;

pub use compiled::{port_to_valve_position, write_json_atomically, CompiledProgram, ExecutableStep, ProgramDocument, ResolvedParams, VolumeCalculation};
pub use compiler::{estimate_minutes, ProgramCompiler, ProgramSource};
pub use expand::{expand_loops, ExpandedStep, LoopContext};
pub use library::ProgramLibrary;
pub use table::{parse_step_table, LegacyParams, LoopMarker, RawStep, StepTable, StepTableSchema};
