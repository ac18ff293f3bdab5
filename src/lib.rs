//! spps-flow
//!
//! Fachada del workspace del sintetizador de péptidos:
//! - `synth_core`: tablas de pasos, compilador, funciones compuestas y motor de comandos.
//! - `synth_domain`: secuencias, residuos, resina y configuración YAML.
//! - `synth_adapters`: coordinador de síntesis y modos de ejecución.
//! - `synth_hardware`: backend TCP del controlador Opta.

pub use synth_adapters;
pub use synth_core;
pub use synth_domain;
pub use synth_hardware;

pub use synth_adapters::{ExecutionMode, ExecutionResult, FailurePolicy, ScheduleExecutor, SynthesisCoordinator, SynthesisOptions, SynthesisSchedule};
pub use synth_core::{CompiledProgram, CoreError, FunctionRegistry, ProgramLibrary};
pub use synth_domain::{ParsedSequence, SynthesisConfig};

/// Compila `sequence` a un plan con las opciones por defecto.
pub fn plan_synthesis(library: std::sync::Arc<ProgramLibrary>,
                      sequence: &str,
                      target_scale_mmol: f64)
                      -> Result<SynthesisSchedule, synth_adapters::CoordinatorError> {
    let parsed = ParsedSequence::parse(sequence)?;
    SynthesisCoordinator::new(library).build_schedule(&parsed, target_scale_mmol, &SynthesisOptions::default())
}
