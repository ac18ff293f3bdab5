//! synth-adapters: planificación de síntesis a partir de una secuencia y
//! ejecución del plan en modo receta, simulación o hardware.
pub mod coordinator;
pub mod execution;

pub use coordinator::{reagent_consumption, synthesis_id, CoordinatorError, SynthesisCoordinator, SynthesisOptions, SynthesisSchedule, SynthesisStep};
pub use execution::{CollectingSink, ExecutionError, ExecutionMode, ExecutionResult, FailurePolicy, HardwareExecutor, LogSink, NullSink, ProgressEvent,
                    ProgressSink, RecipeExecutor, RunHandle, RunOutcome, RunSummary, ScheduleExecutor, ScheduleRunner, SimulationExecutor};
