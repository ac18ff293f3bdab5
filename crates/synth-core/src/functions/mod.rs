//! Funciones compuestas: expanden un paso declarativo en comandos atómicos.
//!
//! `parse_parameters` valida y devuelve `Result`; `generate_commands` es
//! pura (sin I/O ni acceso a dispositivos). El registro es un objeto
//! explícito que se construye una vez y se pasa por referencia.

pub mod meter;
pub mod params;
pub mod timed;
pub mod transfer;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::command::AtomicCommand;
use crate::errors::{CoreError, ParamError};
use crate::program::{CompiledProgram, ExecutableStep, ResolvedParams};

pub use meter::{reagent_label, MeterReagent};
pub use params::ParsedParams;
pub use timed::{Drain, Mix};
pub use transfer::TransferToReactor;

pub trait CompositeFunction: Send + Sync {
    fn function_id(&self) -> &str;
    fn parse_parameters(&self, params: &ResolvedParams) -> Result<ParsedParams, ParamError>;
    fn generate_commands(&self, parsed: &ParsedParams) -> Vec<AtomicCommand>;

    fn expand(&self, params: &ResolvedParams) -> Result<Vec<AtomicCommand>, ParamError> {
        let parsed = self.parse_parameters(params)?;
        Ok(self.generate_commands(&parsed))
    }
}

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, Arc<dyn CompositeFunction>>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry").field("functions", &self.list()).finish()
    }
}

impl FunctionRegistry {
    pub fn empty() -> Self { Self::default() }

    /// Conjunto estándar: dosificación R1..R6, transferencia, mezcla y drenaje.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for position in 1..=6 {
            registry.register(MeterReagent::new(position));
        }
        registry.register(TransferToReactor);
        registry.register(Mix);
        registry.register(Drain);
        registry
    }

    pub fn register<F: CompositeFunction + 'static>(&mut self, function: F) {
        self.functions.insert(function.function_id().to_ascii_uppercase(), Arc::new(function));
    }

    /// Busca por id sin distinguir mayúsculas. Los ids `METER_R{n}_MV` no
    /// registrados se construyen a partir del patrón.
    pub fn lookup(&self, function_id: &str) -> Option<Arc<dyn CompositeFunction>> {
        let key = function_id.trim().to_ascii_uppercase();
        if let Some(f) = self.functions.get(&key) {
            return Some(Arc::clone(f));
        }
        MeterReagent::from_function_id(&key).map(|m| Arc::new(m) as Arc<dyn CompositeFunction>)
    }

    pub fn list(&self) -> Vec<&str> { self.functions.keys().map(String::as_str).collect() }

    /// Expande un paso compilado con el contexto del paso en los errores.
    pub fn expand_step(&self, step: &ExecutableStep) -> Result<Vec<AtomicCommand>, CoreError> {
        let function = self.lookup(&step.function_id)
                           .ok_or_else(|| CoreError::UnknownFunction { sequence_number: step.sequence_number,
                                                                       function_id: step.function_id.clone() })?;
        function.expand(&step.resolved_params)
                .map_err(|e| ParamError::new(e.function_id, format!("step {}: {}", step.sequence_number, e.reason)).into())
    }

    /// Expande todos los pasos sin ejecutar nada; el primer id desconocido o
    /// parámetro inválido se devuelve antes de tocar ningún dispositivo.
    pub fn check_program(&self, program: &CompiledProgram) -> Result<(), CoreError> {
        for step in &program.steps {
            self.expand_step(step)?;
        }
        Ok(())
    }
}
