//! Coordinador de síntesis: secuencia + escala -> `SynthesisSchedule`.
//!
//! Recorre la secuencia del C-terminal al N-terminal (orden SPPS, fijo) y
//! asigna a cada residuo su programa. Tiempos y consumos salen de compilar
//! cada programa a la escala objetivo. Un programa inexistente aborta la
//! construcción con `UnknownProgram`; nunca se salta un residuo. Cada
//! programa se expande además contra el `FunctionRegistry` antes de aceptar
//! el plan: una función desconocida es un error de receta y debe salir aquí,
//! no a mitad de una síntesis con reactivos ya dosificados.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use synth_core::functions::MeterReagent;
use synth_core::program::{write_json_atomically, CompiledProgram, ProgramLibrary};
use synth_core::{CoreError, FunctionRegistry};
use synth_domain::{estimate_resin_mass, is_difficult, port_reagent, DomainError, ParsedSequence, SynthesisConfig,
                   DEFAULT_RESIN_LOADING_MMOL_G};

pub const DEFAULT_RESIDUE_PROGRAM: &str = synth_domain::config::DEFAULT_AA_PROGRAM;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl CoordinatorError {
    pub fn is_unknown_program(&self) -> bool { matches!(self, CoordinatorError::Core(CoreError::UnknownProgram(_))) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisOptions {
    pub resin_loading_mmol_g: f64,
    pub resin_mass_g: Option<f64>,
    pub residue_program: String,
    /// Programa por posición del residuo (1-based, tal como se escribe).
    pub residue_overrides: BTreeMap<usize, String>,
    pub begin_program: Option<String>,
    pub end_program: Option<String>,
    pub double_couple_difficult: bool,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self { resin_loading_mmol_g: DEFAULT_RESIN_LOADING_MMOL_G,
               resin_mass_g: None,
               residue_program: DEFAULT_RESIDUE_PROGRAM.to_string(),
               residue_overrides: BTreeMap::new(),
               begin_program: None,
               end_program: None,
               double_couple_difficult: false }
    }
}

impl From<&SynthesisConfig> for SynthesisOptions {
    fn from(c: &SynthesisConfig) -> Self {
        Self { resin_loading_mmol_g: c.scale.loading_mmol_g,
               resin_mass_g: c.scale.resin_mass_g,
               residue_program: c.default_aa_program.clone(),
               residue_overrides: c.per_aa_overrides.clone(),
               begin_program: c.start_program.clone(),
               end_program: c.end_program.clone(),
               double_couple_difficult: c.double_couple_difficult }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisStep {
    pub step_number: u32,
    pub residue_code: Option<String>,
    pub program_name: String,
    pub parameters: BTreeMap<String, Value>,
    pub estimated_time_minutes: f64,
    pub reagents_consumed: BTreeMap<String, f64>,
    pub notes: Option<String>,
}

impl SynthesisStep {
    /// Escala a la que se compila el programa del paso.
    pub fn target_scale_mmol(&self) -> Option<f64> { self.parameters.get("target_scale_mmol").and_then(Value::as_f64) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisSchedule {
    pub synthesis_id: String,
    pub peptide_sequence: String,
    pub target_scale_mmol: f64,
    pub resin_mass_g: f64,
    pub steps: Vec<SynthesisStep>,
    pub total_estimated_time_minutes: f64,
    pub total_reagent_consumption: BTreeMap<String, f64>,
    pub created_at: DateTime<Utc>,
}

impl SynthesisSchedule {
    pub fn coupling_steps(&self) -> impl Iterator<Item = &SynthesisStep> { self.steps.iter().filter(|s| s.residue_code.is_some()) }

    /// Guarda el plan como JSON (temporal + rename).
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        write_json_atomically(&serde_json::to_value(self)?, path)?;
        info!("saved synthesis schedule to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisCoordinator {
    library: Arc<ProgramLibrary>,
    registry: Arc<FunctionRegistry>,
}

impl SynthesisCoordinator {
    pub fn new(library: Arc<ProgramLibrary>) -> Self {
        Self { library,
               registry: Arc::new(FunctionRegistry::with_defaults()) }
    }

    /// Registro contra el que se validan los programas (el mismo que usará el ejecutor).
    pub fn with_registry(mut self, registry: Arc<FunctionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn library(&self) -> &Arc<ProgramLibrary> { &self.library }

    pub fn registry(&self) -> &Arc<FunctionRegistry> { &self.registry }

    /// Compila y comprueba que cada paso se puede expandir.
    fn checked_program(&self, program_name: &str, scale: f64) -> Result<Arc<CompiledProgram>, CoreError> {
        let program = self.library.compile_for_scale(program_name, scale)?;
        self.registry.check_program(&program)?;
        Ok(program)
    }

    pub fn build_schedule(&self,
                          parsed: &ParsedSequence,
                          target_scale_mmol: f64,
                          options: &SynthesisOptions)
                          -> Result<SynthesisSchedule, CoordinatorError> {
        if !(target_scale_mmol > 0.0) || !target_scale_mmol.is_finite() {
            return Err(CoreError::InvalidScale(target_scale_mmol).into());
        }
        let resin_mass_g = match options.resin_mass_g {
            Some(m) if m > 0.0 => m,
            _ => estimate_resin_mass(target_scale_mmol, options.resin_loading_mmol_g)?,
        };
        info!("building schedule for {} at {target_scale_mmol} mmol", parsed.sequence);

        let mut steps = Vec::new();
        if let Some(program) = &options.begin_program {
            steps.push(self.program_step(steps.len() as u32 + 1, program, target_scale_mmol, resin_mass_g, "Initial setup program")?);
        }
        for residue in parsed.synthesis_order() {
            let program = options.residue_overrides
                                 .get(&residue.position)
                                 .unwrap_or(&options.residue_program);
            let note = format!("Couple {} ({})", residue.code, residue.reagent);
            steps.push(self.residue_step(steps.len() as u32 + 1, &residue.code, &residue.reagent, program, target_scale_mmol, resin_mass_g, note)?);
            if options.double_couple_difficult && is_difficult(&residue.code) {
                let note = format!("Double coupling for difficult AA: {}", residue.code);
                steps.push(self.residue_step(steps.len() as u32 + 1, &residue.code, &residue.reagent, program, target_scale_mmol, resin_mass_g, note)?);
            }
        }
        if let Some(program) = &options.end_program {
            steps.push(self.program_step(steps.len() as u32 + 1, program, target_scale_mmol, resin_mass_g, "Final cleavage/workup program")?);
        }

        let total_estimated_time_minutes = steps.iter().map(|s| s.estimated_time_minutes).sum();
        let mut total_reagent_consumption = BTreeMap::new();
        for step in &steps {
            for (reagent, ml) in &step.reagents_consumed {
                *total_reagent_consumption.entry(reagent.clone()).or_insert(0.0) += ml;
            }
        }
        let created_at = Utc::now();
        let schedule = SynthesisSchedule { synthesis_id: synthesis_id(parsed, created_at),
                                           peptide_sequence: parsed.to_string(),
                                           target_scale_mmol,
                                           resin_mass_g,
                                           steps,
                                           total_estimated_time_minutes,
                                           total_reagent_consumption,
                                           created_at };
        info!("created schedule with {} steps, estimated time: {:.1} minutes",
              schedule.steps.len(),
              schedule.total_estimated_time_minutes);
        Ok(schedule)
    }

    #[allow(clippy::too_many_arguments)]
    fn residue_step(&self,
                    step_number: u32,
                    code: &str,
                    reagent: &str,
                    program_name: &str,
                    scale: f64,
                    resin_mass_g: f64,
                    notes: String)
                    -> Result<SynthesisStep, CoreError> {
        let program = self.checked_program(program_name, scale)?;
        let parameters = BTreeMap::from([("amino_acid".to_string(), json!(code)),
                                         ("aa_reagent".to_string(), json!(reagent)),
                                         ("target_scale_mmol".to_string(), json!(scale)),
                                         ("resin_mass_g".to_string(), json!(resin_mass_g))]);
        Ok(SynthesisStep { step_number,
                           residue_code: Some(code.to_string()),
                           program_name: program_name.to_string(),
                           parameters,
                           estimated_time_minutes: program.estimated_duration_minutes,
                           reagents_consumed: reagent_consumption(&program, Some(code)),
                           notes: Some(notes) })
    }

    fn program_step(&self, step_number: u32, program_name: &str, scale: f64, resin_mass_g: f64, notes: &str) -> Result<SynthesisStep, CoreError> {
        let program = self.checked_program(program_name, scale)?;
        let parameters = BTreeMap::from([("target_scale_mmol".to_string(), json!(scale)), ("resin_mass_g".to_string(), json!(resin_mass_g))]);
        Ok(SynthesisStep { step_number,
                           residue_code: None,
                           program_name: program_name.to_string(),
                           parameters,
                           estimated_time_minutes: program.estimated_duration_minutes,
                           reagents_consumed: reagent_consumption(&program, None),
                           notes: Some(notes.to_string()) })
    }
}

/// Suma de volúmenes por reactivo. Sin puerto de origen explícito se usa el
/// que implica la función (`METER_R2_MV` -> R2).
pub fn reagent_consumption(program: &CompiledProgram, residue_code: Option<&str>) -> BTreeMap<String, f64> {
    let mut consumed = BTreeMap::new();
    for step in &program.steps {
        let Some(volume) = step.resolved_params.volume_ml.filter(|v| *v > 0.0) else { continue };
        let port = step.resolved_params
                       .source_port
                       .clone()
                       .or_else(|| MeterReagent::from_function_id(&step.function_id).map(|m| format!("R{}", m.position())))
                       .unwrap_or_default();
        *consumed.entry(port_reagent(&port, residue_code)).or_insert(0.0) += volume;
    }
    consumed
}

/// `SYNTH_{códigos}_{YYYYmmdd_HHMMSS}`; más de 10 códigos se recortan con `...`.
pub fn synthesis_id(parsed: &ParsedSequence, at: DateTime<Utc>) -> String {
    let codes: String = parsed.codes().concat();
    let short = if codes.chars().count() > 10 {
        format!("{}...", codes.chars().take(10).collect::<String>())
    } else {
        codes
    };
    format!("SYNTH_{short}_{}", at.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use synth_core::functions::ParsedParams;
    use synth_core::program::ResolvedParams;
    use synth_core::{AtomicCommand, CompositeFunction, ParamError, ProgramSource};

    const COUPLE: &str = "\
step_id,group_id,loop_type,loop_times,function_id,volume_per_mmol,time_seconds,reagent_port,dest_port,comments
1,1,,,METER_R1_MV,20,,,,amino acid
2,2,,,METER_R2_MV,10,,,,activator
3,3,,,TRANSFER_MV_RV_TIME,,60,,,
4,4,,,MIX,,600,,,
5,5,,,DRAIN_RV_TIME,,30,,,
";

    fn coordinator() -> SynthesisCoordinator {
        let mut library = ProgramLibrary::new();
        library.insert(ProgramSource::inline(DEFAULT_RESIDUE_PROGRAM, COUPLE));
        library.insert(ProgramSource::inline("swell", "step_id,group_id,function_id,volume_per_mmol,time_seconds\n1,1,METER_R4_MV,50,\n"));
        SynthesisCoordinator::new(Arc::new(library))
    }

    #[test]
    fn couples_from_c_to_n_terminus() {
        let schedule = coordinator().build_schedule(&ParsedSequence::from_codes(["A", "B", "C"]), 0.1, &SynthesisOptions::default())
                                    .unwrap();
        let order: Vec<&str> = schedule.coupling_steps().filter_map(|s| s.residue_code.as_deref()).collect();
        assert_eq!(order, vec!["C", "B", "A"]);
        assert_eq!(schedule.steps[0].residue_code.as_deref(), Some("C"));
        assert_eq!(schedule.steps[0].notes.as_deref(), Some("Couple C (Fmoc-C(Trt))"));
        assert!((schedule.resin_mass_g - 0.2).abs() < 1e-12);
    }

    #[test]
    fn consumption_and_time_come_from_compiled_program() {
        let schedule = coordinator().build_schedule(&ParsedSequence::from_codes(["K"]), 0.1, &SynthesisOptions::default())
                                    .unwrap();
        let step = &schedule.steps[0];
        // R1 se contabiliza como `Fmoc-{aa}`; el nombre protegido sólo va en la nota.
        assert!((step.reagents_consumed["Fmoc-K"] - 2.0).abs() < 1e-9);
        assert!(!step.reagents_consumed.contains_key("Fmoc-K(Boc)"));
        assert_eq!(step.notes.as_deref(), Some("Couple K (Fmoc-K(Boc))"));
        assert!((step.reagents_consumed["Activator"] - 1.0).abs() < 1e-9);
        // 0.5 + 0.5 + 1 + 10 + 0.5
        assert!((step.estimated_time_minutes - 12.5).abs() < 1e-9);
        assert_eq!(step.target_scale_mmol(), Some(0.1));
    }

    #[test]
    fn begin_end_and_double_coupling() {
        let options = SynthesisOptions { begin_program: Some("swell".into()),
                                         end_program: Some("swell".into()),
                                         double_couple_difficult: true,
                                         ..Default::default() };
        let schedule = coordinator().build_schedule(&ParsedSequence::parse("GA").unwrap(), 0.2, &options).unwrap();
        let programs: Vec<(Option<&str>, &str)> = schedule.steps.iter().map(|s| (s.residue_code.as_deref(), s.program_name.as_str())).collect();
        assert_eq!(programs.len(), 5);
        assert_eq!(programs[0], (None, "swell"));
        assert_eq!(programs[1].0, Some("A"));
        assert_eq!(programs[2].0, Some("G"));
        assert_eq!(schedule.steps[3].notes.as_deref(), Some("Double coupling for difficult AA: G"));
        assert_eq!(schedule.steps[4].notes.as_deref(), Some("Final cleavage/workup program"));
        assert_eq!(schedule.steps.iter().map(|s| s.step_number).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert!((schedule.total_reagent_consumption["DMF"] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn missing_program_fails_fast() {
        let options = SynthesisOptions { residue_overrides: BTreeMap::from([(2, "nope".to_string())]),
                                         ..Default::default() };
        let err = coordinator().build_schedule(&ParsedSequence::from_codes(["A", "G"]), 0.1, &options).unwrap_err();
        assert!(err.is_unknown_program());
    }

    #[test]
    fn unknown_function_is_rejected_before_any_step_runs() {
        let mut library = ProgramLibrary::new();
        library.insert(ProgramSource::inline(DEFAULT_RESIDUE_PROGRAM,
                                             "step_id,group_id,function_id,volume_per_mmol,time_seconds\n1,1,METER_R2_MV,8,\n2,2,HEAT_RV,,60\n"));
        let coordinator = SynthesisCoordinator::new(Arc::new(library));
        let err = coordinator.build_schedule(&ParsedSequence::parse("AG").unwrap(), 0.1, &SynthesisOptions::default())
                             .unwrap_err();
        match err {
            CoordinatorError::Core(CoreError::UnknownFunction { sequence_number, function_id }) => {
                assert_eq!(sequence_number, 2);
                assert_eq!(function_id, "HEAT_RV");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parameter_errors_surface_at_schedule_time() {
        let mut library = ProgramLibrary::new();
        // MIX con duración negativa no se puede expandir
        library.insert(ProgramSource::inline(DEFAULT_RESIDUE_PROGRAM, "step_id,group_id,function_id,volume_per_mmol,time_seconds\n1,1,MIX,,-5\n"));
        let err = SynthesisCoordinator::new(Arc::new(library)).build_schedule(&ParsedSequence::from_codes(["A"]), 0.1, &SynthesisOptions::default())
                                                               .unwrap_err();
        assert!(matches!(err, CoordinatorError::Core(CoreError::Param(_))), "{err:?}");
    }

    #[test]
    fn custom_registry_accepts_extra_functions() {
        struct Heat;
        impl CompositeFunction for Heat {
            fn function_id(&self) -> &str { "HEAT_RV" }
            fn parse_parameters(&self, _p: &ResolvedParams) -> Result<ParsedParams, ParamError> { Ok(ParsedParams::default()) }
            fn generate_commands(&self, _p: &ParsedParams) -> Vec<AtomicCommand> { Vec::new() }
        }
        let mut library = ProgramLibrary::new();
        library.insert(ProgramSource::inline(DEFAULT_RESIDUE_PROGRAM, "step_id,group_id,function_id,volume_per_mmol,time_seconds\n1,1,HEAT_RV,,60\n"));
        let mut registry = FunctionRegistry::with_defaults();
        registry.register(Heat);
        let schedule = SynthesisCoordinator::new(Arc::new(library)).with_registry(Arc::new(registry))
                                                                   .build_schedule(&ParsedSequence::from_codes(["A"]), 0.1, &SynthesisOptions::default())
                                                                   .unwrap();
        assert_eq!(schedule.steps.len(), 1);
    }

    #[test]
    fn synthesis_id_truncates_long_sequences() {
        let at = DateTime::parse_from_rfc3339("2024-03-01T10:20:30Z").unwrap().with_timezone(&Utc);
        assert_eq!(synthesis_id(&ParsedSequence::from_codes(["F", "M"]), at), "SYNTH_FM_20240301_102030");
        let long = ParsedSequence::parse("ACDEFGHIKLMN").unwrap();
        assert_eq!(synthesis_id(&long, at), "SYNTH_ACDEFGHIKL..._20240301_102030");
    }
}
