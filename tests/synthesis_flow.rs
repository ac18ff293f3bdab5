use std::fs;
use std::path::Path;
use std::sync::Arc;

use spps_flow::synth_adapters::{HardwareExecutor, NullSink, ProgressEvent, RecipeExecutor};
use spps_flow::synth_core::engine::{BackendSettings, MockBackend, RecordingSleeper};
use spps_flow::synth_core::{CommandEngine, DeviceBackend};
use spps_flow::{plan_synthesis, FunctionRegistry, ProgramLibrary, ScheduleExecutor};

const COUPLE: &str = "\
step_id,group_id,loop_type,loop_times,function_id,volume_per_mmol,time_seconds,reagent_port,dest_port,comments
1,1,,,METER_R3_MV,30,,,,deprotection
2,2,,,DRAIN_RV_TIME,,20,,,
3,3,NL,2,METER_R4_MV,25,,,,wash
4,3,NL,2,DRAIN_RV_TIME,,15,,,
5,4,,,METER_R1_MV,20,,,,amino acid
6,5,,,METER_R2_MV,10,,,,activator
7,6,,,TRANSFER_MV_RV_TIME,,60,,,
8,7,,,MIX,,900,,,
9,8,,,DRAIN_RV_TIME,,30,,,
";

fn program_dir(root: &Path) -> std::path::PathBuf {
    let dir = root.join("programs");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("aa_oxyma_dic_v1.csv"), COUPLE).unwrap();
    fs::write(dir.join("notes.txt"), "not a program").unwrap();
    dir
}

#[test]
fn sequence_to_schedule_with_persisted_programs() {
    let root = tempfile::tempdir().unwrap();
    let build = root.path().join("build");
    let library = ProgramLibrary::discover(&program_dir(root.path())).unwrap().with_build_dir(&build);
    assert_eq!(library.list(), vec!["aa_oxyma_dic_v1"]);

    let schedule = plan_synthesis(Arc::new(library), "Ac-FMRF-NH2", 0.1).unwrap();
    let order: Vec<&str> = schedule.steps.iter().filter_map(|s| s.residue_code.as_deref()).collect();
    assert_eq!(order, vec!["F", "R", "M", "F"]);
    // desprotección, drenaje, 2 lavados, AA, activador, transferencia, mezcla, drenaje
    let per_coupling = 0.5 + 20.0 / 60.0 + 2.0 * (0.5 + 0.25) + 0.5 + 0.5 + 1.0 + 15.0 + 0.5;
    assert!((schedule.total_estimated_time_minutes - 4.0 * per_coupling).abs() < 1e-9);
    assert!((schedule.total_reagent_consumption["DMF"] - 4.0 * 5.0).abs() < 1e-9);
    assert!((schedule.total_reagent_consumption["Deprotection"] - 4.0 * 3.0).abs() < 1e-9);
    assert!((schedule.total_reagent_consumption["Fmoc-F"] - 2.0 * 2.0).abs() < 1e-9);

    // Misma escala y tabla: una única compilación persistida.
    let persisted: Vec<_> = fs::read_dir(&build).unwrap().filter_map(|e| e.ok()).collect();
    assert_eq!(persisted.len(), 1);
}

#[test]
fn recipe_and_mock_hardware_emit_the_same_commands() {
    let root = tempfile::tempdir().unwrap();
    let library = Arc::new(ProgramLibrary::discover(&program_dir(root.path())).unwrap());
    let registry = Arc::new(FunctionRegistry::with_defaults());
    let schedule = plan_synthesis(Arc::clone(&library), "GA", 0.2).unwrap();

    let mut recipe = RecipeExecutor::new(Arc::clone(&library), Arc::clone(&registry));
    recipe.execute(&schedule, &NullSink).unwrap();

    let mut backend = MockBackend::new(BackendSettings::default());
    assert!(backend.connect());
    let engine = CommandEngine::default().with_sleeper(Arc::new(RecordingSleeper::new()));
    let mut hardware = HardwareExecutor::new(library, registry, Box::new(backend)).with_engine(engine);
    let results = hardware.execute(&schedule, &NullSink).unwrap();
    assert!(results.iter().all(|r| r.success));

    let tracked: Vec<&str> = recipe.ledger().records().iter().map(|r| r.mock_command.as_str()).collect();
    let dispatched: Vec<&str> = hardware.ledger().records().iter().map(|r| r.mock_command.as_str()).collect();
    assert_eq!(tracked, dispatched);
    let tracked_rpm: Vec<Option<f64>> = recipe.ledger().records().iter().map(|r| r.rpm).collect();
    let dispatched_rpm: Vec<Option<f64>> = hardware.ledger().records().iter().map(|r| r.rpm).collect();
    assert_eq!(tracked_rpm, dispatched_rpm);
    assert!(hardware.ledger().records().iter().all(|r| r.actual_duration_seconds.is_some()));
}

#[test]
fn progress_events_are_tagged_json() {
    let value = serde_json::to_value(ProgressEvent::Aborted { step_number: 3 }).unwrap();
    assert_eq!(value["type"], "aborted");
    assert_eq!(value["step_number"], 3);
}
