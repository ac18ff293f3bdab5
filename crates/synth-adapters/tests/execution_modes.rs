use std::sync::{Arc, Mutex};

use synth_adapters::{CollectingSink, ExecutionError, FailurePolicy, HardwareExecutor, NullSink, ProgressEvent, ProgressSink, RecipeExecutor, ScheduleExecutor,
                     ScheduleRunner, SimulationExecutor, SynthesisCoordinator, SynthesisOptions, SynthesisSchedule};
use synth_core::engine::{BackendKind, BackendSettings, CommandOutcome, DeviceBackend, DeviceCommand, ExecutionControl, MockBackend,
                         RecordingSleeper, TransportError};
use synth_core::{CommandEngine, FunctionRegistry, ProgramLibrary, ProgramSource};
use synth_domain::ParsedSequence;

const COUPLE: &str = "\
step_id,group_id,loop_type,loop_times,function_id,volume_per_mmol,time_seconds,reagent_port,dest_port,comments
1,1,,,METER_R1_MV,20,,,,amino acid
2,2,,,METER_R2_MV,10,,,,activator
3,3,,,TRANSFER_MV_RV_TIME,,60,,,
4,4,,,MIX,,600,,,
5,5,,,DRAIN_RV_TIME,,30,,,
";

/// Comandos atómicos por acoplamiento: 2 + 2 + 2 + 1 + 1.
const COMMANDS_PER_COUPLING: usize = 8;

fn library() -> Arc<ProgramLibrary> {
    let mut library = ProgramLibrary::new();
    library.insert(ProgramSource::inline(synth_domain::config::DEFAULT_AA_PROGRAM, COUPLE));
    Arc::new(library)
}

fn schedule(library: &Arc<ProgramLibrary>, sequence: &str) -> SynthesisSchedule {
    SynthesisCoordinator::new(Arc::clone(library)).build_schedule(&ParsedSequence::parse(sequence).unwrap(), 0.1, &SynthesisOptions::default())
                                                  .unwrap()
}

fn quiet_engine(sleeper: Arc<RecordingSleeper>) -> CommandEngine { CommandEngine::default().with_sleeper(sleeper) }

#[derive(Clone, Default)]
struct Wire(Arc<Mutex<Vec<String>>>);

impl Wire {
    fn lines(&self) -> Vec<String> { self.0.lock().unwrap().clone() }
}

/// Banco de pruebas: acusa `OK:`, rechaza una línea concreta y puede
/// disparar un abort al ver otra.
struct Bench {
    settings: BackendSettings,
    connected: bool,
    wire: Wire,
    reject: Option<&'static str>,
    abort_on: Option<(&'static str, ExecutionControl)>,
}

impl Bench {
    fn new(wire: Wire) -> Self {
        Self { settings: BackendSettings::default(),
               connected: true,
               wire,
               reject: None,
               abort_on: None }
    }
}

impl DeviceBackend for Bench {
    fn kind(&self) -> BackendKind { BackendKind::Hardware }
    fn settings(&self) -> &BackendSettings { &self.settings }
    fn connect(&mut self) -> bool {
        self.connected = true;
        true
    }
    fn disconnect(&mut self) -> bool {
        self.connected = false;
        true
    }
    fn is_connected(&self) -> bool { self.connected }
    fn send(&mut self, command: &DeviceCommand) -> Result<String, TransportError> {
        let line = command.wire(&self.settings.device_ids);
        self.wire.0.lock().unwrap().push(line.clone());
        if self.reject == Some(line.as_str()) {
            return Ok(format!("ERROR:{line}"));
        }
        if let Some((trigger, control)) = &self.abort_on {
            if *trigger == line {
                control.abort();
            }
        }
        Ok(format!("OK:{line}"))
    }
}

#[test]
fn recipe_tracks_every_command_and_exports_audit_csv() {
    let library = library();
    let schedule = schedule(&library, "AG");
    let mut executor = RecipeExecutor::new(Arc::clone(&library), Arc::new(FunctionRegistry::with_defaults()));
    let sink = CollectingSink::new();

    let results = executor.execute(&schedule, &sink).unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success));
    assert_eq!(results[0].residue_code.as_deref(), Some("G"));
    assert_eq!(results[0].commands_executed, COMMANDS_PER_COUPLING);
    assert_eq!(executor.ledger().len(), 2 * COMMANDS_PER_COUPLING);
    assert!(executor.ledger().records().iter().all(|r| r.outcome == CommandOutcome::Tracked));
    let sequences: Vec<u64> = executor.ledger().records().iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, (1..=16).collect::<Vec<u64>>());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit").join("run.csv");
    executor.export_audit(&path, &schedule).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], format!("# Synthesis: {}", schedule.synthesis_id));
    assert_eq!(lines[3], "# Total Steps: 2");
    assert!(lines[5].starts_with("Sequence,"));
    assert_eq!(lines.len(), 6 + 2 * COMMANDS_PER_COUPLING);

    // un StepStarted y un StepCompleted por paso del plan, en orden
    let step_events: Vec<(bool, u32)> = sink.events()
                                            .iter()
                                            .filter_map(|e| match e {
                                                ProgressEvent::StepStarted { step_number, .. } => Some((true, *step_number)),
                                                ProgressEvent::StepCompleted { result } => Some((false, result.step_number)),
                                                _ => None,
                                            })
                                            .collect();
    assert_eq!(step_events, vec![(true, 1), (false, 1), (true, 2), (false, 2)]);
}

#[test]
fn simulation_paces_estimated_time_by_speed() {
    let library = library();
    let schedule = schedule(&library, "A");
    let sleeper = Arc::new(RecordingSleeper::new());
    let mut executor = SimulationExecutor::new(Arc::clone(&library), Arc::new(FunctionRegistry::with_defaults()), 10.0)
        .with_engine(quiet_engine(Arc::clone(&sleeper)));
    assert_eq!(executor.control().speed(), 10.0);
    let sink = CollectingSink::new();

    let results = executor.execute(&schedule, &sink).unwrap();
    assert!(results[0].success);

    let estimated: f64 = executor.ledger().records().iter().map(|r| r.estimated_duration_seconds).sum();
    let slept = sleeper.total().as_secs_f64();
    assert!((slept - estimated / 10.0).abs() < 1e-3, "slept {slept}s for {estimated}s estimated");

    let events = sink.events();
    let completed = events.iter().filter(|e| matches!(e, ProgressEvent::CommandCompleted { .. })).count();
    assert_eq!(completed, COMMANDS_PER_COUPLING);
    let last_fraction = events.iter()
                              .filter_map(|e| match e {
                                  ProgressEvent::CommandProgress { fraction, .. } => Some(*fraction),
                                  _ => None,
                              })
                              .last()
                              .unwrap();
    assert!((last_fraction - 1.0).abs() < 1e-9);
}

/// Aborta en cuanto avanza la espera del paso de programa indicado.
struct AbortDuring {
    program_step: u32,
    control: ExecutionControl,
    events: CollectingSink,
}

impl ProgressSink for AbortDuring {
    fn emit(&self, event: &ProgressEvent) {
        if let ProgressEvent::CommandProgress { program_step, .. } = event {
            if *program_step == self.program_step {
                self.control.abort();
            }
        }
        self.events.emit(event);
    }
}

#[test]
fn simulation_abort_mid_step_records_only_finished_commands() {
    let library = library();
    let schedule = schedule(&library, "A");
    let mut executor = SimulationExecutor::new(Arc::clone(&library), Arc::new(FunctionRegistry::with_defaults()), 1.0)
        .with_engine(quiet_engine(Arc::new(RecordingSleeper::new())));
    // paso 4 = MIX (600 s)
    let sink = AbortDuring { program_step: 4,
                             control: executor.control(),
                             events: CollectingSink::new() };

    let results = executor.execute(&schedule, &sink).unwrap();
    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert_eq!(results[0].error.as_deref(), Some("aborted"));
    assert_eq!(results[0].commands_executed, 6);

    let records = executor.ledger().records();
    assert_eq!(records.len(), 6);
    assert!(records.iter().all(|r| r.program_step <= 3));
    assert_eq!(records.iter().map(|r| r.atomic_index).collect::<Vec<_>>(), vec![1, 2, 1, 2, 1, 2]);

    let events = sink.events.events();
    assert!(!events.iter().any(|e| matches!(e, ProgressEvent::CommandCompleted { program_step: 4, .. })));
    assert!(events.iter().any(|e| matches!(e, ProgressEvent::Aborted { .. })));
}

#[test]
fn hardware_requires_connected_backend() {
    let library = library();
    let schedule = schedule(&library, "A");
    let mut executor = HardwareExecutor::new(Arc::clone(&library),
                                             Arc::new(FunctionRegistry::with_defaults()),
                                             Box::new(MockBackend::new(BackendSettings::default())));
    assert!(matches!(executor.execute(&schedule, &NullSink), Err(ExecutionError::NotConnected)));
    assert!(executor.ledger().is_empty());
}

#[test]
fn hardware_dispatches_in_device_order() {
    let library = library();
    let schedule = schedule(&library, "A");
    let wire = Wire::default();
    let mut executor = HardwareExecutor::new(Arc::clone(&library), Arc::new(FunctionRegistry::with_defaults()), Box::new(Bench::new(wire.clone())))
        .with_engine(quiet_engine(Arc::new(RecordingSleeper::new())));

    let results = executor.execute(&schedule, &NullSink).unwrap();
    assert!(results[0].success);
    let lines = wire.lines();
    assert_eq!(lines[0], "VICI_01:GOTO:1");
    assert_eq!(lines[1], "MFLEX_01:INIT");
    assert!(lines[2].starts_with("MFLEX_01:SPEED:"));
    assert!(lines.contains(&"VICI_01:GOTO:5".to_string()));
    assert_eq!(lines[lines.len() - 2], "REL_04:ON");
    assert_eq!(lines[lines.len() - 1], "REL_04:OFF");
    assert!(executor.ledger().records().iter().all(|r| r.outcome == CommandOutcome::Succeeded));

    let summary = executor.summary();
    assert_eq!(summary.total_steps, 1);
    assert_eq!(summary.success_rate, 1.0);
    assert_eq!(summary.commands.total_commands, COMMANDS_PER_COUPLING);
    assert!(!summary.aborted);
}

#[test]
fn failure_policy_halts_or_keeps_going() {
    let library = library();
    let schedule = schedule(&library, "AG");
    let run = |policy: FailurePolicy| {
        let mut bench = Bench::new(Wire::default());
        bench.reject = Some("VICI_01:GOTO:2");
        let mut executor = HardwareExecutor::new(Arc::clone(&library), Arc::new(FunctionRegistry::with_defaults()), Box::new(bench))
            .with_engine(quiet_engine(Arc::new(RecordingSleeper::new())))
            .with_policy(policy);
        let results = executor.execute(&schedule, &NullSink).unwrap();
        (results, executor.summary())
    };

    let (halted, summary) = run(FailurePolicy::HaltOnFailure);
    assert_eq!(halted.len(), 1);
    assert!(!halted[0].success);
    assert!(halted[0].error.as_deref().unwrap().starts_with("program step 2 (METER_R2_MV) failed"));
    assert_eq!(summary.failed_steps, 1);
    assert_eq!(summary.commands.failed_commands, 1);

    let (kept, summary) = run(FailurePolicy::KeepGoing);
    assert_eq!(kept.len(), 2);
    assert!(kept.iter().all(|r| !r.success));
    assert_eq!(summary.success_rate, 0.0);
}

#[test]
fn abort_during_pump_run_stops_and_makes_safe() {
    let library = library();
    let schedule = schedule(&library, "AG");
    let control = ExecutionControl::new();
    let wire = Wire::default();
    let mut bench = Bench::new(wire.clone());
    bench.abort_on = Some(("MFLEX_01:START", control.clone()));
    let engine = quiet_engine(Arc::new(RecordingSleeper::new())).with_control(control);
    let mut executor = HardwareExecutor::new(Arc::clone(&library), Arc::new(FunctionRegistry::with_defaults()), Box::new(bench)).with_engine(engine);
    let sink = CollectingSink::new();

    let results = executor.execute(&schedule, &sink).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].error.as_deref(), Some("aborted"));
    let lines = wire.lines();
    assert!(!lines.contains(&"VICI_01:GOTO:2".to_string()));
    assert_eq!(&lines[lines.len() - 2..], ["MFLEX_01:STOP".to_string(), "REL_04:OFF".to_string()]);
    assert!(executor.summary().aborted);
    assert!(sink.events().iter().any(|e| matches!(e, ProgressEvent::Aborted { .. })));
}

#[test]
fn runner_joins_with_executor_and_results() {
    let library = library();
    let schedule = schedule(&library, "AG");
    let executor = RecipeExecutor::new(Arc::clone(&library), Arc::new(FunctionRegistry::with_defaults()));
    let sink = Arc::new(CollectingSink::new());

    let handle = ScheduleRunner::spawn(Box::new(executor), schedule, sink.clone()).unwrap();
    assert_eq!(handle.set_speed(100.0), 10.0);
    let outcome = handle.join().unwrap();
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.executor.ledger().len(), 2 * COMMANDS_PER_COUPLING);
    assert!(sink.events().iter().any(|e| matches!(e, ProgressEvent::StepCompleted { .. })));
}

#[test]
fn runner_abort_before_start_runs_nothing() {
    let library = library();
    let schedule = schedule(&library, "AG");
    let executor = RecipeExecutor::new(Arc::clone(&library), Arc::new(FunctionRegistry::with_defaults()));
    executor.control().abort();

    let handle = ScheduleRunner::spawn(Box::new(executor), schedule, Arc::new(NullSink)).unwrap();
    let outcome = handle.join().unwrap();
    assert!(outcome.results.is_empty());
    assert!(outcome.executor.ledger().is_empty());
}

#[test]
fn schedule_survives_save_and_load() {
    let library = library();
    let schedule = schedule(&library, "FKG");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schedule.json");
    schedule.save(&path).unwrap();

    let loaded = SynthesisSchedule::load(&path).unwrap();
    assert_eq!(loaded.synthesis_id, schedule.synthesis_id);
    assert_eq!(loaded.created_at, schedule.created_at);
    let order: Vec<Option<&str>> = loaded.steps.iter().map(|s| s.residue_code.as_deref()).collect();
    assert_eq!(order, vec![Some("G"), Some("K"), Some("F")]);
    assert_eq!(loaded.steps[1].target_scale_mmol(), Some(0.1));
}
