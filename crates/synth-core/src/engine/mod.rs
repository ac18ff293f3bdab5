//! Motor de ejecución de comandos atómicos.
//!
//! Incluye la abstracción de backend, la política de reintentos y
//! aislamiento, el control de pausa/abort y el ledger de auditoría.

pub mod backend;
pub mod control;
pub mod controller;
pub mod core;
pub mod export;
pub mod ledger;
pub mod mock;
pub mod response;
pub mod retry;

pub use self::core::{CommandContext, CommandEngine, CommandResult};
pub use backend::{BackendKind, BackendSettings, DeviceBackend, DeviceCommand, DeviceIds, TransportError};
pub use control::{duration_from_secs, ExecutionControl, PauseBehavior};
pub use controller::{Ack, BusState, DeviceController, Dispatch};
pub use export::{export_csv, write_csv, ExportMetadata, CSV_HEADERS};
pub use ledger::{CommandLedger, CommandOutcome, CommandRecord, LedgerSummary};
pub use mock::MockBackend;
pub use response::{classify_response, ResponseVerdict};
pub use retry::{EngineConfig, RecordingSleeper, Sleeper, ThreadSleeper};
