//! Constantes del compilador y del motor de ejecución.
//!
//! `COMPILER_VERSION` participa en el `content_hash` de cada programa
//! compilado: cambiarla invalida la caché aunque la tabla y la escala no
//! cambien.

/// Versión lógica del compilador de tablas de pasos.
pub const COMPILER_VERSION: &str = "P1.0";

/// Versión de programa usada cuando el llamador no indica ninguna.
pub const DEFAULT_PROGRAM_VERSION: &str = "1.0";

/// Caudal por defecto de la bomba peristáltica (mL/min).
pub const DEFAULT_FLOW_RATE_ML_MIN: f64 = 10.0;

/// Calibración por defecto de la bomba (mL por revolución).
pub const DEFAULT_ML_PER_REVOLUTION: f64 = 0.8;

/// Posición de la válvula selectora que alimenta el reactor.
pub const REACTOR_VALVE_POSITION: u32 = 5;

/// Factor aplicado a `v_X` en tablas con esquema legado (mL por mmol).
pub const LEGACY_VOLUME_FACTOR: f64 = 10.0;

/// Estimaciones de duración (minutos) cuando un paso no declara tiempo.
pub const DEFAULT_TRANSFER_MINUTES: f64 = 1.0;
pub const DEFAULT_STEP_MINUTES: f64 = 0.5;

/// Duraciones por defecto de funciones temporizadas (segundos).
pub const DEFAULT_MIX_SECONDS: f64 = 120.0;
pub const DEFAULT_DRAIN_SECONDS: f64 = 30.0;

/// Límites de la expansión de bucles: iteraciones por bloque y pasos totales.
pub const MAX_LOOP_ITERATIONS: u32 = 100;
pub const MAX_EXPANDED_STEPS: usize = 10_000;

/// Duración estimada de un movimiento de válvula (segundos).
pub const VALVE_MOVE_SECONDS: f64 = 2.0;

/// Intervalo de sondeo para pausa/abort durante esperas (ms).
pub const PAUSE_POLL_INTERVAL_MS: u64 = 100;
