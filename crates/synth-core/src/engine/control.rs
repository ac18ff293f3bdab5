//! Control cooperativo de una ejecución en curso: pausa, abort y velocidad.
//!
//! Se comparte entre el hilo de trabajo y el bucle de control (clones del
//! mismo `Arc`). Las esperas largas se trocean en `poll_interval` para que
//! la latencia de pausa/abort sea corta.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::retry::Sleeper;
use crate::constants::PAUSE_POLL_INTERVAL_MS;

pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 10.0;

#[derive(Debug)]
struct ControlState {
    paused: AtomicBool,
    aborted: AtomicBool,
    speed_bits: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct ExecutionControl {
    state: Arc<ControlState>,
    poll_interval: Duration,
}

impl Default for ExecutionControl {
    fn default() -> Self { Self::new() }
}

/// Cómo reacciona una espera a la pausa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseBehavior {
    /// La pausa congela el tiempo restante (simulación, esperas puras).
    Suspend,
    /// El tiempo corre igual: hay un actuador físico en marcha.
    Ignore,
}

impl ExecutionControl {
    pub fn new() -> Self {
        Self { state: Arc::new(ControlState { paused: AtomicBool::new(false),
                                              aborted: AtomicBool::new(false),
                                              speed_bits: AtomicU64::new(1.0f64.to_bits()) }),
               poll_interval: Duration::from_millis(PAUSE_POLL_INTERVAL_MS) }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn poll_interval(&self) -> Duration { self.poll_interval }

    pub fn pause(&self) { self.state.paused.store(true, Ordering::SeqCst) }
    pub fn resume(&self) { self.state.paused.store(false, Ordering::SeqCst) }
    pub fn abort(&self) { self.state.aborted.store(true, Ordering::SeqCst) }
    pub fn is_paused(&self) -> bool { self.state.paused.load(Ordering::SeqCst) }
    pub fn is_aborted(&self) -> bool { self.state.aborted.load(Ordering::SeqCst) }

    /// Fija el multiplicador de velocidad (acotado a 0.1..=10) y devuelve el valor aplicado.
    pub fn set_speed(&self, speed: f64) -> f64 {
        let clamped = if speed.is_finite() { speed.clamp(MIN_SPEED, MAX_SPEED) } else { 1.0 };
        self.state.speed_bits.store(clamped.to_bits(), Ordering::SeqCst);
        clamped
    }

    pub fn speed(&self) -> f64 { f64::from_bits(self.state.speed_bits.load(Ordering::SeqCst)) }

    /// Bloquea mientras esté en pausa. Devuelve `false` si se abortó.
    pub fn wait_while_paused(&self, sleeper: &dyn Sleeper) -> bool {
        while self.is_paused() {
            if self.is_aborted() {
                return false;
            }
            sleeper.sleep(self.poll_interval);
        }
        !self.is_aborted()
    }

    /// Espera `total` en trozos. Devuelve `false` si un abort la cortó.
    pub fn sleep(&self, total: Duration, sleeper: &dyn Sleeper, pause: PauseBehavior) -> bool {
        let mut remaining = total;
        while !remaining.is_zero() {
            if self.is_aborted() {
                return false;
            }
            if pause == PauseBehavior::Suspend && self.is_paused() {
                sleeper.sleep(self.poll_interval);
                continue;
            }
            let chunk = remaining.min(self.poll_interval);
            sleeper.sleep(chunk);
            remaining -= chunk;
        }
        !self.is_aborted()
    }
}

/// Segundos -> `Duration`; negativos o no finitos cuentan como cero.
pub fn duration_from_secs(seconds: f64) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_secs_f64(seconds.min(1.0e9))
    } else {
        Duration::ZERO
    }
}
