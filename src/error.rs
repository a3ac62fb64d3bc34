//! Error types for the gravity benchmark
//!
//! Every failure that can happen inside a simulation step is expressed as a
//! [`SimulationError`]. The controller never lets one of these escape into the
//! scheduler; it converts them into a [`StepOutcome::Aborted`](crate::simulation::manager::StepOutcome)
//! message and drops back to idle.

use crate::simulation::manager::SimulationState;
use thiserror::Error;

/// Axis of a thread-group configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::X => write!(f, "X"),
            Axis::Y => write!(f, "Y"),
        }
    }
}

/// Coarse classification used by callers that only care about the category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// User-chosen parameters cannot be dispatched (not retried)
    Configuration,
    /// Device buffers missing or sized for another population
    Resource,
    /// Command issued in a state that does not accept it
    State,
    /// Device, adapter or kernel failure
    Backend,
    /// Kernel artifact persistence
    Io,
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("thread group size {axis}={threads} exceeds population size {bodies}")]
    ThreadGroupExceedsPopulation {
        axis: Axis,
        threads: u32,
        bodies: usize,
    },

    #[error("thread group size {axis}={value} is not a power of two")]
    ThreadGroupNotPowerOfTwo { axis: Axis, value: u32 },

    #[error("thread group size {axis}={value} is outside 1..={max}")]
    ThreadGroupOutOfRange { axis: Axis, value: u32, max: u32 },

    #[error("{what} requires {requested}, device limit is {limit}")]
    DeviceLimit {
        what: &'static str,
        requested: u64,
        limit: u64,
    },

    #[error("cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: SimulationState,
    },

    #[error("no population has been spawned")]
    EmptyPopulation,

    #[error("{what} has length {found}, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("no compatible GPU adapter: {0}")]
    NoAdapter(String),

    #[error("device request failed: {0}")]
    Device(String),

    #[error("kernel error: {0}")]
    Kernel(String),

    #[error("result readback failed: {0}")]
    Readback(String),

    #[error("kernel artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker pool could not be built: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl SimulationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SimulationError::ThreadGroupExceedsPopulation { .. }
            | SimulationError::ThreadGroupNotPowerOfTwo { .. }
            | SimulationError::ThreadGroupOutOfRange { .. }
            | SimulationError::DeviceLimit { .. } => ErrorKind::Configuration,
            SimulationError::InvalidState { .. } | SimulationError::EmptyPopulation => {
                ErrorKind::State
            }
            SimulationError::LengthMismatch { .. } => ErrorKind::Resource,
            SimulationError::NoAdapter(_)
            | SimulationError::Device(_)
            | SimulationError::Kernel(_)
            | SimulationError::Readback(_)
            | SimulationError::WorkerPool(_) => ErrorKind::Backend,
            SimulationError::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the error is a configuration error (surfaced, never retried)
    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

pub type SimResult<T> = Result<T, SimulationError>;
