//! # Gravity Bench Prelude
//!
//! Commonly used types for driving a simulation from a host loop.
//!
//! ```no_run
//! use gravity_bench::prelude::*;
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), SimulationError> {
//!     let backend = Arc::new(SoftwareBackend::new());
//!     let config = SimulationConfig::new()
//!         .with_population(256)
//!         .with_strategy(StrategyKind::ParallelTasked);
//!     let _controller = SimulationController::new(config, backend)?;
//!     Ok(())
//! }
//! ```

pub use crate::config::{SimulationConfig, SpawnSettings};
pub use crate::error::{ErrorKind, SimResult, SimulationError};
pub use crate::performance::{PerformanceMonitor, Telemetry};

pub use crate::simulation::backend::{ComputeBackend, SoftwareBackend, WgpuBackend};
pub use crate::simulation::{
    BodyHandle, Cadence, HostClock, PhysicsWorld, SimulationController, SimulationState,
    StepOutcome, StrategyKind, ThreadGroupConfig, Tick,
};

pub use cgmath::{InnerSpace, Vector3, Zero};
