// src/simulation/mod.rs
//! Gravity simulation core
//!
//! Force kernel, the four execution strategies, kernel generation, step
//! scheduling and the controller that ties them together.

pub mod backend;
pub mod body;
pub mod cpu;
pub mod gpu;
pub mod kernel;
pub mod manager;
pub mod scheduler;
pub mod shader;
pub mod traits;

pub use body::{Body, BodyHandle, BodySnapshot, ForceBuffer, PhysicsWorld, Population};
pub use manager::{SimulationController, SimulationState, StepOutcome};
pub use scheduler::{Cadence, HostClock, Scheduler, SecondTimer, Tick};
pub use shader::{KernelEntry, KernelSource, KernelSourceGenerator, ThreadGroupConfig};
pub use traits::{ExecutionStrategy, StrategyKind};
