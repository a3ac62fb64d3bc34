// src/lib.rs
//! Gravity Bench
//!
//! An N-body gravity benchmarking harness. Pairwise forces are computed by one
//! of four interchangeable strategies (sequential, data-parallel CPU, and two
//! GPU thread-group shapes) while step timings are tracked against a slow-step
//! threshold.

pub mod config;
pub mod error;
pub mod performance;
pub mod prelude;
pub mod simulation;
pub mod wgpu_utils;

pub use config::SimulationConfig;
pub use error::{SimResult, SimulationError};
pub use simulation::SimulationController;
