//! Simulation configuration
//!
//! Builder-style settings for the benchmark harness together with the
//! boundary helpers that sanitise population input before it reaches the core.
//!
//! ## Usage
//!
//! ```rust
//! use gravity_bench::config::SimulationConfig;
//! use gravity_bench::simulation::{Cadence, StrategyKind};
//!
//! let config = SimulationConfig::new()
//!     .with_population(2048)
//!     .with_strategy(StrategyKind::ParallelTasked)
//!     .with_cadence(Cadence::EveryFrame)
//!     .with_seed(7);
//! assert_eq!(config.population, 2048);
//! ```

use std::num::IntErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use crate::simulation::scheduler::Cadence;
use crate::simulation::shader::ThreadGroupConfig;
use crate::simulation::traits::StrategyKind;

/// Smallest population the harness accepts
pub const MIN_POPULATION: usize = 3;
/// Largest population the harness accepts
pub const MAX_POPULATION: usize = 100_000;

/// Clamp a requested population into `[MIN_POPULATION, MAX_POPULATION]`
pub fn clamp_population(requested: i64) -> usize {
    requested.clamp(MIN_POPULATION as i64, MAX_POPULATION as i64) as usize
}

/// Parse population text from an input field
///
/// Malformed text yields `fallback`; numeric text is clamped, including
/// digit strings too long for an `i64`.
pub fn parse_population(text: &str, fallback: usize) -> usize {
    match text.trim().parse::<i64>() {
        Ok(value) => clamp_population(value),
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => MAX_POPULATION,
        Err(e) if *e.kind() == IntErrorKind::NegOverflow => MIN_POPULATION,
        Err(_) => {
            log::warn!("Ignoring malformed population input {:?}", text);
            clamp_population(i64::try_from(fallback).unwrap_or(i64::MAX))
        }
    }
}

/// Parameters used when a population is instantiated
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnSettings {
    /// Positions are drawn from the integer grid `[-extent, extent)` per axis
    pub extent: i32,
    /// Masses are drawn from the integers in `min_mass..max_mass`
    pub min_mass: u32,
    pub max_mass: u32,
}

impl Default for SpawnSettings {
    fn default() -> Self {
        Self {
            extent: 100,
            min_mass: 1,
            max_mass: 10_000,
        }
    }
}

/// Complete configuration of a [`SimulationController`](crate::simulation::manager::SimulationController)
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Number of bodies spawned by the next instantiation
    pub population: usize,
    /// Scales every computed force before it is handed to the physics world
    pub force_multiplier: f32,
    pub cadence: Cadence,
    pub strategy: StrategyKind,
    pub thread_groups: ThreadGroupConfig,
    /// A single step slower than this raises the degradation signal
    pub slow_step_threshold_ms: f32,
    /// Capacity of the rolling timing window
    pub timing_window: usize,
    /// Period of the once-per-second timer
    pub timer_interval: Duration,
    /// Delta reported by fixed-step ticks
    pub fixed_delta: f32,
    /// Worker threads for the parallel strategy (None = one per logical core)
    pub worker_threads: Option<usize>,
    /// Directory the generated kernel artifact is written to (None = not persisted)
    pub artifact_dir: Option<PathBuf>,
    /// Seed for population spawning (None = entropy)
    pub seed: Option<u64>,
    pub spawn: SpawnSettings,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            population: 1024,
            force_multiplier: 1_000_000.0,
            cadence: Cadence::OncePerSecond,
            strategy: StrategyKind::Sequential,
            thread_groups: ThreadGroupConfig::default(),
            slow_step_threshold_ms: 1000.0,
            timing_window: 50,
            timer_interval: Duration::from_millis(990),
            fixed_delta: 0.02,
            worker_threads: None,
            artifact_dir: None,
            seed: None,
            spawn: SpawnSettings::default(),
        }
    }
}

impl SimulationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the population size (clamped to the accepted range)
    pub fn with_population(mut self, population: usize) -> Self {
        self.population = clamp_population(i64::try_from(population).unwrap_or(i64::MAX));
        self
    }

    pub fn with_force_multiplier(mut self, multiplier: f32) -> Self {
        self.force_multiplier = multiplier;
        self
    }

    pub fn with_cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_thread_groups(mut self, thread_groups: ThreadGroupConfig) -> Self {
        self.thread_groups = thread_groups;
        self
    }

    pub fn with_slow_step_threshold(mut self, threshold_ms: f32) -> Self {
        self.slow_step_threshold_ms = threshold_ms;
        self
    }

    pub fn with_timing_window(mut self, capacity: usize) -> Self {
        self.timing_window = capacity.max(1);
        self
    }

    pub fn with_timer_interval(mut self, interval: Duration) -> Self {
        self.timer_interval = interval;
        self
    }

    pub fn with_fixed_delta(mut self, fixed_delta: f32) -> Self {
        self.fixed_delta = fixed_delta;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads.max(1));
        self
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_spawn(mut self, spawn: SpawnSettings) -> Self {
        self.spawn = spawn;
        self
    }

    /// Worker thread count for the parallel strategy
    pub fn resolved_worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(num_cpus::get).max(1)
    }
}
