//! Simulation controller
//!
//! Owns everything a run needs: the active strategy, the generated kernel and
//! its artifact, the population, the scheduler and the timing window. The
//! host feeds it [`Tick`]s together with the external [`PhysicsWorld`] and
//! gets a [`StepOutcome`] back for every tick.
//!
//! Transitions:
//!
//! - `Idle -> Running` on [`start`](SimulationController::start)
//! - `Running -> PausedByWarning` when a step is degraded and warnings are not suppressed
//! - `PausedByWarning -> Running` on acknowledge or suppress
//! - `Running | PausedByWarning -> Idle` on stop, or when a step aborts

use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::backend::ComputeBackend;
use super::body::{BodySnapshot, ForceBuffer, PhysicsWorld, Population};
use super::cpu::{ParallelTasked, Sequential};
use super::gpu::GpuStrategy;
use super::scheduler::{Cadence, Scheduler, Tick};
use super::shader::{KernelArtifactStore, KernelSource, KernelSourceGenerator, ThreadGroupConfig};
use super::traits::{ExecutionStrategy, StrategyKind};
use crate::config::{clamp_population, SimulationConfig};
use crate::error::{SimResult, SimulationError};
use crate::performance::{PerformanceMonitor, Telemetry};

/// Run state of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationState {
    /// No step executes; a population may or may not exist
    Idle,
    /// Every firing tick executes a full step
    Running,
    /// Auto-paused after a slow step, waiting for the user
    PausedByWarning,
}

/// Result of feeding one tick to the controller
#[derive(Debug)]
pub enum StepOutcome {
    /// Not running, or the tick does not fire under the current cadence
    Skipped,
    Completed(Telemetry),
    /// The step completed but was too slow; the run is now paused
    PausedByWarning(Telemetry),
    /// The step failed; the run is back to idle
    Aborted(SimulationError),
}

pub struct SimulationController<B: ComputeBackend + 'static> {
    config: SimulationConfig,
    backend: Arc<B>,
    state: SimulationState,
    scheduler: Scheduler,
    monitor: PerformanceMonitor,
    strategy: Box<dyn ExecutionStrategy>,
    generator: KernelSourceGenerator,
    kernel_source: KernelSource,
    artifacts: KernelArtifactStore,
    population: Population,
    forces: ForceBuffer,
    warnings_suppressed: bool,
    rng: StdRng,
    steps_completed: u64,
}

impl<B: ComputeBackend + 'static> SimulationController<B> {
    pub fn new(config: SimulationConfig, backend: Arc<B>) -> SimResult<Self> {
        let generator = KernelSourceGenerator::new();
        let kernel_source = generator.generate(config.thread_groups);
        let mut artifacts = KernelArtifactStore::new(config.artifact_dir.clone());
        artifacts.replace(&kernel_source)?;

        let strategy = build_strategy(config.strategy, &config, &backend, &kernel_source)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };

        log::info!(
            "Controller ready: {} strategy on {} backend, thread groups {}",
            config.strategy,
            backend.name(),
            config.thread_groups.tag()
        );

        Ok(Self {
            scheduler: Scheduler::new(config.cadence),
            monitor: PerformanceMonitor::with_config(
                config.timing_window,
                config.slow_step_threshold_ms,
            ),
            backend,
            state: SimulationState::Idle,
            strategy,
            generator,
            kernel_source,
            artifacts,
            population: Population::default(),
            forces: ForceBuffer::default(),
            warnings_suppressed: false,
            rng,
            steps_completed: 0,
            config,
        })
    }

    /// Idle -> Running; needs a spawned population
    pub fn start(&mut self) -> SimResult<()> {
        if self.state != SimulationState::Idle {
            return Err(self.invalid("start"));
        }
        if self.population.is_empty() {
            return Err(SimulationError::EmptyPopulation);
        }
        self.state = SimulationState::Running;
        log::info!("Simulation started with {} bodies", self.population.len());
        Ok(())
    }

    /// Back to Idle; takes effect between steps
    pub fn stop(&mut self) {
        if self.state != SimulationState::Idle {
            log::info!("Simulation stopped after {} steps", self.steps_completed);
        }
        self.state = SimulationState::Idle;
    }

    /// PausedByWarning -> Running
    pub fn acknowledge_warning(&mut self) -> SimResult<()> {
        if self.state != SimulationState::PausedByWarning {
            return Err(self.invalid("acknowledge warning"));
        }
        self.state = SimulationState::Running;
        log::info!("Slow-step warning acknowledged, resuming");
        Ok(())
    }

    /// Never auto-pause again; resumes a paused run
    pub fn suppress_warnings(&mut self) {
        self.warnings_suppressed = true;
        if self.state == SimulationState::PausedByWarning {
            self.state = SimulationState::Running;
        }
        log::info!("Slow-step warnings suppressed");
    }

    /// (Re)create the population at the configured size
    ///
    /// Any existing population is despawned first and device buffers are
    /// released. Rejected while running.
    ///
    /// # Arguments
    /// * `world` - Physics world the bodies are created in
    pub fn spawn_population(&mut self, world: &mut dyn PhysicsWorld) -> SimResult<()> {
        if self.state == SimulationState::Running {
            return Err(self.invalid("spawn population"));
        }
        self.drop_population(world);

        self.population = Population::spawn(
            world,
            self.config.population,
            &self.config.spawn,
            &mut self.rng,
        );
        self.forces.reset(self.population.len());
        self.monitor.clear();
        Ok(())
    }

    pub fn despawn_population(&mut self, world: &mut dyn PhysicsWorld) -> SimResult<()> {
        if self.state == SimulationState::Running {
            return Err(self.invalid("despawn population"));
        }
        self.drop_population(world);
        Ok(())
    }

    fn drop_population(&mut self, world: &mut dyn PhysicsWorld) {
        if !self.population.is_empty() {
            std::mem::take(&mut self.population).despawn(world);
        }
        self.forces.reset(0);
        self.strategy.release();
    }

    /// Clamp and store the size used by the next spawn; returns the stored size
    pub fn set_population_size(&mut self, requested: usize) -> usize {
        let size = clamp_population(i64::try_from(requested).unwrap_or(i64::MAX));
        if size != requested {
            log::warn!("Population size {} clamped to {}", requested, size);
        }
        self.config.population = size;
        self.monitor.clear();
        size
    }

    /// Replace the active strategy; the old one (and its buffers) is dropped
    pub fn set_strategy(&mut self, kind: StrategyKind) -> SimResult<()> {
        if kind == self.strategy.kind() {
            return Ok(());
        }

        self.strategy.release();
        let strategy = build_strategy(kind, &self.config, &self.backend, &self.kernel_source)?;
        log::info!("Strategy switched from {} to {}", self.strategy.kind(), kind);

        self.strategy = strategy;
        self.config.strategy = kind;
        self.monitor.clear();
        Ok(())
    }

    /// Regenerate, persist and reload the kernel for a new shape
    ///
    /// On failure the controller keeps dispatching the previous shape.
    ///
    /// # Arguments
    /// * `groups` - Thread-group shape used by the next GPU step
    pub fn set_thread_groups(&mut self, groups: ThreadGroupConfig) -> SimResult<()> {
        if groups == self.config.thread_groups {
            return Ok(());
        }

        // reload first so a rejected kernel leaves the old artifact in place
        let source = self.generator.generate(groups);
        self.strategy.reload_kernel(&source)?;
        if let Err(err) = self.artifacts.replace(&source) {
            log::error!("Could not persist kernel {}: {}", source.name(), err);
            self.strategy.reload_kernel(&self.kernel_source)?;
            if let Err(restore) = self.artifacts.replace(&self.kernel_source) {
                log::warn!(
                    "Could not restore kernel artifact {}: {}",
                    self.kernel_source.name(),
                    restore
                );
            }
            return Err(err);
        }
        log::info!(
            "Thread groups changed from {} to {}",
            self.config.thread_groups.tag(),
            groups.tag()
        );

        self.kernel_source = source;
        self.config.thread_groups = groups;
        self.monitor.clear();
        Ok(())
    }

    pub fn set_cadence(&mut self, cadence: Cadence) {
        self.scheduler.set_cadence(cadence);
        self.config.cadence = cadence;
    }

    pub fn set_force_multiplier(&mut self, multiplier: f32) {
        self.config.force_multiplier = multiplier;
    }

    /// Feed one host tick; runs a step when running and the cadence fires
    ///
    /// Errors inside the step never escape: they drop the controller to idle
    /// and come back as [`StepOutcome::Aborted`].
    ///
    /// # Arguments
    /// * `tick` - Host-loop event evaluated against the cadence
    /// * `world` - Physics world positions are read from and forces applied to
    pub fn tick(&mut self, tick: Tick, world: &mut dyn PhysicsWorld) -> StepOutcome {
        let fires = self.scheduler.observe(tick);
        if self.state != SimulationState::Running || !fires {
            return StepOutcome::Skipped;
        }

        match self.step(world) {
            Ok(telemetry) if self.monitor.is_degraded() && !self.warnings_suppressed => {
                log::warn!(
                    "Step took {:.2} ms (limit {:.2} ms), pausing",
                    telemetry.last_ms,
                    self.monitor.slow_step_ms()
                );
                self.state = SimulationState::PausedByWarning;
                StepOutcome::PausedByWarning(telemetry)
            }
            Ok(telemetry) => StepOutcome::Completed(telemetry),
            Err(err) => {
                log::error!("Step aborted: {}", err);
                self.state = SimulationState::Idle;
                self.strategy.release();
                StepOutcome::Aborted(err)
            }
        }
    }

    fn step(&mut self, world: &mut dyn PhysicsWorld) -> SimResult<Telemetry> {
        if self.population.is_empty() {
            return Err(SimulationError::EmptyPopulation);
        }

        self.monitor.begin_step();
        let snapshot = BodySnapshot::capture(&mut self.population, world);
        self.forces.reset(snapshot.len());
        self.strategy.compute_all(&snapshot, &mut self.forces)?;

        let scale = self.scheduler.delta_time() * self.config.force_multiplier;
        for (body, force) in self.population.bodies().iter().zip(self.forces.as_slice()) {
            world.apply_force(body.handle, *force * scale);
        }

        self.monitor.end_step();
        self.steps_completed += 1;
        Ok(self.monitor.telemetry())
    }

    /// Stop, despawn, free device buffers and delete the kernel artifact
    pub fn shutdown(&mut self, world: &mut dyn PhysicsWorld) -> SimResult<()> {
        self.stop();
        self.drop_population(world);
        self.artifacts.clear()
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SimulationState::Running
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Whether thread-group controls apply to the active strategy
    pub fn thread_groups_enabled(&self) -> bool {
        self.strategy.kind().is_gpu()
    }

    pub fn thread_groups(&self) -> ThreadGroupConfig {
        self.config.thread_groups
    }

    pub fn cadence(&self) -> Cadence {
        self.scheduler.cadence()
    }

    pub fn force_multiplier(&self) -> f32 {
        self.config.force_multiplier
    }

    /// Size the next spawn will use
    pub fn population_size(&self) -> usize {
        self.config.population
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn forces(&self) -> &ForceBuffer {
        &self.forces
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    pub fn telemetry(&self) -> Telemetry {
        self.monitor.telemetry()
    }

    pub fn warnings_suppressed(&self) -> bool {
        self.warnings_suppressed
    }

    pub fn kernel_source(&self) -> &KernelSource {
        &self.kernel_source
    }

    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifacts.current()
    }

    pub fn steps_completed(&self) -> u64 {
        self.steps_completed
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    fn invalid(&self, action: &'static str) -> SimulationError {
        SimulationError::InvalidState {
            action,
            state: self.state,
        }
    }
}

fn build_strategy<B: ComputeBackend + 'static>(
    kind: StrategyKind,
    config: &SimulationConfig,
    backend: &Arc<B>,
    source: &KernelSource,
) -> SimResult<Box<dyn ExecutionStrategy>> {
    Ok(match kind {
        StrategyKind::Sequential => Box::new(Sequential::new()),
        StrategyKind::ParallelTasked => {
            Box::new(ParallelTasked::new(config.resolved_worker_threads())?)
        }
        StrategyKind::GpuGrid1D => Box::new(GpuStrategy::grid_1d(Arc::clone(backend), source)?),
        StrategyKind::GpuGrid2D => Box::new(GpuStrategy::grid_2d(Arc::clone(backend), source)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::backend::SoftwareBackend;
    use crate::simulation::body::BodyHandle;
    use cgmath::Vector3;

    #[derive(Default)]
    struct StillWorld {
        positions: Vec<Vector3<f32>>,
        applied: usize,
    }

    impl PhysicsWorld for StillWorld {
        fn spawn_body(&mut self, position: Vector3<f32>, _mass: f32) -> BodyHandle {
            self.positions.push(position);
            BodyHandle(self.positions.len() as u64 - 1)
        }

        fn despawn_body(&mut self, _handle: BodyHandle) {}

        fn position(&self, handle: BodyHandle) -> Vector3<f32> {
            self.positions[handle.0 as usize]
        }

        fn apply_force(&mut self, _handle: BodyHandle, _force: Vector3<f32>) {
            self.applied += 1;
        }
    }

    fn controller(config: SimulationConfig) -> SimulationController<SoftwareBackend> {
        SimulationController::new(config.with_seed(7), Arc::new(SoftwareBackend::new())).unwrap()
    }

    #[test]
    fn test_start_requires_population() {
        let mut controller = controller(SimulationConfig::new().with_population(8));
        assert!(matches!(controller.start(), Err(SimulationError::EmptyPopulation)));

        let mut world = StillWorld::default();
        controller.spawn_population(&mut world).unwrap();
        controller.start().unwrap();
        assert!(controller.is_running());
        assert!(matches!(
            controller.start(),
            Err(SimulationError::InvalidState { state: SimulationState::Running, .. })
        ));
    }

    #[test]
    fn test_spawn_rejected_while_running() {
        let mut world = StillWorld::default();
        let mut controller = controller(SimulationConfig::new().with_population(8));
        controller.spawn_population(&mut world).unwrap();
        controller.start().unwrap();

        assert!(controller.spawn_population(&mut world).is_err());
        assert!(controller.despawn_population(&mut world).is_err());

        controller.stop();
        controller.spawn_population(&mut world).unwrap();
        assert_eq!(controller.population().len(), 8);
    }

    #[test]
    fn test_ticks_skip_unless_cadence_fires() {
        let mut world = StillWorld::default();
        let mut controller = controller(
            SimulationConfig::new()
                .with_population(5)
                .with_cadence(Cadence::OncePerSecond),
        );
        controller.spawn_population(&mut world).unwrap();

        assert!(matches!(controller.tick(Tick::Timer, &mut world), StepOutcome::Skipped));
        controller.start().unwrap();
        assert!(matches!(
            controller.tick(Tick::Frame { delta: 0.016 }, &mut world),
            StepOutcome::Skipped
        ));
        assert!(matches!(
            controller.tick(Tick::Timer, &mut world),
            StepOutcome::Completed(_)
        ));
        assert_eq!(world.applied, 5);
        assert_eq!(controller.steps_completed(), 1);
    }

    #[test]
    fn test_acknowledge_only_when_paused() {
        let mut controller = controller(SimulationConfig::new());
        assert!(matches!(
            controller.acknowledge_warning(),
            Err(SimulationError::InvalidState { state: SimulationState::Idle, .. })
        ));
        controller.suppress_warnings();
        assert!(controller.warnings_suppressed());
        assert_eq!(controller.state(), SimulationState::Idle);
    }

    #[test]
    fn test_population_size_is_clamped() {
        let mut controller = controller(SimulationConfig::new());
        assert_eq!(controller.set_population_size(1), 3);
        assert_eq!(controller.set_population_size(500_000), 100_000);
        assert_eq!(controller.set_population_size(64), 64);
        assert_eq!(controller.population_size(), 64);
    }

    #[test]
    fn test_thread_group_controls_follow_strategy() {
        let mut controller = controller(SimulationConfig::new());
        assert!(!controller.thread_groups_enabled());
        controller.set_strategy(StrategyKind::GpuGrid2D).unwrap();
        assert!(controller.thread_groups_enabled());
        assert_eq!(controller.strategy_kind(), StrategyKind::GpuGrid2D);
    }
}
