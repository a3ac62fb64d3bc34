//! # Strategy Benchmark
//!
//! Runs every execution strategy against the same population for a fixed
//! number of frames and logs the step timings. The bodies live in a small
//! explicit-Euler point-mass world standing in for a physics engine.
//!
//! Uses the wgpu backend when an adapter is available, otherwise the software
//! backend.
//!
//! ## Usage
//! ```bash
//! RUST_LOG=info cargo run --release --example strategy_benchmark -- 2048 64 4
//! ```
//! Arguments: population, threads X, threads Y.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use gravity_bench::config::parse_population;
use gravity_bench::prelude::*;

const FRAMES_PER_STRATEGY: usize = 120;
const FRAME_TIME: Duration = Duration::from_millis(16);

#[derive(Clone, Debug)]
struct PointMass {
    position: Vector3<f32>,
    velocity: Vector3<f32>,
    mass: f32,
    force_accumulator: Vector3<f32>,
}

impl PointMass {
    fn integrate(&mut self, delta_time: f32) {
        let acceleration = self.force_accumulator / self.mass;
        self.velocity += acceleration * delta_time;
        self.position += self.velocity * delta_time;
        self.force_accumulator = Vector3::zero();
    }
}

/// Slab of point masses addressed by slot index
#[derive(Default)]
struct PointMassWorld {
    bodies: Vec<Option<PointMass>>,
}

impl PointMassWorld {
    fn integrate(&mut self, delta_time: f32) {
        for body in self.bodies.iter_mut().flatten() {
            body.integrate(delta_time);
        }
    }

    fn live(&self) -> usize {
        self.bodies.iter().flatten().count()
    }
}

impl PhysicsWorld for PointMassWorld {
    fn spawn_body(&mut self, position: Vector3<f32>, mass: f32) -> BodyHandle {
        self.bodies.push(Some(PointMass {
            position,
            velocity: Vector3::zero(),
            mass,
            force_accumulator: Vector3::zero(),
        }));
        BodyHandle(self.bodies.len() as u64 - 1)
    }

    fn despawn_body(&mut self, handle: BodyHandle) {
        if let Some(slot) = self.bodies.get_mut(handle.0 as usize) {
            *slot = None;
        }
    }

    fn position(&self, handle: BodyHandle) -> Vector3<f32> {
        self.bodies
            .get(handle.0 as usize)
            .and_then(Option::as_ref)
            .map(|body| body.position)
            .unwrap_or_else(Vector3::zero)
    }

    fn apply_force(&mut self, handle: BodyHandle, force: Vector3<f32>) {
        if let Some(Some(body)) = self.bodies.get_mut(handle.0 as usize) {
            body.force_accumulator += force;
        }
    }
}

fn run<B: ComputeBackend + 'static>(backend: Arc<B>, config: SimulationConfig) -> Result<()> {
    let mut controller =
        SimulationController::new(config, backend).context("creating controller")?;
    let mut world = PointMassWorld::default();

    controller.set_cadence(Cadence::EveryFrame);
    controller.spawn_population(&mut world)?;
    log::info!(
        "{} bodies, thread groups {}",
        world.live(),
        controller.thread_groups().tag()
    );

    for kind in StrategyKind::ALL {
        controller.set_strategy(kind)?;
        controller.start()?;

        let mut clock = HostClock::new(
            controller.config().fixed_delta,
            controller.config().timer_interval,
        );
        let mut last = None;
        for _ in 0..FRAMES_PER_STRATEGY {
            for tick in clock.advance_by(FRAME_TIME) {
                match controller.tick(tick, &mut world) {
                    StepOutcome::Skipped => {}
                    StepOutcome::Completed(telemetry) => last = Some(telemetry),
                    StepOutcome::PausedByWarning(telemetry) => {
                        log::warn!("{}: too slow ({}), continuing", kind, telemetry);
                        last = Some(telemetry);
                        controller.acknowledge_warning()?;
                    }
                    StepOutcome::Aborted(err) => {
                        log::error!("{}: {}", kind, err);
                        break;
                    }
                }
            }
            if !controller.is_running() {
                break;
            }
            world.integrate(FRAME_TIME.as_secs_f32());
        }
        controller.stop();

        match last {
            Some(telemetry) => log::info!(
                "{:<16} {} (min {:.2} ms, max {:.2} ms, {} samples)",
                kind.name(),
                telemetry,
                telemetry.min_ms,
                telemetry.max_ms,
                telemetry.samples
            ),
            None => log::info!("{:<16} no completed steps", kind.name()),
        }
    }

    controller.shutdown(&mut world)?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let population = args
        .next()
        .map(|text| parse_population(&text, 1024))
        .unwrap_or(1024);
    let threads_x: u32 = args.next().and_then(|t| t.parse().ok()).unwrap_or(64);
    let threads_y: u32 = args.next().and_then(|t| t.parse().ok()).unwrap_or(4);

    let config = SimulationConfig::new()
        .with_population(population)
        .with_thread_groups(ThreadGroupConfig::new(threads_x, threads_y)?)
        .with_artifact_dir(std::env::temp_dir().join("gravity-bench"));

    match WgpuBackend::new_blocking() {
        Ok(backend) => {
            log::info!("Using GPU adapter {}", backend.adapter_name());
            run(Arc::new(backend), config)
        }
        Err(err) => {
            log::warn!("{}; falling back to the software backend", err);
            run(Arc::new(SoftwareBackend::new()), config)
        }
    }
}
