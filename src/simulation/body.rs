//! Bodies, snapshots and the external physics collaborator
//!
//! The authoritative position of every body lives in an external
//! [`PhysicsWorld`]. The core keeps identity, mass and a handle, takes an
//! immutable [`BodySnapshot`] once per step and hands forces back through
//! [`PhysicsWorld::apply_force`]. It never integrates motion itself.

use cgmath::{Vector3, Zero};
use rand::Rng;

use crate::config::SpawnSettings;
use crate::error::{SimResult, SimulationError};

/// Opaque handle to a body owned by the physics world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub u64);

/// Contract of the external physics/rendering collaborator
pub trait PhysicsWorld {
    /// Create a body and return the handle the core will address it by
    fn spawn_body(&mut self, position: Vector3<f32>, mass: f32) -> BodyHandle;

    /// Destroy a body previously returned by `spawn_body`
    fn despawn_body(&mut self, handle: BodyHandle);

    /// Current authoritative position
    fn position(&self, handle: BodyHandle) -> Vector3<f32>;

    /// Add an instantaneous force contribution to the body's integrator
    fn apply_force(&mut self, handle: BodyHandle, force: Vector3<f32>);
}

/// A point mass participating in the simulation
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub index: usize,
    pub position: Vector3<f32>,
    pub mass: f32,
    pub handle: BodyHandle,
}

/// Bodies instantiated together; destroyed together
#[derive(Debug, Default)]
pub struct Population {
    bodies: Vec<Body>,
}

impl Population {
    /// Spawn `count` bodies in `world` at random grid positions with random masses
    pub fn spawn<R: Rng>(
        world: &mut dyn PhysicsWorld,
        count: usize,
        settings: &SpawnSettings,
        rng: &mut R,
    ) -> Self {
        let extent = settings.extent.max(1);
        let max_mass = settings.max_mass.max(settings.min_mass + 1);

        let bodies = (0..count)
            .map(|index| {
                let position = Vector3::new(
                    rng.random_range(-extent..extent) as f32,
                    rng.random_range(-extent..extent) as f32,
                    rng.random_range(-extent..extent) as f32,
                );
                let mass = rng.random_range(settings.min_mass..max_mass) as f32;
                let handle = world.spawn_body(position, mass);
                Body {
                    index,
                    position,
                    mass,
                    handle,
                }
            })
            .collect();

        log::info!("Spawned {} bodies", count);
        Self { bodies }
    }

    /// Adopt bodies that already exist in the world
    pub fn from_bodies(bodies: Vec<Body>) -> Self {
        Self { bodies }
    }

    /// Destroy every body in the world
    pub fn despawn(self, world: &mut dyn PhysicsWorld) {
        let count = self.bodies.len();
        for body in self.bodies {
            world.despawn_body(body.handle);
        }
        log::info!("Despawned {} bodies", count);
    }

    /// Pull current positions from the world
    pub fn refresh(&mut self, world: &dyn PhysicsWorld) {
        for body in &mut self.bodies {
            body.position = world.position(body.handle);
        }
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

/// Immutable per-step copy of positions and masses, indexed `0..N`
#[derive(Debug, Clone, PartialEq)]
pub struct BodySnapshot {
    positions: Vec<Vector3<f32>>,
    masses: Vec<f32>,
}

impl BodySnapshot {
    /// Refresh positions from the world and copy them with the masses
    pub fn capture(population: &mut Population, world: &dyn PhysicsWorld) -> Self {
        population.refresh(world);
        let (positions, masses) = population
            .bodies()
            .iter()
            .map(|body| (body.position, body.mass))
            .unzip();
        Self { positions, masses }
    }

    pub fn from_parts(positions: Vec<Vector3<f32>>, masses: Vec<f32>) -> SimResult<Self> {
        if positions.len() != masses.len() {
            return Err(SimulationError::LengthMismatch {
                what: "mass array",
                expected: positions.len(),
                found: masses.len(),
            });
        }
        Ok(Self { positions, masses })
    }

    pub fn positions(&self) -> &[Vector3<f32>] {
        &self.positions
    }

    pub fn masses(&self) -> &[f32] {
        &self.masses
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// One force vector per body; overwritten every step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForceBuffer {
    forces: Vec<Vector3<f32>>,
}

impl ForceBuffer {
    pub fn new(len: usize) -> Self {
        Self {
            forces: vec![Vector3::zero(); len],
        }
    }

    /// Resize to `len` and zero every slot
    pub fn reset(&mut self, len: usize) {
        self.forces.clear();
        self.forces.resize(len, Vector3::zero());
    }

    /// Fail unless the buffer holds exactly one slot per snapshot body
    pub fn ensure_len(&self, expected: usize) -> SimResult<()> {
        if self.forces.len() != expected {
            return Err(SimulationError::LengthMismatch {
                what: "force buffer",
                expected,
                found: self.forces.len(),
            });
        }
        Ok(())
    }

    pub fn as_slice(&self) -> &[Vector3<f32>] {
        &self.forces
    }

    pub fn as_mut_slice(&mut self) -> &mut [Vector3<f32>] {
        &mut self.forces
    }

    pub fn len(&self) -> usize {
        self.forces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forces.is_empty()
    }
}
