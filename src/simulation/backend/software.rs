//! Software compute backend
//!
//! Runs the generated kernel's thread decomposition on the host, one
//! emulated invocation at a time, so GPU strategies can be tested
//! deterministically without a device. The `@workgroup_size` directive of the
//! generated text is parsed at compile time and must match the configuration
//! the text claims to be generated for.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cgmath::{Vector3, Zero};

use super::{ComputeBackend, DeviceBuffers, DispatchLimits, GpuBody, GpuForce};
use crate::error::{SimResult, SimulationError};
use crate::simulation::kernel::pair_force;
use crate::simulation::shader::{
    parse_workgroup_size, KernelEntry, KernelSource, ThreadGroupConfig, MAX_THREADS_PER_AXIS,
};

#[derive(Debug, Default)]
struct AllocationCounters {
    allocations: AtomicUsize,
    live: AtomicUsize,
    dispatches: AtomicUsize,
    compiles: AtomicUsize,
}

/// Host emulation of a compute device
#[derive(Debug, Clone)]
pub struct SoftwareBackend {
    limits: DispatchLimits,
    counters: Arc<AllocationCounters>,
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareBackend {
    /// Backend accepting every shape the selectors can produce
    pub fn new() -> Self {
        Self::with_limits(DispatchLimits {
            max_threads_per_group: MAX_THREADS_PER_AXIS * MAX_THREADS_PER_AXIS,
            max_group_size_x: MAX_THREADS_PER_AXIS,
            max_group_size_y: MAX_THREADS_PER_AXIS,
            max_result_bytes: u64::MAX,
        })
    }

    /// Backend enforcing specific device limits
    pub fn with_limits(limits: DispatchLimits) -> Self {
        Self {
            limits,
            counters: Arc::new(AllocationCounters::default()),
        }
    }

    /// Total buffer sets ever allocated
    pub fn allocations(&self) -> usize {
        self.counters.allocations.load(Ordering::SeqCst)
    }

    /// Buffer sets currently alive
    pub fn live_buffers(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub fn dispatches(&self) -> usize {
        self.counters.dispatches.load(Ordering::SeqCst)
    }

    pub fn compiles(&self) -> usize {
        self.counters.compiles.load(Ordering::SeqCst)
    }
}

/// A "compiled" kernel: the shape read back from the generated text
#[derive(Debug, Clone, PartialEq)]
pub struct SoftwareKernel {
    pub config: ThreadGroupConfig,
}

/// Host-side stand-in for device buffers
#[derive(Debug)]
pub struct SoftwareBuffers {
    bodies: Vec<GpuBody>,
    results: Vec<GpuForce>,
    counters: Arc<AllocationCounters>,
}

impl DeviceBuffers for SoftwareBuffers {
    fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn result_len(&self) -> usize {
        self.results.len()
    }
}

impl Drop for SoftwareBuffers {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ComputeBackend for SoftwareBackend {
    type Kernel = SoftwareKernel;
    type Buffers = SoftwareBuffers;

    fn name(&self) -> &str {
        "software"
    }

    fn limits(&self) -> DispatchLimits {
        self.limits
    }

    fn compile(&self, source: &KernelSource) -> SimResult<SoftwareKernel> {
        let (x, y, z) = parse_workgroup_size(&source.text).ok_or_else(|| {
            SimulationError::Kernel(format!("{}: missing @workgroup_size", source.name()))
        })?;

        if (x, y, z) != (source.config.x(), source.config.y(), 1) {
            return Err(SimulationError::Kernel(format!(
                "{}: directive ({}, {}, {}) does not match configuration {}",
                source.name(),
                x,
                y,
                z,
                source.config.tag()
            )));
        }
        for entry in [KernelEntry::OneDimensional, KernelEntry::TwoDimensional] {
            if !source.text.contains(&format!("fn {}(", entry.name())) {
                return Err(SimulationError::Kernel(format!(
                    "{}: missing entry point {}",
                    source.name(),
                    entry.name()
                )));
            }
        }

        self.counters.compiles.fetch_add(1, Ordering::SeqCst);
        Ok(SoftwareKernel {
            config: ThreadGroupConfig::new(x, y)?,
        })
    }

    fn allocate(&self, body_count: usize, result_len: usize) -> SimResult<SoftwareBuffers> {
        self.counters.allocations.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_add(1, Ordering::SeqCst);
        Ok(SoftwareBuffers {
            bodies: vec![GpuBody::new(Vector3::zero(), 0.0); body_count],
            results: vec![GpuForce::default(); result_len],
            counters: Arc::clone(&self.counters),
        })
    }

    fn dispatch(
        &self,
        kernel: &SoftwareKernel,
        entry: KernelEntry,
        buffers: &mut SoftwareBuffers,
        bodies: &[GpuBody],
    ) -> SimResult<Vec<GpuForce>> {
        if bodies.len() != buffers.bodies.len() {
            return Err(SimulationError::LengthMismatch {
                what: "body buffer",
                expected: bodies.len(),
                found: buffers.bodies.len(),
            });
        }
        buffers.bodies.copy_from_slice(bodies);

        let n = bodies.len();
        let threads_x = kernel.config.x() as usize;
        let threads_y = kernel.config.y() as usize;
        let expected_results = match entry {
            KernelEntry::OneDimensional => n,
            KernelEntry::TwoDimensional => n * threads_y,
        };
        if buffers.results.len() != expected_results {
            return Err(SimulationError::LengthMismatch {
                what: "result buffer",
                expected: expected_results,
                found: buffers.results.len(),
            });
        }

        for id_y in 0..threads_y {
            for id_x in 0..threads_x {
                match entry {
                    KernelEntry::OneDimensional => {
                        if id_y != 0 {
                            continue;
                        }
                        let owned = id_x * n / threads_x..(id_x + 1) * n / threads_x;
                        for i in owned {
                            if i >= n {
                                continue;
                            }
                            let total = accumulate(&buffers.bodies, i, 0..n);
                            buffers.results[i] = GpuForce::new(total);
                        }
                    }
                    KernelEntry::TwoDimensional => {
                        let owned = id_x * n / threads_x..(id_x + 1) * n / threads_x;
                        let sources = id_y * n / threads_y..(id_y + 1) * n / threads_y;
                        for i in owned {
                            if i >= n {
                                continue;
                            }
                            let partial = accumulate(&buffers.bodies, i, sources.clone());
                            buffers.results[i * threads_y + id_y] = GpuForce::new(partial);
                        }
                    }
                }
            }
        }

        self.counters.dispatches.fetch_add(1, Ordering::SeqCst);
        Ok(buffers.results.clone())
    }
}

fn accumulate(bodies: &[GpuBody], i: usize, sources: std::ops::Range<usize>) -> Vector3<f32> {
    let current = bodies[i];
    let position = Vector3::from(current.position);
    bodies[sources]
        .iter()
        .filter_map(|other| {
            pair_force(
                position,
                current.mass,
                Vector3::from(other.position),
                other.mass,
            )
        })
        .fold(Vector3::zero(), |total, force| total + force)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::shader::KernelSourceGenerator;

    fn line_of_bodies(n: usize) -> Vec<GpuBody> {
        (0..n)
            .map(|i| GpuBody::new(Vector3::new(i as f32 * 3.0, 0.0, 0.0), 1.0 + i as f32))
            .collect()
    }

    #[test]
    fn test_compile_checks_directive() {
        let backend = SoftwareBackend::new();
        let mut source = KernelSourceGenerator::new().generate(ThreadGroupConfig::new(8, 2).unwrap());
        let kernel = backend.compile(&source).unwrap();
        assert_eq!(kernel.config, source.config);
        assert_eq!(backend.compiles(), 1);

        source.config = ThreadGroupConfig::new(4, 2).unwrap();
        assert!(matches!(backend.compile(&source), Err(SimulationError::Kernel(_))));
    }

    #[test]
    fn test_buffers_are_counted_until_dropped() {
        let backend = SoftwareBackend::new();
        let a = backend.allocate(10, 10).unwrap();
        let b = backend.allocate(10, 20).unwrap();
        assert_eq!(backend.allocations(), 2);
        assert_eq!(backend.live_buffers(), 2);
        assert_eq!(b.result_len(), 20);
        drop(a);
        assert_eq!(backend.live_buffers(), 1);
        drop(b);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_one_dimensional_uneven_split_covers_every_body() {
        let backend = SoftwareBackend::new();
        let source = KernelSourceGenerator::new().generate(ThreadGroupConfig::new(4, 1).unwrap());
        let kernel = backend.compile(&source).unwrap();

        let bodies = line_of_bodies(7);
        let mut buffers = backend.allocate(7, 7).unwrap();
        let results = backend
            .dispatch(&kernel, KernelEntry::OneDimensional, &mut buffers, &bodies)
            .unwrap();

        assert_eq!(results.len(), 7);
        // leftmost body is pulled right, rightmost pulled left
        assert!(results[0].force[0] > 0.0);
        assert!(results[6].force[0] < 0.0);
        assert!(results.iter().all(|r| r.force[0] != 0.0));
    }

    #[test]
    fn test_two_dimensional_rows_sum_to_full_force() {
        let backend = SoftwareBackend::new();
        let config = ThreadGroupConfig::new(2, 4).unwrap();
        let kernel = backend
            .compile(&KernelSourceGenerator::new().generate(config))
            .unwrap();

        let bodies = line_of_bodies(9);
        let mut full_buffers = backend.allocate(9, 9).unwrap();
        let full = backend
            .dispatch(&kernel, KernelEntry::OneDimensional, &mut full_buffers, &bodies)
            .unwrap();

        let mut grid_buffers = backend.allocate(9, 9 * 4).unwrap();
        let grid = backend
            .dispatch(&kernel, KernelEntry::TwoDimensional, &mut grid_buffers, &bodies)
            .unwrap();

        for i in 0..9 {
            let row: f32 = grid[i * 4..(i + 1) * 4].iter().map(|p| p.force[0]).sum();
            let expected = full[i].force[0];
            assert!((row - expected).abs() <= expected.abs() * 1e-4);
        }
    }

    #[test]
    fn test_dispatch_rejects_stale_buffers() {
        let backend = SoftwareBackend::new();
        let kernel = backend
            .compile(&KernelSourceGenerator::new().generate(ThreadGroupConfig::default()))
            .unwrap();
        let mut buffers = backend.allocate(5, 5).unwrap();
        let err = backend
            .dispatch(&kernel, KernelEntry::OneDimensional, &mut buffers, &line_of_bodies(6))
            .unwrap_err();
        assert!(matches!(err, SimulationError::LengthMismatch { .. }));
    }
}
