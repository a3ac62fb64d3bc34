//! CPU execution strategies

use rayon::prelude::*;

use super::body::{BodySnapshot, ForceBuffer};
use super::kernel::force_on;
use super::traits::{ExecutionStrategy, StrategyKind};
use crate::error::SimResult;

/// Strictly serial evaluation, ascending summation order
#[derive(Debug, Default)]
pub struct Sequential;

impl Sequential {
    pub fn new() -> Self {
        Self
    }
}

impl ExecutionStrategy for Sequential {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sequential
    }

    fn compute_all(&mut self, snapshot: &BodySnapshot, forces: &mut ForceBuffer) -> SimResult<()> {
        forces.ensure_len(snapshot.len())?;
        for (i, slot) in forces.as_mut_slice().iter_mut().enumerate() {
            *slot = force_on(i, snapshot);
        }
        Ok(())
    }
}

/// Per-body evaluations fanned out over a dedicated worker pool
///
/// Each task writes only its own slot; `compute_all` returns after the join.
pub struct ParallelTasked {
    pool: rayon::ThreadPool,
}

impl ParallelTasked {
    pub fn new(worker_threads: usize) -> SimResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_threads.max(1))
            .thread_name(|i| format!("gravity-worker-{}", i))
            .build()?;

        log::debug!("Started {} gravity workers", pool.current_num_threads());
        Ok(Self { pool })
    }

    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl ExecutionStrategy for ParallelTasked {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ParallelTasked
    }

    fn compute_all(&mut self, snapshot: &BodySnapshot, forces: &mut ForceBuffer) -> SimResult<()> {
        forces.ensure_len(snapshot.len())?;
        self.pool.install(|| {
            forces
                .as_mut_slice()
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, slot)| *slot = force_on(i, snapshot));
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{InnerSpace, Vector3};

    fn scattered(n: usize) -> BodySnapshot {
        BodySnapshot::from_parts(
            (0..n)
                .map(|i| {
                    let f = i as f32;
                    Vector3::new((f * 7.3) % 200.0 - 100.0, (f * 3.1) % 200.0 - 100.0, (f * 1.7) % 50.0)
                })
                .collect(),
            (0..n).map(|i| 1.0 + (i % 97) as f32 * 100.0).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let snapshot = scattered(257);
        let mut sequential = ForceBuffer::new(snapshot.len());
        let mut parallel = ForceBuffer::new(snapshot.len());

        Sequential::new().compute_all(&snapshot, &mut sequential).unwrap();
        ParallelTasked::new(4)
            .unwrap()
            .compute_all(&snapshot, &mut parallel)
            .unwrap();

        for (a, b) in sequential.as_slice().iter().zip(parallel.as_slice()) {
            let scale = a.magnitude().max(f32::MIN_POSITIVE);
            assert!((*a - *b).magnitude() / scale <= 1e-3);
        }
    }

    #[test]
    fn test_rejects_unsized_force_buffer() {
        let snapshot = scattered(5);
        let mut forces = ForceBuffer::new(4);
        assert!(Sequential::new().compute_all(&snapshot, &mut forces).is_err());
    }

    #[test]
    fn test_zero_workers_falls_back_to_one() {
        assert_eq!(ParallelTasked::new(0).unwrap().worker_threads(), 1);
    }
}
