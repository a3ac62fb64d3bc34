//! GPU execution strategies
//!
//! [`GpuStrategy`] drives either entry point of the generated kernel through a
//! [`ComputeBackend`]. Device buffers belong to the strategy. They are checked
//! against the current population at the start of every step and reallocated
//! when the size differs, and they are freed when the strategy is released or
//! dropped.

use std::sync::Arc;

use cgmath::{Vector3, Zero};

use super::backend::{ComputeBackend, DeviceBuffers, GpuBody, GpuForce};
use super::body::{BodySnapshot, ForceBuffer};
use super::shader::{KernelEntry, KernelSource, ThreadGroupConfig};
use super::traits::{ExecutionStrategy, StrategyKind};
use crate::error::{SimResult, SimulationError};

pub struct GpuStrategy<B: ComputeBackend> {
    entry: KernelEntry,
    backend: Arc<B>,
    config: ThreadGroupConfig,
    kernel: B::Kernel,
    buffers: Option<B::Buffers>,
}

impl<B: ComputeBackend> GpuStrategy<B> {
    /// 1-D strategy: one thread per contiguous body range, full inner loop
    ///
    /// # Arguments
    /// * `backend` - Backend that compiles the kernel and owns device memory
    /// * `source` - Generated kernel; its shape becomes the dispatch shape
    pub fn grid_1d(backend: Arc<B>, source: &KernelSource) -> SimResult<Self> {
        Self::new(KernelEntry::OneDimensional, backend, source)
    }

    /// 2-D strategy: body ranges along X, source ranges along Y
    ///
    /// The host sums each body's row of `Y` partials.
    ///
    /// # Arguments
    /// * `backend` - Backend that compiles the kernel and owns device memory
    /// * `source` - Generated kernel; its shape becomes the dispatch shape
    pub fn grid_2d(backend: Arc<B>, source: &KernelSource) -> SimResult<Self> {
        Self::new(KernelEntry::TwoDimensional, backend, source)
    }

    fn new(entry: KernelEntry, backend: Arc<B>, source: &KernelSource) -> SimResult<Self> {
        let kernel = backend.compile(source)?;
        Ok(Self {
            entry,
            backend,
            config: source.config,
            kernel,
            buffers: None,
        })
    }

    pub fn config(&self) -> ThreadGroupConfig {
        self.config
    }

    pub fn has_buffers(&self) -> bool {
        self.buffers.is_some()
    }

    /// Buffers sized for exactly `body_count` bodies and `result_len` slots
    fn take_buffers(&mut self, body_count: usize, result_len: usize) -> SimResult<B::Buffers> {
        match self.buffers.take() {
            Some(buffers)
                if buffers.body_count() == body_count && buffers.result_len() == result_len =>
            {
                Ok(buffers)
            }
            previous => {
                if previous.is_some() {
                    log::debug!("Device buffers no longer match {} bodies, reallocating", body_count);
                }
                drop(previous);
                log::info!(
                    "Allocating {} buffers for {} bodies ({} result slots)",
                    self.backend.name(),
                    body_count,
                    result_len
                );
                self.backend.allocate(body_count, result_len)
            }
        }
    }

    fn reduce(&self, results: &[GpuForce], forces: &mut ForceBuffer) {
        match self.entry {
            KernelEntry::OneDimensional => {
                for (slot, result) in forces.as_mut_slice().iter_mut().zip(results) {
                    *slot = result.vector();
                }
            }
            KernelEntry::TwoDimensional => {
                let row = self.config.y() as usize;
                for (slot, partials) in forces.as_mut_slice().iter_mut().zip(results.chunks(row)) {
                    *slot = partials
                        .iter()
                        .fold(Vector3::zero(), |total, p| total + p.vector());
                }
            }
        }
    }
}

impl<B: ComputeBackend> ExecutionStrategy for GpuStrategy<B> {
    fn kind(&self) -> StrategyKind {
        match self.entry {
            KernelEntry::OneDimensional => StrategyKind::GpuGrid1D,
            KernelEntry::TwoDimensional => StrategyKind::GpuGrid2D,
        }
    }

    fn compute_all(&mut self, snapshot: &BodySnapshot, forces: &mut ForceBuffer) -> SimResult<()> {
        let n = snapshot.len();
        forces.ensure_len(n)?;

        self.config.validate_for(self.entry, n)?;
        let result_len = self.config.result_len(self.entry, n);
        self.backend.limits().check(self.config, result_len)?;

        let bodies: Vec<GpuBody> = snapshot
            .positions()
            .iter()
            .zip(snapshot.masses())
            .map(|(&position, &mass)| GpuBody::new(position, mass))
            .collect();

        let mut buffers = self.take_buffers(n, result_len)?;
        let dispatched = self
            .backend
            .dispatch(&self.kernel, self.entry, &mut buffers, &bodies);
        self.buffers = Some(buffers);
        let results = dispatched?;

        if results.len() != result_len {
            return Err(SimulationError::LengthMismatch {
                what: "device results",
                expected: result_len,
                found: results.len(),
            });
        }

        self.reduce(&results, forces);
        Ok(())
    }

    fn release(&mut self) {
        if self.buffers.take().is_some() {
            log::debug!("Released {} device buffers", self.backend.name());
        }
    }

    fn reload_kernel(&mut self, source: &KernelSource) -> SimResult<()> {
        self.kernel = self.backend.compile(source)?;
        self.config = source.config;
        self.release();
        Ok(())
    }
}
