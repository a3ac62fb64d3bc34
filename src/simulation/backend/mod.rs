//! # Compute Backends
//!
//! The GPU strategies never talk to a device directly. They go through the
//! [`ComputeBackend`] capability, which compiles generated kernel text,
//! allocates device buffers and runs a blocking dispatch + readback.
//!
//! - [`SoftwareBackend`]: deterministic CPU emulation of the generated kernel
//! - [`WgpuBackend`]: real device dispatch through wgpu

mod software;
mod device;

pub use self::software::{SoftwareBackend, SoftwareBuffers, SoftwareKernel};
pub use self::device::{WgpuBackend, WgpuBuffers, WgpuKernel};

use cgmath::Vector3;

use super::shader::{KernelEntry, KernelSource, ThreadGroupConfig};
use crate::error::{SimResult, SimulationError};

/// Body layout shared with the kernel's `Body` struct (16 bytes)
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuBody {
    pub position: [f32; 3],
    pub mass: f32,
}

impl GpuBody {
    pub fn new(position: Vector3<f32>, mass: f32) -> Self {
        Self {
            position: position.into(),
            mass,
        }
    }
}

/// One result slot, laid out as `vec4<f32>` (w unused)
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuForce {
    pub force: [f32; 3],
    pub _padding: f32,
}

impl GpuForce {
    pub fn new(force: Vector3<f32>) -> Self {
        Self {
            force: force.into(),
            _padding: 0.0,
        }
    }

    pub fn vector(&self) -> Vector3<f32> {
        Vector3::from(self.force)
    }
}

/// Kernel uniform parameters
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct KernelParams {
    pub body_count: u32,
    pub _padding: [u32; 3],
}

/// Dispatch-shape limits of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchLimits {
    pub max_threads_per_group: u32,
    pub max_group_size_x: u32,
    pub max_group_size_y: u32,
    /// Largest result buffer the device can bind, in bytes
    pub max_result_bytes: u64,
}

impl DispatchLimits {
    /// Reject shapes or result sizes the device cannot run
    pub fn check(&self, config: ThreadGroupConfig, result_len: usize) -> SimResult<()> {
        if config.x() > self.max_group_size_x {
            return Err(SimulationError::DeviceLimit {
                what: "workgroup size X",
                requested: config.x() as u64,
                limit: self.max_group_size_x as u64,
            });
        }
        if config.y() > self.max_group_size_y {
            return Err(SimulationError::DeviceLimit {
                what: "workgroup size Y",
                requested: config.y() as u64,
                limit: self.max_group_size_y as u64,
            });
        }
        if config.threads() > self.max_threads_per_group {
            return Err(SimulationError::DeviceLimit {
                what: "invocations per workgroup",
                requested: config.threads() as u64,
                limit: self.max_threads_per_group as u64,
            });
        }

        let result_bytes = (result_len * std::mem::size_of::<GpuForce>()) as u64;
        if result_bytes > self.max_result_bytes {
            return Err(SimulationError::DeviceLimit {
                what: "result buffer bytes",
                requested: result_bytes,
                limit: self.max_result_bytes,
            });
        }
        Ok(())
    }
}

/// Device buffers owned by a GPU strategy; released on drop
pub trait DeviceBuffers {
    /// Bodies the buffers were sized for
    fn body_count(&self) -> usize;

    /// Result slots the buffers were sized for
    fn result_len(&self) -> usize;
}

/// Capability interface hiding the device from the strategies
pub trait ComputeBackend: Send + Sync {
    type Kernel;
    type Buffers: DeviceBuffers;

    fn name(&self) -> &str;

    fn limits(&self) -> DispatchLimits;

    /// Compile (or load) generated kernel text
    fn compile(&self, source: &KernelSource) -> SimResult<Self::Kernel>;

    /// Allocate buffers for `body_count` bodies and `result_len` result slots
    fn allocate(&self, body_count: usize, result_len: usize) -> SimResult<Self::Buffers>;

    /// Upload `bodies`, run `entry` and read every result slot back (blocking)
    fn dispatch(
        &self,
        kernel: &Self::Kernel,
        entry: KernelEntry,
        buffers: &mut Self::Buffers,
        bodies: &[GpuBody],
    ) -> SimResult<Vec<GpuForce>>;
}
