//! Execution strategy interface
//!
//! Every strategy turns one [`BodySnapshot`] into one force per body. The
//! controller selects the active strategy at runtime by [`StrategyKind`].

use super::body::{BodySnapshot, ForceBuffer};
use super::shader::KernelSource;
use crate::error::SimResult;

/// Tag selecting one of the four interchangeable strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Sequential,
    ParallelTasked,
    GpuGrid1D,
    GpuGrid2D,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Sequential,
        StrategyKind::ParallelTasked,
        StrategyKind::GpuGrid1D,
        StrategyKind::GpuGrid2D,
    ];

    /// Whether the thread-group controls apply to this strategy
    pub fn is_gpu(self) -> bool {
        matches!(self, StrategyKind::GpuGrid1D | StrategyKind::GpuGrid2D)
    }

    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::Sequential => "Sequential",
            StrategyKind::ParallelTasked => "Parallel Tasked",
            StrategyKind::GpuGrid1D => "GPU Grid 1D",
            StrategyKind::GpuGrid2D => "GPU Grid 2D",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One all-pairs force computation
///
/// Implementations are never invoked concurrently with themselves.
pub trait ExecutionStrategy {
    fn kind(&self) -> StrategyKind;

    /// Overwrite `forces` with the net force on every body of `snapshot`
    ///
    /// `forces` has already been sized to `snapshot.len()` by the caller.
    fn compute_all(&mut self, snapshot: &BodySnapshot, forces: &mut ForceBuffer) -> SimResult<()>;

    /// Release any device resources held by the strategy
    fn release(&mut self) {}

    /// Switch to a newly generated kernel
    fn reload_kernel(&mut self, _source: &KernelSource) -> SimResult<()> {
        Ok(())
    }
}
