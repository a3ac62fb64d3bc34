//! # Step Timing
//!
//! Tracks how long each simulation step takes and decides when the run has
//! become too slow to continue unattended.
//!
//! - A bounded rolling window of recent step durations (oldest evicted first)
//! - Moving average recomputed from the full window
//! - A level-triggered degradation signal on the latest single step
//!
//! ## Usage
//!
//! ```rust
//! use gravity_bench::performance::PerformanceMonitor;
//!
//! let mut monitor = PerformanceMonitor::new();
//!
//! monitor.begin_step();
//! // ... compute and apply forces ...
//! let last_ms = monitor.end_step();
//!
//! println!("{} ({} ms)", monitor.telemetry(), last_ms);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

/// Steps kept for averaging
pub const DEFAULT_WINDOW: usize = 50;
/// A single step slower than this is a degradation
pub const DEFAULT_SLOW_STEP_MS: f32 = 1000.0;

/// Snapshot of the timing window, reported once per step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    pub last_ms: f32,
    pub average_ms: f32,
    pub min_ms: f32,
    pub max_ms: f32,
    pub samples: usize,
}

impl fmt::Display for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} ms / {:.2} ms", self.last_ms, self.average_ms)
    }
}

pub struct PerformanceMonitor {
    /// Ring buffer of recent step times in milliseconds
    step_times: VecDeque<f32>,
    max_samples: usize,
    slow_step_ms: f32,
    average_ms: f32,
    step_start: Option<Instant>,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_WINDOW, DEFAULT_SLOW_STEP_MS)
    }

    pub fn with_config(max_samples: usize, slow_step_ms: f32) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            step_times: VecDeque::with_capacity(max_samples + 1),
            max_samples,
            slow_step_ms,
            average_ms: 0.0,
            step_start: None,
        }
    }

    /// Mark the beginning of a step
    pub fn begin_step(&mut self) {
        self.step_start = Some(Instant::now());
    }

    /// Record the time since `begin_step`; returns it in milliseconds
    pub fn end_step(&mut self) -> f32 {
        let elapsed_ms = self
            .step_start
            .take()
            .map(|start| start.elapsed().as_secs_f32() * 1000.0)
            .unwrap_or(0.0);
        self.record(elapsed_ms);
        elapsed_ms
    }

    /// Append a step duration, evicting the oldest beyond capacity
    pub fn record(&mut self, duration_ms: f32) {
        self.step_times.push_back(duration_ms);
        while self.step_times.len() > self.max_samples {
            self.step_times.pop_front();
        }
        self.average_ms = self.step_times.iter().sum::<f32>() / self.step_times.len() as f32;
    }

    /// Whether the most recent step exceeded the slow-step threshold
    pub fn is_degraded(&self) -> bool {
        self.last_ms().is_some_and(|last| last > self.slow_step_ms)
    }

    pub fn last_ms(&self) -> Option<f32> {
        self.step_times.back().copied()
    }

    pub fn average_ms(&self) -> f32 {
        self.average_ms
    }

    /// Step times for graphing, oldest first
    pub fn history(&self) -> Vec<f32> {
        self.step_times.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.step_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.step_times.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_samples
    }

    pub fn slow_step_ms(&self) -> f32 {
        self.slow_step_ms
    }

    /// Forget every sample (strategy or population changed)
    pub fn clear(&mut self) {
        self.step_times.clear();
        self.average_ms = 0.0;
        self.step_start = None;
    }

    pub fn telemetry(&self) -> Telemetry {
        let min_ms = self.step_times.iter().copied().fold(f32::INFINITY, f32::min);
        let max_ms = self.step_times.iter().copied().fold(0.0, f32::max);
        Telemetry {
            last_ms: self.last_ms().unwrap_or(0.0),
            average_ms: self.average_ms,
            min_ms: if min_ms.is_finite() { min_ms } else { 0.0 },
            max_ms,
            samples: self.step_times.len(),
        }
    }
}
