//! Step scheduling
//!
//! A host loop produces [`Tick`]s (render frames, fixed physics steps and a
//! roughly 1 Hz timer). The [`Scheduler`] decides which of them fire a
//! simulation step under the selected [`Cadence`] and what delta that step
//! scales forces by.

use std::time::{Duration, Instant};

/// When a simulation step fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// On the ~1 Hz timer, delta fixed at 1.0
    OncePerSecond,
    /// Every rendered frame, wall-clock frame delta
    EveryFrame,
    /// Every fixed physics step, the fixed delta
    EveryFixedStep,
}

impl Cadence {
    pub const ALL: [Cadence; 3] = [
        Cadence::OncePerSecond,
        Cadence::EveryFrame,
        Cadence::EveryFixedStep,
    ];
}

/// A host-loop event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    Frame { delta: f32 },
    FixedStep { delta: f32 },
    Timer,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    cadence: Cadence,
    step_now: bool,
    delta: f32,
}

impl Scheduler {
    pub fn new(cadence: Cadence) -> Self {
        Self {
            cadence,
            step_now: false,
            delta: 0.0,
        }
    }

    /// Evaluate `tick` against the cadence; returns whether a step fires
    pub fn observe(&mut self, tick: Tick) -> bool {
        let fired = match (self.cadence, tick) {
            (Cadence::OncePerSecond, Tick::Timer) => Some(1.0),
            (Cadence::EveryFrame, Tick::Frame { delta }) => Some(delta),
            (Cadence::EveryFixedStep, Tick::FixedStep { delta }) => Some(delta),
            _ => None,
        };

        self.step_now = fired.is_some();
        if let Some(delta) = fired {
            self.delta = delta;
        }
        self.step_now
    }

    /// Whether the last observed tick fires a step
    pub fn should_step_now(&self) -> bool {
        self.step_now
    }

    /// Delta of the most recent firing tick
    pub fn delta_time(&self) -> f32 {
        self.delta
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    /// Takes effect on the next tick; nothing pending is replayed
    pub fn set_cadence(&mut self, cadence: Cadence) {
        if cadence != self.cadence {
            log::info!("Step cadence changed to {:?}", cadence);
        }
        self.cadence = cadence;
        self.step_now = false;
    }
}

/// Repeating timer that fires at most once per advance
#[derive(Debug, Clone)]
pub struct SecondTimer {
    interval: Duration,
    elapsed: Duration,
}

impl SecondTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            elapsed: Duration::ZERO,
        }
    }

    /// Returns true when the interval has passed; surplus time is dropped
    pub fn advance(&mut self, delta: Duration) -> bool {
        self.elapsed += delta;
        if self.elapsed >= self.interval {
            self.elapsed = Duration::ZERO;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.elapsed = Duration::ZERO;
    }
}

/// Converts wall-clock time into the tick stream of a game-style host loop
///
/// Per frame: fixed steps from an accumulator (bounded by
/// `max_fixed_steps`), then the frame tick, then the timer tick when due.
#[derive(Debug, Clone)]
pub struct HostClock {
    last: Option<Instant>,
    fixed_delta: f32,
    accumulator: f32,
    max_fixed_steps: u32,
    timer: SecondTimer,
}

impl HostClock {
    pub fn new(fixed_delta: f32, timer_interval: Duration) -> Self {
        Self {
            last: None,
            fixed_delta: fixed_delta.max(f32::EPSILON),
            accumulator: 0.0,
            max_fixed_steps: 8,
            timer: SecondTimer::new(timer_interval),
        }
    }

    pub fn with_max_fixed_steps(mut self, steps: u32) -> Self {
        self.max_fixed_steps = steps.max(1);
        self
    }

    /// Ticks for a frame presented at `now`
    pub fn frame(&mut self, now: Instant) -> Vec<Tick> {
        let delta = match self.last.replace(now) {
            Some(previous) => now.saturating_duration_since(previous),
            None => Duration::ZERO,
        };
        self.advance_by(delta)
    }

    /// Ticks for a frame that took `delta`
    pub fn advance_by(&mut self, delta: Duration) -> Vec<Tick> {
        let mut ticks = Vec::new();

        self.accumulator += delta.as_secs_f32();
        let mut steps = 0;
        while self.accumulator >= self.fixed_delta {
            if steps == self.max_fixed_steps {
                // spiral of death guard
                self.accumulator = 0.0;
                break;
            }
            ticks.push(Tick::FixedStep {
                delta: self.fixed_delta,
            });
            self.accumulator -= self.fixed_delta;
            steps += 1;
        }

        ticks.push(Tick::Frame {
            delta: delta.as_secs_f32(),
        });

        if self.timer.advance(delta) {
            ticks.push(Tick::Timer);
        }
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cadence_selects_tick_kind() {
        let mut scheduler = Scheduler::new(Cadence::EveryFrame);
        assert!(!scheduler.observe(Tick::Timer));
        assert!(!scheduler.observe(Tick::FixedStep { delta: 0.02 }));
        assert!(scheduler.observe(Tick::Frame { delta: 0.016 }));
        assert_eq!(scheduler.delta_time(), 0.016);

        scheduler.set_cadence(Cadence::OncePerSecond);
        assert!(!scheduler.should_step_now());
        assert!(!scheduler.observe(Tick::Frame { delta: 0.016 }));
        assert!(scheduler.observe(Tick::Timer));
        assert_eq!(scheduler.delta_time(), 1.0);

        scheduler.set_cadence(Cadence::EveryFixedStep);
        assert!(scheduler.observe(Tick::FixedStep { delta: 0.02 }));
        assert_eq!(scheduler.delta_time(), 0.02);
    }

    #[test]
    fn test_second_timer_does_not_replay() {
        let mut timer = SecondTimer::new(Duration::from_millis(990));
        assert!(!timer.advance(Duration::from_millis(500)));
        assert!(timer.advance(Duration::from_millis(500)));
        // a five second stall still fires only once
        assert!(timer.advance(Duration::from_secs(5)));
        assert!(!timer.advance(Duration::from_millis(10)));
    }

    #[test]
    fn test_host_clock_tick_order() {
        let mut clock = HostClock::new(0.02, Duration::from_millis(990));
        let ticks = clock.advance_by(Duration::from_millis(50));
        assert_eq!(
            ticks,
            vec![
                Tick::FixedStep { delta: 0.02 },
                Tick::FixedStep { delta: 0.02 },
                Tick::Frame { delta: 0.05 },
            ]
        );

        let ticks = clock.advance_by(Duration::from_secs(1));
        assert_eq!(ticks.last(), Some(&Tick::Timer));
    }

    #[test]
    fn test_host_clock_caps_fixed_steps() {
        let mut clock = HostClock::new(0.02, Duration::from_secs(1)).with_max_fixed_steps(3);
        let ticks = clock.advance_by(Duration::from_millis(500));
        let fixed = ticks
            .iter()
            .filter(|t| matches!(t, Tick::FixedStep { .. }))
            .count();
        assert_eq!(fixed, 3);

        let ticks = clock.advance_by(Duration::from_millis(1));
        assert_eq!(ticks, vec![Tick::Frame { delta: 0.001 }]);
    }

    #[test]
    fn test_first_frame_has_zero_delta() {
        let mut clock = HostClock::new(0.02, Duration::from_secs(1));
        assert_eq!(clock.frame(Instant::now()), vec![Tick::Frame { delta: 0.0 }]);
    }
}
