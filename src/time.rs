//! Animation scheduling and work budgets.
//!
//! The engine runs cooperatively on the host's thread. [`AnimationClock`]
//! decides when the next animation tick is due (about every 40 ms), and
//! [`FrameBudget`] bounds how long a slice of incremental work, such as a
//! field scan, may run before handing control back.
//!
//! # Example
//!
//! ```ignore
//! use windtrail::time::{AnimationClock, FrameBudget};
//!
//! let mut clock = AnimationClock::default();
//!
//! // In the host loop:
//! engine.pump_with(&FrameBudget::new(Duration::from_millis(100)));
//! if clock.poll(Instant::now()) {
//!     let draw = engine.tick();
//! }
//! ```

use std::time::{Duration, Instant};

/// Default interval between animation ticks.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(40);

/// Fixed-interval tick scheduler.
///
/// Ticks never overlap and never burst: if the host falls behind, the next
/// tick is scheduled one interval after the late one.
#[derive(Debug)]
pub struct AnimationClock {
    /// Time between ticks.
    interval: Duration,
    /// When the next tick is due, `None` before the first poll.
    next_due: Option<Instant>,
    /// Total ticks fired.
    frame_count: u64,
    /// Ticks per second measured over the last window.
    fps: f32,
    /// Tick count at last FPS update.
    fps_frame_count: u64,
    /// Start of the current FPS window.
    fps_update_time: Option<Instant>,
    /// Whether ticks are suspended.
    paused: bool,
}

impl AnimationClock {
    /// Create a clock firing every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            next_due: None,
            frame_count: 0,
            fps: 0.0,
            fps_frame_count: 0,
            fps_update_time: None,
            paused: false,
        }
    }

    /// Interval between ticks.
    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns `true` when a tick is due at `now` and schedules the next one.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.paused {
            return false;
        }
        if let Some(due) = self.next_due {
            if now < due {
                return false;
            }
        }
        self.next_due = Some(now + self.interval);
        self.frame_count += 1;

        let window_start = *self.fps_update_time.get_or_insert(now);
        let window = now.duration_since(window_start);
        if window >= Duration::from_millis(500) {
            self.fps = (self.frame_count - self.fps_frame_count) as f32 / window.as_secs_f32();
            self.fps_frame_count = self.frame_count;
            self.fps_update_time = Some(now);
        }
        true
    }

    /// How long the host may sleep before the next tick.
    pub fn time_until_next(&self, now: Instant) -> Duration {
        match self.next_due {
            Some(due) => due.saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// Total ticks fired.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    /// Measured ticks per second.
    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Suspend ticking.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume ticking; the next poll fires immediately.
    pub fn resume(&mut self) {
        self.paused = false;
        self.next_due = None;
    }

    /// Whether ticking is suspended.
    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl Default for AnimationClock {
    fn default() -> Self {
        Self::new(FRAME_INTERVAL)
    }
}

/// Wall-clock allowance for one slice of incremental work.
#[derive(Clone, Copy, Debug)]
pub struct FrameBudget {
    start: Instant,
    budget: Option<Duration>,
}

impl FrameBudget {
    /// A budget of `budget` starting now.
    pub fn new(budget: Duration) -> Self {
        Self {
            start: Instant::now(),
            budget: Some(budget),
        }
    }

    /// A budget that never runs out.
    pub fn unlimited() -> Self {
        Self {
            start: Instant::now(),
            budget: None,
        }
    }

    /// Time spent since the budget started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Whether the allowance is used up.
    pub fn exceeded(&self) -> bool {
        match self.budget {
            Some(budget) => self.start.elapsed() >= budget,
            None => false,
        }
    }
}
