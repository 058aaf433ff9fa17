//! Abortable delay used by foreground animations.
//!
//! Animations sleep through [`AbortFlag::delay`], which busy-waits in 1 ms
//! steps and returns early once anyone raised the flag. The button handler
//! and demo mode raise it; only the animation dispatch loop lowers it
//! again before starting the next animation.

use core::sync::atomic::{AtomicBool, Ordering, fence};

use embassy_time::{Duration, Instant};

const STEP: Duration = Duration::from_millis(1);

/// Monotonic time source for delays and profiling.
pub trait Monotonic {
    fn now(&self) -> Instant;
}

/// The `embassy-time` driver of the board.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Monotonic for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// How an abortable delay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayOutcome {
    Completed,
    Aborted,
}

impl DelayOutcome {
    pub const fn is_aborted(self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// Process-wide "stop sleeping" flag.
#[derive(Debug, Default)]
pub struct AbortFlag {
    aborted: AtomicBool,
}

impl AbortFlag {
    pub const fn new() -> Self {
        Self {
            aborted: AtomicBool::new(false),
        }
    }

    /// Allow delays to run again. Called before each new animation.
    pub fn enable(&self) {
        self.aborted.store(false, Ordering::Release);
        fence(Ordering::SeqCst);
    }

    /// Make the current and every following delay return immediately
    pub fn disable(&self) {
        self.aborted.store(true, Ordering::Release);
        fence(Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Sleep for `duration`, calling `idle` on every poll.
    ///
    /// The remaining time is counted down in whole milliseconds against
    /// `clock`, so a slow `idle` does not stretch the total.
    pub fn delay<C: Monotonic>(
        &self,
        clock: &C,
        duration: Duration,
        mut idle: impl FnMut(),
    ) -> DelayOutcome {
        let mut remaining = duration.as_millis();
        let mut start = clock.now();

        while remaining > 0 && !self.is_aborted() {
            idle();
            while remaining > 0 && elapsed_since(clock, start) >= STEP {
                remaining -= 1;
                start += STEP;
            }
        }

        if self.is_aborted() {
            DelayOutcome::Aborted
        } else {
            DelayOutcome::Completed
        }
    }
}

fn elapsed_since<C: Monotonic>(clock: &C, start: Instant) -> Duration {
    clock
        .now()
        .checked_duration_since(start)
        .unwrap_or(Duration::from_ticks(0))
}
