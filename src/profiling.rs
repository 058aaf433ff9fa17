//! Continuous tick profiling.
//!
//! Tracks the shortest and longest tick duration and the shortest and
//! longest interval between tick starts, so the foreground can check the
//! handler stays well inside one tick period.

use embassy_time::{Duration, Instant};

/// Bounds observed so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileReport {
    pub min_duration: Duration,
    pub max_duration: Duration,
    /// `None` until two ticks have started
    pub min_interval: Option<Duration>,
    pub max_interval: Option<Duration>,
    pub starts: u32,
    pub stops: u32,
}

impl ProfileReport {
    /// Every start was matched by a stop
    pub const fn is_consistent(&self) -> bool {
        self.starts == self.stops
    }
}

#[derive(Debug, Clone, Default)]
pub struct TickProfiler {
    current: Option<Instant>,
    last_start: Option<Instant>,
    duration: Option<(Duration, Duration)>,
    interval: Option<(Duration, Duration)>,
    starts: u32,
    stops: u32,
}

impl TickProfiler {
    pub const fn new() -> Self {
        Self {
            current: None,
            last_start: None,
            duration: None,
            interval: None,
            starts: 0,
            stops: 0,
        }
    }

    pub fn start(&mut self, now: Instant) {
        if let Some(previous) = self.last_start {
            if let Some(interval) = now.checked_duration_since(previous) {
                self.interval = Some(widen(self.interval, interval));
            }
        }
        self.last_start = Some(now);
        self.current = Some(now);
        self.starts = self.starts.saturating_add(1);
    }

    pub fn stop(&mut self, now: Instant) {
        let Some(started) = self.current.take() else {
            return;
        };
        if let Some(duration) = now.checked_duration_since(started) {
            self.duration = Some(widen(self.duration, duration));
        }
        self.stops = self.stops.saturating_add(1);
    }

    /// `None` until one tick completed
    pub fn report(&self) -> Option<ProfileReport> {
        let (min_duration, max_duration) = self.duration?;
        Some(ProfileReport {
            min_duration,
            max_duration,
            min_interval: self.interval.map(|(min, _)| min),
            max_interval: self.interval.map(|(_, max)| max),
            starts: self.starts,
            stops: self.stops,
        })
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

fn widen(bounds: Option<(Duration, Duration)>, value: Duration) -> (Duration, Duration) {
    match bounds {
        Some((min, max)) => (min.min(value), max.max(value)),
        None => (value, value),
    }
}
