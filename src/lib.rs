#![no_std]

pub mod brightness;
pub mod buttons;
pub mod control;
pub mod delay;
pub mod error;
pub mod events;
pub mod fader;
pub mod profiling;
pub mod pwm;
pub mod scheduler;
pub mod settings;
pub mod timing;

pub use brightness::{Brightness, BrightnessScale};
pub use buttons::{Button, ButtonController, ButtonSample, ButtonThresholds};
pub use control::ControlState;
pub use delay::{AbortFlag, DelayOutcome, Monotonic, SystemClock};
pub use error::{ConfigError, KernelError, StorageError};
pub use events::{EventChannel, KernelEvent};
pub use fader::{Effect, FaderConfig, FaderState};
pub use profiling::{ProfileReport, TickProfiler};
pub use pwm::{Level, LedPin, PinMap, PwmEngine};
pub use scheduler::{ReentrancyProtection, Scheduler, SchedulerConfig};
pub use settings::{RamStorage, Settings, SettingsStorage, SettingsStore};
pub use timing::{KernelTiming, TimingConfig};

pub use embassy_time::{Duration, Instant};

/// Output lines of the board, grouped in 8-line banks
///
/// Implement this trait to support different hardware platforms.
/// The scheduler writes every bank that carries LEDs once per tick.
pub trait OutputBanks {
    /// Drive the lines selected by `mask`; bit set in `levels` = high
    fn write_bank(&mut self, bank: usize, mask: u8, levels: u8);
}

/// Raw button pins, sampled once per fader-update interval
pub trait ButtonInput {
    fn sample(&mut self) -> ButtonSample;
}
