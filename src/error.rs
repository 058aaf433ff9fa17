//! Error types for the kernel, its configuration and the settings backend.

use core::fmt;

/// Fatal kernel errors.
///
/// Once latched, the scheduler stops driving PWM and shows the error code
/// on the LEDs until the board is power-cycled. The discriminant is the LED
/// position left lit by the error display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KernelError {
    /// The tick handler was re-entered before its PWM pass finished
    NestedPwm = 1,
    /// The tick handler was re-entered during a fader advance
    NestedFader = 2,
    /// An LED resolved to an output line outside the valid banks
    Isr = 3,
    /// A foreground configuration call was rejected
    Generic = 4,
}

impl KernelError {
    /// Decode a latched error register value. Zero means "no error".
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::NestedPwm,
            2 => Self::NestedFader,
            3 => Self::Isr,
            4 => Self::Generic,
            _ => return None,
        })
    }

    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::NestedPwm => "tick handler re-entered during PWM pass",
            Self::NestedFader => "tick handler re-entered during fader advance",
            Self::Isr => "LED mapped outside the output banks",
            Self::Generic => "rejected configuration",
        };
        f.write_str(message)
    }
}

impl core::error::Error for KernelError {}

/// Rejected foreground configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// LED index is not below the LED count
    LedOutOfRange(usize),
    /// LED mapped to an output line outside the banks
    PinOutOfRange(usize),
    /// Fader bounds with `lower > upper`
    InvalidBounds { lower: u8, upper: u8 },
    /// Timing rates that cannot be turned into tick counts
    InvalidTiming(&'static str),
    /// The fader interval is too short for one advance per LED
    TooFewTicks { ticks: u32, required: u32 },
    /// The settings region cannot hold the magic word and two slots
    StorageTooSmall(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LedOutOfRange(led) => write!(f, "LED {} out of range", led),
            Self::PinOutOfRange(led) => write!(f, "LED {} mapped outside the output banks", led),
            Self::InvalidBounds { lower, upper } => {
                write!(f, "fader lower bound {} above upper bound {}", lower, upper)
            }
            Self::InvalidTiming(reason) => write!(f, "invalid timing: {}", reason),
            Self::TooFewTicks { ticks, required } => write!(
                f,
                "fader interval of {} ticks, at least {} required",
                ticks, required
            ),
            Self::StorageTooSmall(size) => write!(f, "settings region of {} bytes too small", size),
        }
    }
}

impl core::error::Error for ConfigError {}

/// Settings backend failed to read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageError {
    pub offset: usize,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "settings storage access failed at offset {}", self.offset)
    }
}

impl core::error::Error for StorageError {}
