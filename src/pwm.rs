//! Software PWM engine
//!
//! Every tick the engine compares a free-running phase against each LED's
//! scaled duty and collects the resulting levels per output bank, so the
//! driver performs one write per bank instead of one per LED.

use crate::OutputBanks;
use crate::error::{ConfigError, KernelError};

/// Length of one PWM cycle in ticks.
pub const PWM_STEPS: u8 = 255;

/// Number of 8-line output banks an LED may be mapped to.
pub const MAX_BANKS: usize = 4;

const BANK_WIDTH: u8 = 8;

/// Logic level of one output line.
///
/// LEDs are wired active-low: a line driven low lights its LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Output level for `duty` at the given PWM phase
    pub const fn at_phase(phase: u8, duty: u8) -> Self {
        if phase >= duty { Self::High } else { Self::Low }
    }
}

/// Output line of one LED: a bit within a bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedPin {
    pub bank: u8,
    pub bit: u8,
}

impl LedPin {
    /// Map a board pin number onto consecutive 8-line banks
    pub const fn from_pin_number(pin: u8) -> Self {
        Self {
            bank: pin / BANK_WIDTH,
            bit: pin % BANK_WIDTH,
        }
    }

    const fn is_valid(self) -> bool {
        (self.bank as usize) < MAX_BANKS && self.bit < BANK_WIDTH
    }
}

/// Output line of every LED, indexed by logical LED number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinMap<const N: usize> {
    pins: [LedPin; N],
}

impl<const N: usize> PinMap<N> {
    pub const fn new(pins: [LedPin; N]) -> Self {
        Self { pins }
    }

    /// LEDs on consecutive board pins starting at `first_pin`
    #[allow(clippy::cast_possible_truncation)]
    pub const fn consecutive(first_pin: u8) -> Self {
        let mut pins = [LedPin { bank: 0, bit: 0 }; N];
        let mut led = 0;
        while led < N {
            pins[led] = LedPin::from_pin_number(first_pin.wrapping_add(led as u8));
            led += 1;
        }
        Self { pins }
    }

    pub const fn pin(&self, led: usize) -> LedPin {
        self.pins[led]
    }

    /// Boot-time check that every LED lands inside the output banks
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.pins.iter().position(|pin| !pin.is_valid()) {
            Some(led) => Err(ConfigError::PinOutOfRange(led)),
            None => Ok(()),
        }
    }
}

/// Levels of all LED lines for one tick, grouped by bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BankFrame {
    masks: [u8; MAX_BANKS],
    levels: [u8; MAX_BANKS],
}

impl BankFrame {
    pub const fn new() -> Self {
        Self {
            masks: [0; MAX_BANKS],
            levels: [0; MAX_BANKS],
        }
    }

    /// Record the level of one line
    pub fn set(&mut self, pin: LedPin, level: Level) -> Result<(), KernelError> {
        if !pin.is_valid() {
            return Err(KernelError::Isr);
        }
        let bank = pin.bank as usize;
        let bit = 1 << pin.bit;
        self.masks[bank] |= bit;
        match level {
            Level::High => self.levels[bank] |= bit,
            Level::Low => self.levels[bank] &= !bit,
        }
        Ok(())
    }

    /// Level recorded for `pin`, if it was set in this frame
    pub fn level(&self, pin: LedPin) -> Option<Level> {
        if !pin.is_valid() {
            return None;
        }
        let bank = pin.bank as usize;
        let bit = 1 << pin.bit;
        if self.masks[bank] & bit == 0 {
            return None;
        }
        Some(if self.levels[bank] & bit == 0 {
            Level::Low
        } else {
            Level::High
        })
    }

    /// One write per bank that carries at least one LED
    pub fn flush<O: OutputBanks>(&self, output: &mut O) {
        for (bank, (&mask, &levels)) in self.masks.iter().zip(self.levels.iter()).enumerate() {
            if mask != 0 {
                output.write_bank(bank, mask, levels);
            }
        }
    }
}

/// Phase counter and error-blink counter of the PWM output.
#[derive(Debug, Clone, Default)]
pub struct PwmEngine {
    phase: u8,
    blink: i32,
}

impl PwmEngine {
    pub const fn new() -> Self {
        Self { phase: 0, blink: 0 }
    }

    pub const fn phase(&self) -> u8 {
        self.phase
    }

    /// Levels of every LED for the current phase
    pub fn render<const N: usize>(
        &self,
        pins: &PinMap<N>,
        duties: &[u8; N],
    ) -> Result<BankFrame, KernelError> {
        let mut frame = BankFrame::new();
        for (pin, &duty) in pins.pins.iter().zip(duties.iter()) {
            frame.set(*pin, Level::at_phase(self.phase, duty))?;
        }
        Ok(frame)
    }

    /// Move to the next phase of the cycle
    pub fn advance(&mut self) {
        self.phase = if self.phase + 1 >= PWM_STEPS {
            0
        } else {
            self.phase + 1
        };
    }

    /// Error pattern: the LED at the error code stays lit, all others dark,
    /// and both indicators blink with a half period of `blink_ticks`.
    pub fn render_error<const N: usize>(
        &mut self,
        pins: &PinMap<N>,
        error: KernelError,
        indicators: [usize; 2],
        blink_ticks: u32,
    ) -> BankFrame {
        let mut frame = BankFrame::new();
        let indicator_level = if self.blink > 0 {
            Level::Low
        } else {
            Level::High
        };
        for (led, pin) in pins.pins.iter().enumerate() {
            let level = if indicators.contains(&led) {
                indicator_level
            } else if led == usize::from(error.code()) {
                Level::Low
            } else {
                Level::High
            };
            // Lines outside the banks are skipped, the error is already latched
            let _ = frame.set(*pin, level);
        }

        let half_period = i32::try_from(blink_ticks.max(1)).unwrap_or(i32::MAX);
        self.blink += 1;
        if self.blink >= half_period {
            self.blink = -half_period;
        }
        frame
    }
}
