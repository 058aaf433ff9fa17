//! Per-LED fade state machine
//!
//! A fader moves one LED's fixed-point brightness by `delta` on every
//! advance and applies its [`Effect`] when the next step would leave
//! `[lower, upper]`. The scheduler advances one fader per tick.
//!
//! Foreground code only touches a fader while it is inactive; the
//! scheduler only writes `delta` and clears `active`. See
//! [`ControlState::configure_fader`](crate::ControlState::configure_fader).

use core::sync::atomic::{AtomicBool, AtomicI16, AtomicU8, Ordering};

use crate::brightness::Brightness;
use crate::error::ConfigError;

/// Fade speed used when fading up to a new lower bound (major steps).
pub const SETUP_FADE_SPEED_MAJOR: u8 = 5;

const EFFECT_NONE: u8 = 0;
const EFFECT_UPPER_INVERT: u8 = 1;
const EFFECT_LOWER_INVERT: u8 = 2;
const EFFECT_JUMP: u8 = 3;
const EFFECT_INVERT: u8 = 4;
const EFFECT_SETUP_LOWER: u8 = 5;

/// What a fader does when it reaches one of its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Effect {
    /// Hold at the bound reached and deactivate
    #[default]
    None = EFFECT_NONE,
    /// Reverse at the upper bound, stop at the lower bound (single blink)
    UpperInvert = EFFECT_UPPER_INVERT,
    /// Reverse at the lower bound, stop at the upper bound (single blink off)
    LowerInvert = EFFECT_LOWER_INVERT,
    /// Snap to the opposite bound and keep going (sawtooth)
    Jump = EFFECT_JUMP,
    /// Reverse at both bounds (oscillate)
    Invert = EFFECT_INVERT,
    /// Fade up from below the lower bound, then settle on it
    SetupLower = EFFECT_SETUP_LOWER,
}

impl Effect {
    /// Decode a stored effect; unknown values fall back to [`Effect::None`]
    pub const fn from_raw(value: u8) -> Self {
        match value {
            EFFECT_UPPER_INVERT => Self::UpperInvert,
            EFFECT_LOWER_INVERT => Self::LowerInvert,
            EFFECT_JUMP => Self::Jump,
            EFFECT_INVERT => Self::Invert,
            EFFECT_SETUP_LOWER => Self::SetupLower,
            _ => Self::None,
        }
    }
}

/// Fade parameters supplied by animation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaderConfig {
    pub lower: u8,
    pub upper: u8,
    /// Signed step per advance, in the same 8.8 fixed point as [`Brightness`]
    pub delta: i16,
    pub reload: Effect,
}

impl Default for FaderConfig {
    fn default() -> Self {
        Self::new(0, u8::MAX, 0, Effect::None)
    }
}

impl FaderConfig {
    pub const fn new(lower: u8, upper: u8, delta: i16, reload: Effect) -> Self {
        Self {
            lower,
            upper,
            delta,
            reload,
        }
    }

    /// Step of `major` whole duty units per advance
    #[allow(clippy::cast_lossless)]
    pub const fn major_step(major: i8) -> i16 {
        (major as i16) << 8
    }

    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.lower > self.upper {
            return Err(ConfigError::InvalidBounds {
                lower: self.lower,
                upper: self.upper,
            });
        }
        Ok(())
    }
}

/// Plain copy of a fader, as the scheduler sees it during one advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaderState {
    pub config: FaderConfig,
    pub active: bool,
}

impl FaderState {
    pub const fn new(config: FaderConfig, active: bool) -> Self {
        Self { config, active }
    }

    /// Advance one step and return the corrected brightness.
    ///
    /// The returned brightness always has its major value inside
    /// `[lower, upper]` unless the fader was inactive, in which case the
    /// input is returned untouched.
    pub fn advance(&mut self, brightness: Brightness) -> Brightness {
        if !self.active {
            return brightness;
        }

        let FaderConfig {
            lower,
            upper,
            delta,
            reload,
        } = self.config;

        // Widened so that over- and underflow of the 16-bit value are visible
        let new_raw = i32::from(brightness.raw()) + i32::from(delta);
        let new_major = new_raw >> 8;

        if new_major > i32::from(upper) {
            match reload {
                Effect::None | Effect::LowerInvert => self.settle(upper),
                Effect::Jump => Brightness::new(lower, 0),
                Effect::Invert | Effect::UpperInvert => {
                    let reflected = (i32::from(upper) << 8) - i32::from(delta);
                    self.config.delta = delta.saturating_neg();
                    clamp_into(reflected, lower, upper)
                }
                // Overshot the whole band; the target is still the lower bound
                Effect::SetupLower => self.settle(lower),
            }
        } else if new_major < i32::from(lower) {
            match reload {
                Effect::None | Effect::UpperInvert => self.settle(lower),
                Effect::Jump => Brightness::new(upper, 0),
                Effect::Invert | Effect::LowerInvert => {
                    self.config.delta = delta.saturating_neg();
                    let reflected = (i32::from(lower) << 8) + i32::from(self.config.delta);
                    clamp_into(reflected, lower, upper)
                }
                Effect::SetupLower => {
                    if delta < 0 {
                        // Misconfigured direction, fade up from here instead
                        self.config.delta = delta.saturating_neg();
                        brightness
                    } else if delta == 0 {
                        self.settle(lower)
                    } else {
                        clamp_into(new_raw, 0, upper)
                    }
                }
            }
        } else if reload == Effect::SetupLower {
            self.settle(lower)
        } else {
            clamp_into(new_raw, lower, upper)
        }
    }

    fn settle(&mut self, major: u8) -> Brightness {
        self.active = false;
        Brightness::new(major, 0)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_into(raw: i32, lower: u8, upper: u8) -> Brightness {
    let min = i32::from(lower) << 8;
    let max = (i32::from(upper) << 8) | 0xFF;
    Brightness::from_raw(raw.clamp(min, max) as u16)
}

/// Shared per-LED fader cell.
pub struct Fader {
    delta: AtomicI16,
    active: AtomicBool,
    reload: AtomicU8,
    upper: AtomicU8,
    lower: AtomicU8,
}

impl Default for Fader {
    fn default() -> Self {
        Self::new()
    }
}

impl Fader {
    pub const fn new() -> Self {
        Self {
            delta: AtomicI16::new(0),
            active: AtomicBool::new(false),
            reload: AtomicU8::new(EFFECT_NONE),
            upper: AtomicU8::new(u8::MAX),
            lower: AtomicU8::new(0),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn config(&self) -> FaderConfig {
        FaderConfig {
            lower: self.lower.load(Ordering::Relaxed),
            upper: self.upper.load(Ordering::Relaxed),
            delta: self.delta.load(Ordering::Relaxed),
            reload: Effect::from_raw(self.reload.load(Ordering::Relaxed)),
        }
    }

    pub fn snapshot(&self) -> FaderState {
        FaderState::new(self.config(), self.is_active())
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Overwrite every parameter. Caller guarantees the fader is inactive.
    pub(crate) fn write_config(&self, config: &FaderConfig) {
        self.lower.store(config.lower, Ordering::Relaxed);
        self.upper.store(config.upper, Ordering::Relaxed);
        self.delta.store(config.delta, Ordering::Relaxed);
        self.reload.store(config.reload as u8, Ordering::Relaxed);
    }

    pub(crate) fn set_delta(&self, delta: i16) {
        self.delta.store(delta, Ordering::Relaxed);
    }

    /// Store what an advance changed; only `delta` and deactivation
    pub(crate) fn commit(&self, before: &FaderState, after: &FaderState) {
        if before.config.delta != after.config.delta {
            self.set_delta(after.config.delta);
        }
        if before.active && !after.active {
            self.set_active(false);
        }
    }
}
