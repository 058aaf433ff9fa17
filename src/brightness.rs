//! Fixed-point LED brightness and the global brightness scale.

/// Highest brightness scale; every duty is shifted right by the scale.
pub const MAX_SCALE: u8 = 5;

/// 16-bit fixed-point brightness.
///
/// The high byte ("major") is the PWM duty, the low byte ("minor") is the
/// fractional accumulator used for sub-step fades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Brightness(u16);

impl Brightness {
    pub const OFF: Self = Self(0);
    pub const FULL: Self = Self(0xFF00);

    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[allow(clippy::cast_lossless)]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self(((major as u16) << 8) | minor as u16)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    #[allow(clippy::cast_possible_truncation)]
    pub const fn major(self) -> u8 {
        (self.0 >> 8) as u8
    }

    #[allow(clippy::cast_possible_truncation)]
    pub const fn minor(self) -> u8 {
        self.0 as u8
    }

    /// Replace the duty, clearing the fractional part
    pub const fn with_major(self, major: u8) -> Self {
        Self::new(major, 0)
    }

    /// Duty cycle actually driven on the output line
    pub const fn scaled(self, scale: BrightnessScale) -> u8 {
        self.major() >> scale.0
    }
}

/// Global right-shift applied to every LED duty (0-5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct BrightnessScale(u8);

impl BrightnessScale {
    /// Clamp `value` into the valid scale range
    pub const fn new(value: u8) -> Self {
        if value > MAX_SCALE {
            Self(MAX_SCALE)
        } else {
            Self(value)
        }
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    /// Next scale in the short-press cycle, wrapping 5 back to 0
    pub const fn next(self) -> Self {
        Self((self.0 + 1) % (MAX_SCALE + 1))
    }
}
