//! Conversion of real-world rates into tick counts
//!
//! The board runs one tick per PWM step, so every cadence of the kernel
//! (fader updates, button sampling, demo mode, error blinking) is a count
//! of ticks or of fader-update samples. Those counts are derived here from
//! the intended rates.
//!
//! On the reference board fades ran about three times slower and demo
//! durations about six times longer than the derivation predicts. The
//! divisors `fader_rate_correction` and `demo_rate_correction` absorb that
//! and are meant to be calibrated against the actual timer.

use embassy_time::Duration;

#[cfg(feature = "esp32-log")]
use esp_println::println;

use crate::error::ConfigError;
use crate::pwm::PWM_STEPS;

const MICROS_PER_SECOND: u32 = 1_000_000;

/// Lowest fader rate that still fades without visible steps.
pub const MIN_FADER_UPDATE_HZ: u32 = 10;

/// Intended rates of the kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingConfig {
    /// Full PWM cycles per second
    pub pwm_frequency_hz: u32,
    /// Fader advances (and button samples) per second
    pub fader_update_hz: u32,
    /// Empirical divisor applied to the tick count of one fader interval
    pub fader_rate_correction: f32,
    /// Demo duration per level unit
    pub demo_step: Duration,
    /// Empirical divisor applied to the demo threshold
    pub demo_rate_correction: f32,
    /// Press length of the brightness button that counts as a hold
    pub hold: Duration,
    /// Press length of the reset button that counts as a press
    pub reset_debounce: Duration,
    /// Half period of the error indicator blink
    pub error_blink: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            pwm_frequency_hz: 100,
            fader_update_hz: 15,
            fader_rate_correction: 3.0,
            demo_step: Duration::from_secs(10),
            demo_rate_correction: 6.0,
            hold: Duration::from_secs(1),
            reset_debounce: Duration::from_millis(100),
            error_blink: Duration::from_millis(250),
        }
    }
}

/// Tick counts used by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelTiming {
    /// Timer period in microseconds
    pub tick_interval_us: u32,
    /// Ticks between two fader-update intervals
    pub fader_update_ticks: u32,
    /// Samples the brightness button must be held to count as a hold
    pub hold_samples: u16,
    /// Samples the reset button must be pressed to count
    pub reset_samples: u16,
    /// Samples per demo level unit
    pub demo_step_samples: u32,
    /// Ticks per half period of the error blink
    pub error_blink_ticks: u32,
}

impl TimingConfig {
    /// Validate the rates and turn them into tick counts
    #[allow(clippy::cast_precision_loss)]
    pub fn derive(&self) -> Result<KernelTiming, ConfigError> {
        self.validate()?;

        let tick_interval_us = self
            .pwm_frequency_hz
            .checked_mul(u32::from(PWM_STEPS))
            .map_or(0, |ticks_per_second| MICROS_PER_SECOND / ticks_per_second);
        if tick_interval_us == 0 {
            return Err(ConfigError::InvalidTiming("PWM frequency too high"));
        }

        let corrected_tick_us = tick_interval_us as f32 * self.fader_rate_correction;
        let fader_interval_us = (MICROS_PER_SECOND / self.fader_update_hz) as f32;
        let fader_update_ticks = round_count(fader_interval_us / corrected_tick_us);
        if fader_update_ticks < 2 {
            return Err(ConfigError::TooFewTicks {
                ticks: fader_update_ticks,
                required: 2,
            });
        }

        let samples_per_second = self.fader_update_hz as f32;
        let demo_step_samples = round_count(
            self.demo_step.as_millis() as f32 * samples_per_second
                / (1000.0 * self.demo_rate_correction),
        );

        let timing = KernelTiming {
            tick_interval_us,
            fader_update_ticks,
            hold_samples: to_samples(self.hold, samples_per_second),
            reset_samples: to_samples(self.reset_debounce, samples_per_second),
            demo_step_samples,
            error_blink_ticks: round_count(
                self.error_blink.as_micros() as f32 / corrected_tick_us,
            ),
        };

        #[cfg(feature = "esp32-log")]
        println!("[TimingConfig.derive] {:?}", timing);

        Ok(timing)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pwm_frequency_hz == 0 || self.fader_update_hz == 0 {
            return Err(ConfigError::InvalidTiming("frequencies must be non-zero"));
        }
        if self.fader_update_hz > self.pwm_frequency_hz {
            return Err(ConfigError::InvalidTiming(
                "fader rate above PWM frequency",
            ));
        }
        if self.fader_update_hz < MIN_FADER_UPDATE_HZ {
            return Err(ConfigError::InvalidTiming("fader rate below 10 Hz"));
        }
        if self.fader_update_hz.saturating_mul(3) > self.pwm_frequency_hz {
            return Err(ConfigError::InvalidTiming(
                "fader rate must be at least 3 times below the PWM frequency",
            ));
        }
        let corrections = [self.fader_rate_correction, self.demo_rate_correction];
        if corrections.iter().any(|c| !c.is_finite() || *c <= 0.0) {
            return Err(ConfigError::InvalidTiming("corrections must be positive"));
        }
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_count(value: f32) -> u32 {
    (libm::roundf(value) as u32).max(1)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn to_samples(duration: Duration, samples_per_second: f32) -> u16 {
    let samples = round_count(duration.as_millis() as f32 * samples_per_second / 1000.0);
    u16::try_from(samples).unwrap_or(u16::MAX)
}
