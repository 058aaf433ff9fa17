//! Process-wide control state shared by the tick handler and the
//! foreground animation loop.
//!
//! The state is created once at boot (usually as a `static`) and then only
//! mutated by the [`Scheduler`](crate::Scheduler) and by foreground code
//! under the fader discipline below. There are no locks; every field is an
//! atomic and ordering is enforced with fences.
//!
//! # Fader discipline
//!
//! Foreground code reconfigures a fader only while it is inactive:
//! deactivate, fence, write the parameters, fence, reactivate.
//! [`ControlState::configure_fader`] and [`ControlState::start_fader`]
//! perform exactly that sequence.

use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU16, AtomicU32, Ordering, fence};

use embassy_time::Duration;

#[cfg(feature = "esp32-log")]
use esp_println::println;

use crate::brightness::{Brightness, BrightnessScale};
use crate::buttons::{Button, MAX_DEMO_LEVEL};
use crate::delay::{AbortFlag, DelayOutcome, Monotonic};
use crate::error::{ConfigError, KernelError};
use crate::events::{EventChannel, KernelEvent};
use crate::fader::{Effect, Fader, FaderConfig, FaderState, SETUP_FADE_SPEED_MAJOR};
use crate::scheduler::ReentrancyMonitor;
use crate::settings::Settings;

const NO_ERROR: u8 = 0;

/// Everything the tick handler and the foreground share.
pub struct ControlState<const N: usize> {
    brightness: [AtomicU16; N],
    duty: [AtomicU8; N],
    faders: [Fader; N],
    scale: AtomicU8,
    /// Bumped by every scale change
    scale_requested: AtomicU32,
    /// Last request a full fader round has applied
    scale_applied: AtomicU32,
    abort: AbortFlag,
    held: [AtomicBool; 2],
    demo_level: AtomicU8,
    error: AtomicU8,
    fader_overruns: AtomicU32,
    monitor: ReentrancyMonitor,
    events: EventChannel,
}

impl<const N: usize> Default for ControlState<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ControlState<N> {
    pub const fn new() -> Self {
        Self {
            brightness: [const { AtomicU16::new(0) }; N],
            duty: [const { AtomicU8::new(0) }; N],
            faders: [const { Fader::new() }; N],
            scale: AtomicU8::new(0),
            scale_requested: AtomicU32::new(0),
            scale_applied: AtomicU32::new(0),
            abort: AbortFlag::new(),
            held: [const { AtomicBool::new(false) }; 2],
            demo_level: AtomicU8::new(0),
            error: AtomicU8::new(NO_ERROR),
            fader_overruns: AtomicU32::new(0),
            monitor: ReentrancyMonitor::new(),
            events: EventChannel::new(),
        }
    }

    pub const fn led_count(&self) -> usize {
        N
    }

    // ------------------------------------------------------------------
    // Brightness

    pub fn brightness(&self, led: usize) -> Option<Brightness> {
        self.brightness
            .get(led)
            .map(|value| Brightness::from_raw(value.load(Ordering::Relaxed)))
    }

    /// Duty currently driven for `led`, after the brightness scale
    pub fn duty(&self, led: usize) -> Option<u8> {
        self.duty.get(led).map(|duty| duty.load(Ordering::Relaxed))
    }

    /// Set the full 16-bit brightness of an LED
    pub fn set_brightness(&self, led: usize, brightness: Brightness) -> Result<(), ConfigError> {
        let led = self.checked_led(led)?;
        self.write_brightness(led, brightness);
        Ok(())
    }

    /// Set only the duty of an LED, keeping its fractional part
    pub fn set_brightness_major(&self, led: usize, major: u8) -> Result<(), ConfigError> {
        let led = self.checked_led(led)?;
        let current = Brightness::from_raw(self.brightness[led].load(Ordering::Relaxed));
        self.write_brightness(led, Brightness::new(major, current.minor()));
        Ok(())
    }

    pub fn brightness_scale(&self) -> BrightnessScale {
        BrightnessScale::new(self.scale.load(Ordering::Relaxed))
    }

    /// Change the global scale; out-of-range values are clamped.
    ///
    /// Every LED picks the new scale up in the next full fader round.
    pub fn set_brightness_scale(&self, scale: u8) {
        self.scale
            .store(BrightnessScale::new(scale).value(), Ordering::Relaxed);
        fence(Ordering::SeqCst);
        let request = self.scale_requested.load(Ordering::Acquire);
        self.scale_requested
            .store(request.wrapping_add(1), Ordering::Release);
    }

    /// `true` while a scale change is still being applied to all LEDs
    pub fn scale_change_pending(&self) -> bool {
        self.scale_requested.load(Ordering::Acquire) != self.scale_applied.load(Ordering::Acquire)
    }

    fn write_brightness(&self, led: usize, brightness: Brightness) {
        self.brightness[led].store(brightness.raw(), Ordering::Relaxed);
        self.duty[led].store(brightness.scaled(self.brightness_scale()), Ordering::Relaxed);
    }

    // ------------------------------------------------------------------
    // Faders

    pub fn fader(&self, led: usize) -> Option<FaderState> {
        self.faders.get(led).map(Fader::snapshot)
    }

    /// Deactivate a fader and replace its parameters; it stays inactive
    pub fn configure_fader(&self, led: usize, config: FaderConfig) -> Result<(), ConfigError> {
        let led = self.checked_led(led)?;
        if let Err(err) = config.validate() {
            return Err(self.reject(err));
        }
        let fader = &self.faders[led];
        fader.set_active(false);
        fence(Ordering::SeqCst);
        fader.write_config(&config);
        fence(Ordering::SeqCst);
        Ok(())
    }

    /// Configure a fader and hand it to the scheduler
    pub fn start_fader(&self, led: usize, config: FaderConfig) -> Result<(), ConfigError> {
        self.configure_fader(led, config)?;
        self.faders[led].set_active(true);
        Ok(())
    }

    pub fn activate_fader(&self, led: usize) -> Result<(), ConfigError> {
        let led = self.checked_led(led)?;
        fence(Ordering::SeqCst);
        self.faders[led].set_active(true);
        Ok(())
    }

    pub fn deactivate_fader(&self, led: usize) -> Result<(), ConfigError> {
        let led = self.checked_led(led)?;
        self.faders[led].set_active(false);
        fence(Ordering::SeqCst);
        Ok(())
    }

    /// Bring an LED to `config.lower` before an animation starts.
    ///
    /// An LED already at the bound is left alone with its fader stopped,
    /// a brighter LED fades down and holds, a dimmer one fades up with
    /// [`Effect::SetupLower`]. Returns whether a fade was started.
    pub fn setup_fade_to_lower(&self, led: usize, config: FaderConfig) -> Result<bool, ConfigError> {
        let led = self.checked_led(led)?;
        let current = Brightness::from_raw(self.brightness[led].load(Ordering::Relaxed));

        if current.major() == config.lower {
            self.configure_fader(led, config)?;
            self.write_brightness(led, current.with_major(config.lower));
            return Ok(false);
        }

        let setup = if config.lower < current.major() {
            let speed = if config.delta == 0 {
                FaderConfig::major_step(SETUP_FADE_SPEED_MAJOR.cast_signed())
            } else {
                config.delta.saturating_abs()
            };
            FaderConfig {
                delta: -speed,
                reload: Effect::None,
                ..config
            }
        } else {
            FaderConfig {
                delta: FaderConfig::major_step(SETUP_FADE_SPEED_MAJOR.cast_signed()),
                reload: Effect::SetupLower,
                ..config
            }
        };
        self.start_fader(led, setup)?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Abortable delay

    /// Sleep for `duration` unless aborted; returns `true` when aborted
    pub fn heart_delay<C: Monotonic>(&self, clock: &C, duration: Duration, idle: impl FnMut()) -> bool {
        self.abort.delay(clock, duration, idle) == DelayOutcome::Aborted
    }

    pub fn enable_heart_delay(&self) {
        self.abort.enable();
    }

    pub fn disable_heart_delay(&self) {
        self.abort.disable();
    }

    pub fn heart_delay_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    pub const fn abort_flag(&self) -> &AbortFlag {
        &self.abort
    }

    // ------------------------------------------------------------------
    // Buttons and demo mode

    pub fn held(&self, button: Button) -> bool {
        self.held[button as usize].load(Ordering::Acquire)
    }

    pub fn demo_level(&self) -> u8 {
        self.demo_level.load(Ordering::Relaxed)
    }

    /// Set the demo level (0 = off), clamped to the highest level
    pub fn set_demo_level(&self, level: u8) {
        self.demo_level
            .store(level.min(MAX_DEMO_LEVEL), Ordering::Relaxed);
        fence(Ordering::SeqCst);
    }

    // ------------------------------------------------------------------
    // Settings

    /// Apply persisted settings at boot
    pub fn apply_settings(&self, settings: &Settings) {
        self.set_brightness_scale(settings.brightness_scale);
        self.set_demo_level(settings.demo_level);
    }

    /// Capture the settings to persist
    pub fn settings(&self, animation_id: u8) -> Settings {
        Settings {
            animation_id,
            demo_level: self.demo_level(),
            brightness_scale: self.brightness_scale().value(),
        }
    }

    // ------------------------------------------------------------------
    // Errors and diagnostics

    /// The latched fatal error, if any
    pub fn error(&self) -> Option<KernelError> {
        KernelError::from_code(self.error.load(Ordering::Acquire))
    }

    /// Latch a fatal error. The first error wins; returns whether this
    /// call latched it.
    pub fn latch_error(&self, error: KernelError) -> bool {
        if self.error.load(Ordering::Acquire) != NO_ERROR {
            return false;
        }
        self.error.store(error.code(), Ordering::Release);
        self.publish(KernelEvent::ErrorLatched(error));
        true
    }

    /// Number of fader advances skipped because the handler was re-entered
    pub fn fader_overruns(&self) -> u32 {
        self.fader_overruns.load(Ordering::Relaxed)
    }

    pub const fn events(&self) -> &EventChannel {
        &self.events
    }

    pub const fn monitor(&self) -> &ReentrancyMonitor {
        &self.monitor
    }

    fn checked_led(&self, led: usize) -> Result<usize, ConfigError> {
        if led < N {
            Ok(led)
        } else {
            Err(self.reject(ConfigError::LedOutOfRange(led)))
        }
    }

    fn reject(&self, err: ConfigError) -> ConfigError {
        #[cfg(feature = "esp32-log")]
        println!("[ControlState] rejected configuration: {}", err);
        self.latch_error(KernelError::Generic);
        err
    }

    // ------------------------------------------------------------------
    // Tick handler side

    pub(crate) fn duties(&self) -> [u8; N] {
        core::array::from_fn(|led| self.duty[led].load(Ordering::Relaxed))
    }

    /// Advance one fader; inactive faders only pick up a pending scale change
    pub(crate) fn advance_fader(&self, led: usize) {
        let Some(fader) = self.faders.get(led) else {
            self.latch_error(KernelError::Isr);
            return;
        };
        let before = fader.snapshot();
        if before.active {
            let current = Brightness::from_raw(self.brightness[led].load(Ordering::Relaxed));
            let mut after = before;
            let next = after.advance(current);
            self.write_brightness(led, next);
            fader.commit(&before, &after);
        } else if self.scale_change_pending() {
            let current = Brightness::from_raw(self.brightness[led].load(Ordering::Relaxed));
            self.duty[led].store(current.scaled(self.brightness_scale()), Ordering::Relaxed);
        }
    }

    /// Scale request a fader round starts applying
    pub(crate) fn scale_request(&self) -> u32 {
        self.scale_requested.load(Ordering::Acquire)
    }

    /// A round covering every LED applied `request`; later requests stay pending
    pub(crate) fn finish_scale_change(&self, request: u32) {
        self.scale_applied.store(request, Ordering::Release);
    }

    pub(crate) fn set_held(&self, button: Button, held: bool) {
        self.held[button as usize].store(held, Ordering::Release);
    }

    pub(crate) fn record_fader_overrun(&self) {
        let count = self.fader_overruns.load(Ordering::Relaxed);
        self.fader_overruns
            .store(count.saturating_add(1), Ordering::Relaxed);
        self.publish(KernelEvent::FaderOverrun);
    }

    pub(crate) fn publish(&self, event: KernelEvent) {
        let _ = self.events.publish(event);
    }
}
