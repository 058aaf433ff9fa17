//! Button debouncing and demo-mode timing
//!
//! Sampled once per fader-update interval by the scheduler, one tick
//! before that interval's fader round-robin starts.
//!
//! The brightness button cycles the brightness scale on a short press and
//! aborts the running animation when held. The reset button aborts the
//! running animation and restarts the demo countdown. Demo mode aborts the
//! running animation every `level` demo steps so the dispatch loop moves
//! on to the next one.

use crate::control::ControlState;
use crate::events::KernelEvent;
use crate::timing::KernelTiming;

/// Highest demo level; level 0 disables demo mode.
pub const MAX_DEMO_LEVEL: u8 = 5;

/// The two physical buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Button {
    /// Short press cycles brightness, hold aborts the animation
    Brightness = 0,
    /// Aborts the animation and restarts demo timing
    Reset = 1,
}

/// Pressed state of both buttons at one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonSample {
    pub brightness: bool,
    pub reset: bool,
}

impl ButtonSample {
    pub const RELEASED: Self = Self {
        brightness: false,
        reset: false,
    };

    pub const fn brightness() -> Self {
        Self {
            brightness: true,
            reset: false,
        }
    }

    pub const fn reset() -> Self {
        Self {
            brightness: false,
            reset: true,
        }
    }
}

/// Thresholds in samples, one sample per fader-update interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonThresholds {
    pub hold: u16,
    pub reset: u16,
    pub demo_step: u32,
}

impl From<&KernelTiming> for ButtonThresholds {
    fn from(timing: &KernelTiming) -> Self {
        Self {
            hold: timing.hold_samples.max(1),
            reset: timing.reset_samples.max(1),
            demo_step: timing.demo_step_samples.max(1),
        }
    }
}

/// State of the brightness button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrightnessButton {
    #[default]
    Idle,
    /// Pressed for this many samples, below the hold threshold
    Pressed(u16),
    /// Hold threshold reached; waiting for release
    Held,
}

/// Debounce counter of the reset button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ResetButton {
    #[default]
    Idle,
    Pressed(u16),
    /// Fired for this press; frozen until release
    Latched,
}

/// Demo countdown: samples within the current step, and completed steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DemoCountdown {
    pub samples: u32,
    pub steps: u8,
}

/// Per-sample button and demo logic.
#[derive(Debug, Clone)]
pub struct ButtonController {
    thresholds: ButtonThresholds,
    brightness: BrightnessButton,
    reset: ResetButton,
    demo: DemoCountdown,
}

impl ButtonController {
    pub const fn new(thresholds: ButtonThresholds) -> Self {
        Self {
            thresholds,
            brightness: BrightnessButton::Idle,
            reset: ResetButton::Idle,
            demo: DemoCountdown {
                samples: 0,
                steps: 0,
            },
        }
    }

    pub const fn brightness_button(&self) -> BrightnessButton {
        self.brightness
    }

    pub const fn demo_countdown(&self) -> DemoCountdown {
        self.demo
    }

    /// Process one sample of both buttons
    pub fn update<const N: usize>(&mut self, sample: ButtonSample, state: &ControlState<N>) {
        self.update_brightness(sample.brightness, state);
        self.update_reset(sample.reset, state);
        self.update_demo(state);
    }

    fn update_brightness<const N: usize>(&mut self, pressed: bool, state: &ControlState<N>) {
        // A short press is still being applied across the LEDs
        if state.scale_change_pending() {
            return;
        }

        self.brightness = match (self.brightness, pressed) {
            (BrightnessButton::Idle, false) => BrightnessButton::Idle,
            (BrightnessButton::Idle, true) => self.press_brightness(1, state),
            (BrightnessButton::Pressed(count), true) => {
                self.press_brightness(count.saturating_add(1), state)
            }
            (BrightnessButton::Pressed(_), false) => {
                let scale = state.brightness_scale().next();
                state.set_brightness_scale(scale.value());
                state.publish(KernelEvent::BrightnessScaleChanged(scale.value()));
                BrightnessButton::Idle
            }
            (BrightnessButton::Held, true) => BrightnessButton::Held,
            (BrightnessButton::Held, false) => {
                state.set_held(Button::Brightness, false);
                BrightnessButton::Idle
            }
        };
    }

    fn press_brightness<const N: usize>(&self, count: u16, state: &ControlState<N>) -> BrightnessButton {
        if count < self.thresholds.hold {
            return BrightnessButton::Pressed(count);
        }
        state.set_held(Button::Brightness, true);
        state.disable_heart_delay();
        state.publish(KernelEvent::HoldStarted);
        BrightnessButton::Held
    }

    fn update_reset<const N: usize>(&mut self, pressed: bool, state: &ControlState<N>) {
        self.reset = match (self.reset, pressed) {
            (_, false) => {
                state.set_held(Button::Reset, false);
                ResetButton::Idle
            }
            (ResetButton::Latched, true) => ResetButton::Latched,
            (ResetButton::Idle, true) => self.press_reset(1, state),
            (ResetButton::Pressed(count), true) => self.press_reset(count.saturating_add(1), state),
        };
    }

    fn press_reset<const N: usize>(&mut self, count: u16, state: &ControlState<N>) -> ResetButton {
        if count < self.thresholds.reset {
            return ResetButton::Pressed(count);
        }
        state.set_held(Button::Reset, true);
        state.disable_heart_delay();
        self.demo = DemoCountdown::default();
        state.publish(KernelEvent::ResetPressed);
        ResetButton::Latched
    }

    fn update_demo<const N: usize>(&mut self, state: &ControlState<N>) {
        let level = state.demo_level();
        if level == 0 {
            self.demo = DemoCountdown::default();
            return;
        }

        self.demo.samples += 1;
        if self.demo.samples < self.thresholds.demo_step {
            return;
        }
        self.demo.samples = 0;
        self.demo.steps += 1;
        if self.demo.steps >= level {
            self.demo = DemoCountdown::default();
            state.disable_heart_delay();
            state.publish(KernelEvent::DemoAdvance);
        }
    }
}

impl Default for ButtonController {
    fn default() -> Self {
        Self::new(ButtonThresholds {
            hold: 15,
            reset: 2,
            demo_step: 25,
        })
    }
}

