//! Periodic tick handler.
//!
//! [`Scheduler::tick`] is called from the board's timer interrupt once per
//! PWM step. Every tick drives the PWM outputs; once per fader-update
//! interval the buttons are sampled and, starting on the following tick,
//! one fader per tick is advanced in round-robin so that no single tick
//! carries more than one LED's fade arithmetic.
//!
//! # Usage
//!
//! ```ignore
//! static STATE: ControlState<10> = ControlState::new();
//!
//! let config = SchedulerConfig::new(TimingConfig::default().derive()?, PinMap::consecutive(2), [0, 5]);
//! let mut scheduler = Scheduler::new(&STATE, ports, buttons, config)?;
//!
//! // In the timer interrupt
//! scheduler.tick();
//! ```

use core::sync::atomic::{AtomicBool, Ordering};

use crate::buttons::{ButtonController, ButtonThresholds};
use crate::control::ControlState;
use crate::delay::Monotonic;
use crate::error::{ConfigError, KernelError};
use crate::profiling::TickProfiler;
use crate::pwm::{PinMap, PwmEngine};
use crate::timing::KernelTiming;
use crate::{ButtonInput, OutputBanks};

/// Whether the tick handler checks for being re-entered.
///
/// Only needed when the timer interrupt may preempt itself (nested
/// interrupts enabled on the board).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReentrancyProtection {
    #[default]
    Enabled,
    Disabled,
}

/// Busy flags of the tick handler's two stages.
#[derive(Debug, Default)]
pub struct ReentrancyMonitor {
    pwm_busy: AtomicBool,
    fader_busy: AtomicBool,
}

impl ReentrancyMonitor {
    pub const fn new() -> Self {
        Self {
            pwm_busy: AtomicBool::new(false),
            fader_busy: AtomicBool::new(false),
        }
    }

    pub fn is_pwm_busy(&self) -> bool {
        self.pwm_busy.load(Ordering::Acquire)
    }

    pub fn is_fader_busy(&self) -> bool {
        self.fader_busy.load(Ordering::Acquire)
    }

    /// Mark the PWM stage busy until the returned pass is dropped
    pub fn enter_pwm(&self, protection: ReentrancyProtection) -> Result<PwmPass<'_>, KernelError> {
        if protection == ReentrancyProtection::Disabled {
            return Ok(PwmPass { monitor: None });
        }
        if self.is_pwm_busy() {
            return Err(KernelError::NestedPwm);
        }
        self.pwm_busy.store(true, Ordering::Release);
        Ok(PwmPass {
            monitor: Some(self),
        })
    }
}

/// The PWM stage of one tick is running.
#[must_use]
pub struct PwmPass<'a> {
    monitor: Option<&'a ReentrancyMonitor>,
}

impl<'a> PwmPass<'a> {
    /// Hand over to the fader stage.
    ///
    /// The fader flag is raised before the PWM flag is cleared, so a nested
    /// tick always sees at least one of them.
    pub fn into_fader(self) -> Result<FaderPass<'a>, KernelError> {
        let Some(monitor) = self.monitor else {
            return Ok(FaderPass { monitor: None });
        };
        if monitor.is_fader_busy() {
            return Err(KernelError::NestedFader);
        }
        monitor.fader_busy.store(true, Ordering::Release);
        Ok(FaderPass {
            monitor: Some(monitor),
        })
    }
}

impl Drop for PwmPass<'_> {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor {
            monitor.pwm_busy.store(false, Ordering::Release);
        }
    }
}

/// The fader stage of one tick is running.
#[must_use]
pub struct FaderPass<'a> {
    monitor: Option<&'a ReentrancyMonitor>,
}

impl Drop for FaderPass<'_> {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor {
            monitor.fader_busy.store(false, Ordering::Release);
        }
    }
}

/// Static configuration of the tick handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig<const N: usize> {
    pub timing: KernelTiming,
    pub pins: PinMap<N>,
    /// LEDs that blink while an error is shown
    pub indicators: [usize; 2],
    pub reentrancy: ReentrancyProtection,
}

impl<const N: usize> SchedulerConfig<N> {
    pub const fn new(timing: KernelTiming, pins: PinMap<N>, indicators: [usize; 2]) -> Self {
        Self {
            timing,
            pins,
            indicators,
            reentrancy: ReentrancyProtection::Enabled,
        }
    }

    #[must_use]
    pub const fn with_reentrancy(mut self, reentrancy: ReentrancyProtection) -> Self {
        self.reentrancy = reentrancy;
        self
    }
}

/// Tick handler driving PWM, faders, buttons and demo mode.
pub struct Scheduler<'a, O: OutputBanks, B: ButtonInput, const N: usize> {
    state: &'a ControlState<N>,
    output: O,
    input: B,
    config: SchedulerConfig<N>,

    pwm: PwmEngine,
    buttons: ButtonController,
    /// Ticks since the last fader-update interval started
    interval: u32,
    /// Next LED to advance in the current round
    cursor: Option<usize>,
    /// Scale request the current round applies, if one was pending at its start
    rescaling: Option<u32>,
}

impl<'a, O: OutputBanks, B: ButtonInput, const N: usize> Scheduler<'a, O, B, N> {
    /// Create a scheduler.
    ///
    /// The fader interval must be longer than one round over all LEDs, so
    /// that each round finishes before the next button sample, and every LED
    /// must map to a line inside the output banks.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(
        state: &'a ControlState<N>,
        output: O,
        input: B,
        config: SchedulerConfig<N>,
    ) -> Result<Self, ConfigError> {
        let required = N as u32 + 1;
        if config.timing.fader_update_ticks < required {
            return Err(ConfigError::TooFewTicks {
                ticks: config.timing.fader_update_ticks,
                required,
            });
        }
        if let Some(&led) = config.indicators.iter().find(|&&led| led >= N) {
            return Err(ConfigError::LedOutOfRange(led));
        }
        config.pins.validate()?;

        Ok(Self {
            state,
            output,
            input,
            buttons: ButtonController::new(ButtonThresholds::from(&config.timing)),
            config,
            pwm: PwmEngine::new(),
            interval: 0,
            cursor: None,
            rescaling: None,
        })
    }

    /// Run one timer tick
    pub fn tick(&mut self) {
        let pass = self.state.monitor().enter_pwm(self.config.reentrancy);
        if let Err(err) = &pass {
            self.state.latch_error(*err);
        }
        if let Some(error) = self.state.error() {
            self.show_error(error);
            return;
        }
        let Ok(pass) = pass else {
            return;
        };

        if let Err(err) = self.drive_pwm() {
            self.state.latch_error(err);
            return;
        }

        self.interval += 1;
        if self.interval + 1 == self.config.timing.fader_update_ticks {
            let sample = self.input.sample();
            self.buttons.update(sample, self.state);
        }
        if self.interval >= self.config.timing.fader_update_ticks {
            self.interval = 0;
            self.cursor = N.checked_sub(1);
            let request = self.state.scale_request();
            self.rescaling = self.state.scale_change_pending().then_some(request);
        }

        let Some(led) = self.cursor else {
            return;
        };
        let Ok(fader_pass) = pass.into_fader() else {
            self.state.record_fader_overrun();
            return;
        };

        self.state.advance_fader(led);
        self.cursor = led.checked_sub(1);
        if self.cursor.is_none() {
            if let Some(request) = self.rescaling.take() {
                self.state.finish_scale_change(request);
            }
        }
        drop(fader_pass);
    }

    /// Run one tick and record its timing
    pub fn tick_profiled<C: Monotonic>(&mut self, profiler: &mut TickProfiler, clock: &C) {
        profiler.start(clock.now());
        self.tick();
        profiler.stop(clock.now());
    }

    fn drive_pwm(&mut self) -> Result<(), KernelError> {
        let duties = self.state.duties();
        let frame = self.pwm.render(&self.config.pins, &duties)?;
        frame.flush(&mut self.output);
        self.pwm.advance();
        Ok(())
    }

    fn show_error(&mut self, error: KernelError) {
        let frame = self.pwm.render_error(
            &self.config.pins,
            error,
            self.config.indicators,
            self.config.timing.error_blink_ticks,
        );
        frame.flush(&mut self.output);
    }

    pub const fn state(&self) -> &'a ControlState<N> {
        self.state
    }

    pub const fn buttons(&self) -> &ButtonController {
        &self.buttons
    }

    pub const fn pwm_phase(&self) -> u8 {
        self.pwm.phase()
    }

    /// Whether a fader round is in progress
    pub const fn in_fader_round(&self) -> bool {
        self.cursor.is_some()
    }

    pub const fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    pub fn input_mut(&mut self) -> &mut B {
        &mut self.input
    }
}
