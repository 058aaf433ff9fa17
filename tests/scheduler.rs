mod tests {
    use core::cell::Cell;

    use heart_pwm::{
        Brightness, ButtonInput, ButtonSample, ConfigError, ControlState, Effect, FaderConfig,
        Instant, KernelError, KernelEvent, KernelTiming, Monotonic, OutputBanks, PinMap,
        ReentrancyProtection, Scheduler, SchedulerConfig, TickProfiler,
    };

    #[derive(Default)]
    struct Board {
        writes: Vec<(usize, u8, u8)>,
    }

    impl Board {
        fn last_levels(&self) -> u8 {
            self.writes.last().map(|&(_, _, levels)| levels).unwrap()
        }
    }

    impl OutputBanks for Board {
        fn write_bank(&mut self, bank: usize, mask: u8, levels: u8) {
            self.writes.push((bank, mask, levels));
        }
    }

    #[derive(Default)]
    struct Buttons {
        sample: ButtonSample,
        samples: usize,
    }

    impl ButtonInput for Buttons {
        fn sample(&mut self) -> ButtonSample {
            self.samples += 1;
            self.sample
        }
    }

    struct FakeClock {
        micros: Cell<u64>,
    }

    impl Monotonic for FakeClock {
        fn now(&self) -> Instant {
            let now = self.micros.get();
            self.micros.set(now + 7);
            Instant::from_micros(now)
        }
    }

    fn timing(fader_update_ticks: u32) -> KernelTiming {
        KernelTiming {
            tick_interval_us: 39,
            fader_update_ticks,
            hold_samples: 4,
            reset_samples: 2,
            demo_step_samples: 3,
            error_blink_ticks: 2,
        }
    }

    fn scheduler<const N: usize>(
        state: &ControlState<N>,
        fader_update_ticks: u32,
    ) -> Scheduler<'_, Board, Buttons, N> {
        let config = SchedulerConfig::new(
            timing(fader_update_ticks),
            PinMap::consecutive(0),
            [0, N - 1],
        );
        Scheduler::new(state, Board::default(), Buttons::default(), config).unwrap()
    }

    fn drain<const N: usize>(state: &ControlState<N>) -> Vec<KernelEvent> {
        let mut events = Vec::new();
        state.events().drain(|event| events.push(event));
        events
    }

    #[test]
    fn test_rejects_too_few_ticks() {
        let state = ControlState::<2>::new();
        let config = SchedulerConfig::new(timing(2), PinMap::consecutive(0), [0, 1]);
        let result = Scheduler::new(&state, Board::default(), Buttons::default(), config);
        assert!(matches!(
            result,
            Err(ConfigError::TooFewTicks {
                ticks: 2,
                required: 3
            })
        ));
    }

    #[test]
    fn test_rejects_indicator_out_of_range() {
        let state = ControlState::<2>::new();
        let config = SchedulerConfig::new(timing(3), PinMap::consecutive(0), [0, 5]);
        let result = Scheduler::new(&state, Board::default(), Buttons::default(), config);
        assert!(matches!(result, Err(ConfigError::LedOutOfRange(5))));
    }

    #[test]
    fn test_pwm_runs_every_tick() {
        let state = ControlState::<2>::new();
        let mut scheduler = scheduler(&state, 3);

        for _ in 0..10 {
            scheduler.tick();
        }

        assert_eq!(scheduler.output().writes.len(), 10);
        assert_eq!(scheduler.pwm_phase(), 10);
        assert!(state.error().is_none());
    }

    #[test]
    fn test_buttons_sampled_once_per_interval() {
        let state = ControlState::<2>::new();
        let mut scheduler = scheduler(&state, 3);

        scheduler.tick();
        assert_eq!(scheduler.input_mut().samples, 0);
        scheduler.tick();
        assert_eq!(scheduler.input_mut().samples, 1);

        for _ in 0..9 {
            scheduler.tick();
        }
        assert_eq!(scheduler.input_mut().samples, 4);
    }

    #[test]
    fn test_round_robin_advances_one_led_per_tick() {
        let state = ControlState::<2>::new();
        let mut scheduler = scheduler(&state, 3);
        let config = FaderConfig::new(0, 255, FaderConfig::major_step(1), Effect::None);
        state.start_fader(0, config).unwrap();
        state.start_fader(1, config).unwrap();

        scheduler.tick();
        scheduler.tick();
        assert!(!scheduler.in_fader_round());
        assert_eq!(state.brightness(1), Some(Brightness::OFF));

        // Round starts with the highest LED
        scheduler.tick();
        assert!(scheduler.in_fader_round());
        assert_eq!(state.brightness(1), Some(Brightness::new(1, 0)));
        assert_eq!(state.brightness(0), Some(Brightness::OFF));

        scheduler.tick();
        assert!(!scheduler.in_fader_round());
        assert_eq!(state.brightness(0), Some(Brightness::new(1, 0)));
        assert_eq!(state.duty(0), Some(1));

        for _ in 0..3 {
            scheduler.tick();
        }
        assert_eq!(state.brightness(0), Some(Brightness::new(2, 0)));
        assert_eq!(state.brightness(1), Some(Brightness::new(2, 0)));
    }

    #[test]
    fn test_fader_settles_through_scheduler() {
        let state = ControlState::<2>::new();
        let mut scheduler = scheduler(&state, 3);
        state.set_brightness(0, Brightness::new(200, 0)).unwrap();
        state
            .start_fader(0, FaderConfig::new(100, 255, -FaderConfig::major_step(50), Effect::None))
            .unwrap();

        for _ in 0..3 * 4 {
            scheduler.tick();
        }

        assert_eq!(state.brightness(0), Some(Brightness::new(100, 0)));
        assert_eq!(state.fader(0).map(|fader| fader.active), Some(false));
    }

    #[test]
    fn test_scale_change_reaches_inactive_leds() {
        let state = ControlState::<2>::new();
        let mut scheduler = scheduler(&state, 3);
        state.set_brightness(0, Brightness::new(200, 0)).unwrap();
        state.set_brightness(1, Brightness::new(200, 0)).unwrap();

        state.set_brightness_scale(1);
        assert!(state.scale_change_pending());
        assert_eq!(state.duty(0), Some(200));

        scheduler.tick();
        scheduler.tick();
        scheduler.tick();
        assert_eq!(state.duty(1), Some(100));
        assert_eq!(state.duty(0), Some(200));
        assert!(state.scale_change_pending());

        scheduler.tick();
        assert_eq!(state.duty(0), Some(100));
        assert!(!state.scale_change_pending());
        assert_eq!(state.brightness(0), Some(Brightness::new(200, 0)));
    }

    #[test]
    fn test_scale_change_during_round_is_not_lost() {
        let state = ControlState::<2>::new();
        let mut scheduler = scheduler(&state, 3);
        state.set_brightness(0, Brightness::new(200, 0)).unwrap();
        state.set_brightness(1, Brightness::new(200, 0)).unwrap();

        state.set_brightness_scale(1);
        for _ in 0..3 {
            scheduler.tick();
        }
        assert_eq!(state.duty(1), Some(100));

        // LED 1 was already rescaled in this round
        state.set_brightness_scale(2);
        scheduler.tick();
        assert_eq!(state.duty(0), Some(50));
        assert_eq!(state.duty(1), Some(100));
        assert!(state.scale_change_pending());

        for _ in 0..3 {
            scheduler.tick();
        }
        assert_eq!(state.duty(0), Some(50));
        assert_eq!(state.duty(1), Some(50));
        assert!(!state.scale_change_pending());
    }

    #[test]
    fn test_nested_pwm_latches_error() {
        let state = ControlState::<6>::new();
        let mut scheduler = scheduler(&state, 7);

        let guard = state.monitor().enter_pwm(ReentrancyProtection::Enabled).unwrap();
        scheduler.tick();
        drop(guard);

        assert_eq!(state.error(), Some(KernelError::NestedPwm));
        assert_eq!(drain(&state), [KernelEvent::ErrorLatched(KernelError::NestedPwm)]);
        // LED 1 lit, indicators 0 and 5 dark in the first blink phase
        assert_eq!(scheduler.output().last_levels(), 0b0011_1101);

        // The error stays latched and blinks the indicators
        scheduler.tick();
        assert_eq!(state.error(), Some(KernelError::NestedPwm));
        assert_eq!(scheduler.output().last_levels(), 0b0001_1100);
        assert_eq!(scheduler.pwm_phase(), 0);
    }

    #[test]
    fn test_first_error_wins() {
        let state = ControlState::<2>::new();
        assert!(state.latch_error(KernelError::Isr));
        assert!(!state.latch_error(KernelError::Generic));
        assert_eq!(state.error(), Some(KernelError::Isr));
    }

    #[test]
    fn test_nested_fader_skips_advance() {
        let state = ControlState::<2>::new();
        let mut scheduler = scheduler(&state, 3);
        state
            .start_fader(1, FaderConfig::new(0, 255, FaderConfig::major_step(1), Effect::None))
            .unwrap();

        let pwm = state.monitor().enter_pwm(ReentrancyProtection::Enabled).unwrap();
        let fader = pwm.into_fader().unwrap();
        assert!(!state.monitor().is_pwm_busy());
        assert!(state.monitor().is_fader_busy());

        for _ in 0..3 {
            scheduler.tick();
        }
        assert_eq!(state.fader_overruns(), 1);
        assert_eq!(state.brightness(1), Some(Brightness::OFF));
        assert!(state.error().is_none());
        assert_eq!(drain(&state), [KernelEvent::FaderOverrun]);

        drop(fader);
        scheduler.tick();
        assert_eq!(state.brightness(1), Some(Brightness::new(1, 0)));
        assert_eq!(state.fader_overruns(), 1);
    }

    #[test]
    fn test_disabled_protection_ignores_busy_flags() {
        let state = ControlState::<2>::new();
        let config = SchedulerConfig::new(timing(3), PinMap::consecutive(0), [0, 1])
            .with_reentrancy(ReentrancyProtection::Disabled);
        let mut scheduler =
            Scheduler::new(&state, Board::default(), Buttons::default(), config).unwrap();
        state
            .start_fader(1, FaderConfig::new(0, 255, FaderConfig::major_step(1), Effect::None))
            .unwrap();

        let guard = state.monitor().enter_pwm(ReentrancyProtection::Enabled).unwrap();
        for _ in 0..3 {
            scheduler.tick();
        }
        drop(guard);

        assert!(state.error().is_none());
        assert_eq!(state.brightness(1), Some(Brightness::new(1, 0)));
    }

    #[test]
    fn test_guards_release_busy_flags() {
        let state = ControlState::<2>::new();
        {
            let pwm = state.monitor().enter_pwm(ReentrancyProtection::Enabled).unwrap();
            assert!(state.monitor().is_pwm_busy());
            assert_eq!(
                state
                    .monitor()
                    .enter_pwm(ReentrancyProtection::Enabled)
                    .err(),
                Some(KernelError::NestedPwm)
            );
            let _fader = pwm.into_fader().unwrap();
        }
        assert!(!state.monitor().is_pwm_busy());
        assert!(!state.monitor().is_fader_busy());
    }

    #[test]
    fn test_invalid_configuration_latches_generic_error() {
        let state = ControlState::<2>::new();
        let mut scheduler = scheduler(&state, 3);

        let result = state.configure_fader(0, FaderConfig::new(10, 5, 1, Effect::None));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidBounds {
                lower: 10,
                upper: 5
            })
        ));
        assert_eq!(state.error(), Some(KernelError::Generic));

        scheduler.tick();
        assert_eq!(scheduler.pwm_phase(), 0);
        assert_eq!(state.fader(0).map(|fader| fader.active), Some(false));
    }

    #[test]
    fn test_led_out_of_range_is_rejected() {
        let state = ControlState::<2>::new();
        assert!(matches!(
            state.set_brightness(2, Brightness::FULL),
            Err(ConfigError::LedOutOfRange(2))
        ));
        assert_eq!(state.error(), Some(KernelError::Generic));
        assert_eq!(state.brightness(2), None);
    }

    #[test]
    fn test_rejects_pin_outside_banks() {
        let state = ControlState::<2>::new();
        let pins = PinMap::new([
            heart_pwm::LedPin::from_pin_number(0),
            heart_pwm::LedPin { bank: 9, bit: 0 },
        ]);
        let config = SchedulerConfig::new(timing(3), pins, [0, 0]);
        let result = Scheduler::new(&state, Board::default(), Buttons::default(), config);
        assert!(matches!(result, Err(ConfigError::PinOutOfRange(1))));
        assert!(state.error().is_none());
    }

    #[test]
    fn test_setup_fade_to_lower() {
        let state = ControlState::<3>::new();
        let mut scheduler = scheduler(&state, 4);
        let config = FaderConfig::new(100, 255, 0, Effect::Invert);

        state.set_brightness(0, Brightness::new(100, 0x40)).unwrap();
        state.set_brightness(1, Brightness::new(200, 0)).unwrap();
        state.set_brightness(2, Brightness::new(3, 0)).unwrap();

        assert_eq!(state.setup_fade_to_lower(0, config), Ok(false));
        assert_eq!(state.brightness(0), Some(Brightness::new(100, 0)));
        assert_eq!(state.fader(0).map(|fader| fader.active), Some(false));

        assert_eq!(state.setup_fade_to_lower(1, config), Ok(true));
        let fader = state.fader(1).unwrap();
        assert_eq!(fader.config.delta, -FaderConfig::major_step(5));
        assert_eq!(fader.config.reload, Effect::None);

        assert_eq!(state.setup_fade_to_lower(2, config), Ok(true));
        assert_eq!(state.fader(2).unwrap().config.reload, Effect::SetupLower);

        for _ in 0..4 * 30 {
            scheduler.tick();
        }
        for led in 0..3 {
            assert_eq!(state.brightness(led).map(Brightness::major), Some(100));
            assert_eq!(state.fader(led).map(|fader| fader.active), Some(false));
        }
    }

    #[test]
    fn test_profiled_tick() {
        let state = ControlState::<2>::new();
        let mut scheduler = scheduler(&state, 3);
        let clock = FakeClock {
            micros: Cell::new(0),
        };
        let mut profiler = TickProfiler::new();

        scheduler.tick_profiled(&mut profiler, &clock);
        scheduler.tick_profiled(&mut profiler, &clock);

        let report = profiler.report().unwrap();
        assert_eq!(report.starts, 2);
        assert!(report.is_consistent());
        assert_eq!(report.max_duration.as_micros(), 7);
        assert_eq!(report.min_interval.map(|interval| interval.as_micros()), Some(14));
    }
}
