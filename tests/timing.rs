mod tests {
    use heart_pwm::{ConfigError, Duration, KernelTiming, TimingConfig};

    #[test]
    fn test_default_timing() {
        let timing = TimingConfig::default().derive().unwrap();
        assert_eq!(
            timing,
            KernelTiming {
                tick_interval_us: 39,
                fader_update_ticks: 570,
                hold_samples: 15,
                reset_samples: 2,
                demo_step_samples: 25,
                error_blink_ticks: 2137,
            }
        );
    }

    #[test]
    fn test_corrections_scale_counts() {
        let config = TimingConfig {
            fader_rate_correction: 1.0,
            demo_rate_correction: 1.0,
            ..TimingConfig::default()
        };
        let timing = config.derive().unwrap();
        // 66666 us / 39 us
        assert_eq!(timing.fader_update_ticks, 1709);
        assert_eq!(timing.demo_step_samples, 150);
    }

    #[test]
    fn test_rejects_zero_frequency() {
        for (pwm_frequency_hz, fader_update_hz) in [(0, 15), (100, 0)] {
            let config = TimingConfig {
                pwm_frequency_hz,
                fader_update_hz,
                ..TimingConfig::default()
            };
            assert!(matches!(config.derive(), Err(ConfigError::InvalidTiming(_))));
        }
    }

    #[test]
    fn test_rejects_fader_rate_out_of_range() {
        for fader_update_hz in [5, 9, 34, 101] {
            let config = TimingConfig {
                fader_update_hz,
                ..TimingConfig::default()
            };
            assert!(
                matches!(config.derive(), Err(ConfigError::InvalidTiming(_))),
                "{} Hz accepted",
                fader_update_hz
            );
        }

        for fader_update_hz in [10, 33] {
            let config = TimingConfig {
                fader_update_hz,
                ..TimingConfig::default()
            };
            assert!(config.derive().is_ok());
        }
    }

    #[test]
    fn test_rejects_bad_corrections() {
        for correction in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let config = TimingConfig {
                fader_rate_correction: correction,
                ..TimingConfig::default()
            };
            assert!(matches!(config.derive(), Err(ConfigError::InvalidTiming(_))));

            let config = TimingConfig {
                demo_rate_correction: correction,
                ..TimingConfig::default()
            };
            assert!(matches!(config.derive(), Err(ConfigError::InvalidTiming(_))));
        }
    }

    #[test]
    fn test_rejects_pwm_frequency_overflow() {
        let config = TimingConfig {
            pwm_frequency_hz: u32::MAX,
            ..TimingConfig::default()
        };
        assert!(matches!(config.derive(), Err(ConfigError::InvalidTiming(_))));
    }

    #[test]
    fn test_rejects_too_short_fader_interval() {
        let config = TimingConfig {
            fader_rate_correction: 10_000.0,
            ..TimingConfig::default()
        };
        assert_eq!(
            config.derive(),
            Err(ConfigError::TooFewTicks {
                ticks: 1,
                required: 2
            })
        );
    }

    #[test]
    fn test_short_durations_round_up_to_one_sample() {
        let config = TimingConfig {
            reset_debounce: Duration::from_millis(1),
            hold: Duration::from_millis(0),
            ..TimingConfig::default()
        };
        let timing = config.derive().unwrap();
        assert_eq!(timing.reset_samples, 1);
        assert_eq!(timing.hold_samples, 1);
    }
}
