// End-to-end pipeline orchestration tests

use audio_pipeline::*;

/// Installs a per-run subscriber so RUST_LOG surfaces pipeline tracing in
/// test output.
fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn mono_16k() -> StreamConfig {
    StreamConfig::new(16000, 1)
}

fn frame_i16(value: i16) -> Vec<i16> {
    vec![value; 160]
}

fn tone_i16(chunk: usize, amplitude: f32) -> Vec<i16> {
    (0..160)
        .map(|i| {
            let n = (chunk * 160 + i) as f32;
            ((2.0 * std::f32::consts::PI * 440.0 * n / 16000.0).sin() * amplitude * 32767.0) as i16
        })
        .collect()
}

#[cfg(test)]
mod passthrough_tests {
    use super::*;

    #[test]
    fn test_default_config_is_bit_exact() {
        let mut pipeline = PipelineBuilder::new().build().unwrap();
        let config = mono_16k();
        let src = tone_i16(0, 0.5);
        let mut dest = vec![0i16; 160];
        pipeline
            .process_stream(&src, &config, &config, &mut dest)
            .unwrap();
        assert_eq!(dest, src);
    }

    #[test]
    fn test_full_scale_survives_round_trip() {
        let mut pipeline = PipelineBuilder::new().build().unwrap();
        let config = mono_16k();
        let mut src = frame_i16(0);
        src[0] = i16::MAX;
        src[1] = i16::MIN;
        let mut dest = vec![0i16; 160];
        pipeline
            .process_stream(&src, &config, &config, &mut dest)
            .unwrap();
        assert_eq!(dest, src);
        assert_eq!(pipeline.call_metrics().clipped_capture_frames, 1);
    }

    #[test]
    fn test_float_path_is_in_place() {
        let mut pipeline = PipelineBuilder::new().build().unwrap();
        let config = mono_16k();
        let mut storage: Vec<f32> = (0..160).map(|i| (i as f32 / 160.0) - 0.5).collect();
        let expected = storage.clone();
        let mut channels: Vec<&mut [f32]> = vec![&mut storage];
        pipeline
            .process_stream_f32(&mut channels, &config, &config)
            .unwrap();
        assert_eq!(storage, expected);
    }
}

#[cfg(test)]
mod geometry_tests {
    use super::*;

    #[test]
    fn test_first_frame_establishes_geometry() {
        init_tracing();
        let mut pipeline = PipelineBuilder::new().build().unwrap();
        let config = StreamConfig::new(48000, 2);
        let src = vec![0i16; 960];
        let mut dest = vec![0i16; 960];
        pipeline
            .process_stream(&src, &config, &config, &mut dest)
            .unwrap();
        assert_eq!(pipeline.proc_sample_rate_hz(), 48000);
        assert_eq!(pipeline.num_input_channels(), 2);
        assert_eq!(pipeline.call_metrics().implicit_reinitializations, 0);
    }

    #[test]
    fn test_geometry_change_reinitializes_implicitly() {
        init_tracing();
        let mut pipeline = PipelineBuilder::new().build().unwrap();

        let config = mono_16k();
        let mut storage = vec![0.0f32; 160];
        let mut channels: Vec<&mut [f32]> = vec![&mut storage];
        pipeline
            .process_stream_f32(&mut channels, &config, &config)
            .unwrap();

        let wide = StreamConfig::new(32000, 1);
        let mut storage = vec![0.0f32; 320];
        let mut channels: Vec<&mut [f32]> = vec![&mut storage];
        pipeline
            .process_stream_f32(&mut channels, &wide, &wide)
            .unwrap();

        assert_eq!(pipeline.proc_sample_rate_hz(), 32000);
        assert_eq!(pipeline.call_metrics().implicit_reinitializations, 1);
    }

    #[test]
    fn test_rejects_non_native_rate_on_int16_path() {
        let mut pipeline = PipelineBuilder::new().build().unwrap();
        let config = StreamConfig::new(44100, 1);
        let src = vec![0i16; 441];
        let mut dest = vec![0i16; 441];
        assert_eq!(
            pipeline.process_stream(&src, &config, &config, &mut dest),
            Err(Error::BadSampleRate(44100))
        );
    }

    #[test]
    fn test_rejects_wrong_data_length() {
        let mut pipeline = PipelineBuilder::new().build().unwrap();
        let config = mono_16k();
        let src = vec![0i16; 100];
        let mut dest = vec![0i16; 160];
        assert_eq!(
            pipeline.process_stream(&src, &config, &config, &mut dest),
            Err(Error::BadDataLength {
                got: 100,
                expected: 160
            })
        );
    }

    #[test]
    fn test_float_path_downmixes_and_resamples_output() {
        let mut pipeline = PipelineBuilder::new().build().unwrap();
        let input = StreamConfig::new(32000, 2);
        let output = StreamConfig::new(16000, 1);

        let mut left = vec![0.4f32; 320];
        let mut right = vec![0.2f32; 320];
        let mut channels: Vec<&mut [f32]> = vec![&mut left, &mut right];
        pipeline
            .process_stream_f32(&mut channels, &input, &output)
            .unwrap();

        // Mono mixdown of the two constant channels at the output rate.
        for &sample in &left[..160] {
            assert!((sample - 0.3).abs() < 1e-3, "got {sample}");
        }
        assert_eq!(pipeline.num_output_channels(), 1);
    }

    #[test]
    fn test_keyboard_channel_is_ignored() {
        let mut pipeline = PipelineBuilder::new().build().unwrap();
        let input = StreamConfig::with_keyboard(16000, 1, true);
        let output = mono_16k();

        let mut voice = vec![0.1f32; 160];
        let mut keyboard = vec![0.9f32; 160];
        let mut channels: Vec<&mut [f32]> = vec![&mut voice, &mut keyboard];
        pipeline
            .process_stream_f32(&mut channels, &input, &output)
            .unwrap();
        assert!(keyboard.iter().all(|&s| s == 0.9));
    }

    #[test]
    fn test_internal_rate_capped_by_pipeline_config() {
        let mut config = Config::default();
        config.pipeline.maximum_internal_processing_rate = 32000;
        let mut pipeline = PipelineBuilder::new().with_config(config).build().unwrap();

        let stream = StreamConfig::new(48000, 1);
        let src = vec![500i16; 480];
        let mut dest = vec![0i16; 480];
        pipeline
            .process_stream(&src, &stream, &stream, &mut dest)
            .unwrap();
        assert_eq!(pipeline.proc_sample_rate_hz(), 32000);
        // A constant signal survives the down- and up-conversion.
        assert!(dest.iter().all(|&s| (i32::from(s) - 500).abs() <= 1));
    }

    #[test]
    fn test_explicit_initialize_with_geometry() {
        let mut pipeline = PipelineBuilder::new().build().unwrap();
        let formats = ProcessingConfig {
            input_stream: StreamConfig::new(48000, 2),
            output_stream: StreamConfig::new(48000, 2),
            reverse_input_stream: mono_16k(),
            reverse_output_stream: mono_16k(),
        };
        pipeline.initialize_with(&formats).unwrap();
        assert_eq!(pipeline.proc_sample_rate_hz(), 48000);
        assert_eq!(pipeline.num_reverse_channels(), 1);

        let bad = ProcessingConfig::default();
        assert!(pipeline.initialize_with(&bad).is_err());
        // Failed initialize leaves the previous geometry alone.
        assert_eq!(pipeline.proc_sample_rate_hz(), 48000);
    }
}

#[cfg(test)]
mod delay_and_level_tests {
    use super::*;

    #[test]
    fn test_delay_is_clamped_with_warning() {
        let mut pipeline = PipelineBuilder::new().build().unwrap();
        let result = pipeline.set_stream_delay_ms(600);
        assert_eq!(result, Err(Error::BadStreamParameterWarning("stream delay")));
        assert!(result.unwrap_err().is_warning());
        assert_eq!(pipeline.stream_delay_ms(), 500);
        assert!(pipeline.was_stream_delay_set());

        assert!(pipeline.set_stream_delay_ms(-5).is_err());
        assert_eq!(pipeline.stream_delay_ms(), 0);
    }

    #[test]
    fn test_delay_offset_applies_before_clamping() {
        let mut pipeline = PipelineBuilder::new().build().unwrap();
        pipeline.set_delay_offset_ms(100);
        pipeline.set_stream_delay_ms(50).unwrap();
        assert_eq!(pipeline.stream_delay_ms(), 150);

        pipeline.set_delay_offset_ms(-100);
        assert!(pipeline.set_stream_delay_ms(50).is_err());
        assert_eq!(pipeline.stream_delay_ms(), 0);
    }

    #[test]
    fn test_echo_canceller_requires_render_and_delay() {
        let mut config = Config::default();
        config.echo_canceller.enabled = true;
        let mut pipeline = PipelineBuilder::new().with_config(config).build().unwrap();

        let stream = mono_16k();
        let src = tone_i16(0, 0.3);
        let mut dest = vec![0i16; 160];
        assert_eq!(
            pipeline.process_stream(&src, &stream, &stream, &mut dest),
            Err(Error::StreamParameterNotSet("stream delay"))
        );

        let render = frame_i16(0);
        let mut render_out = vec![0i16; 160];
        pipeline
            .process_reverse_stream(&render, &stream, &stream, &mut render_out)
            .unwrap();
        pipeline.set_stream_delay_ms(40).unwrap();
        pipeline
            .process_stream(&src, &stream, &stream, &mut dest)
            .unwrap();
    }

    #[test]
    fn test_mobile_mode_tolerates_missing_delay() {
        let mut config = Config::default();
        config.echo_canceller.enabled = true;
        config.echo_canceller.mobile_mode = true;
        let mut pipeline = PipelineBuilder::new().with_config(config).build().unwrap();

        let stream = mono_16k();
        let src = tone_i16(0, 0.3);
        let mut dest = vec![0i16; 160];
        pipeline
            .process_stream(&src, &stream, &stream, &mut dest)
            .unwrap();
    }

    #[test]
    fn test_analog_level_requires_enabled_agc() {
        let mut pipeline = PipelineBuilder::new().build().unwrap();
        assert_eq!(
            pipeline.set_stream_analog_level(100),
            Err(Error::NotEnabled("gain_controller1"))
        );
    }

    #[test]
    fn test_analog_mode_requires_level_every_frame() {
        let mut config = Config::default();
        config.gain_controller1.enabled = true;
        let mut pipeline = PipelineBuilder::new().with_config(config).build().unwrap();

        let stream = mono_16k();
        let src = tone_i16(0, 0.3);
        let mut dest = vec![0i16; 160];
        assert_eq!(
            pipeline.process_stream(&src, &stream, &stream, &mut dest),
            Err(Error::StreamParameterNotSet("analog level"))
        );

        pipeline.set_stream_analog_level(128).unwrap();
        pipeline
            .process_stream(&src, &stream, &stream, &mut dest)
            .unwrap();
        let recommended = pipeline.recommended_stream_analog_level();
        assert!((0..=255).contains(&recommended));

        // The level is consumed per frame; the next one needs a fresh report.
        assert_eq!(
            pipeline.process_stream(&src, &stream, &stream, &mut dest),
            Err(Error::StreamParameterNotSet("analog level"))
        );
    }

    #[test]
    fn test_analog_level_clamped_to_configured_bounds() {
        let mut config = Config::default();
        config.gain_controller1.enabled = true;
        config.gain_controller1.analog_level_minimum = 10;
        config.gain_controller1.analog_level_maximum = 100;
        let mut pipeline = PipelineBuilder::new().with_config(config).build().unwrap();

        let result = pipeline.set_stream_analog_level(500);
        assert_eq!(result, Err(Error::BadStreamParameterWarning("analog level")));
        assert_eq!(pipeline.recommended_stream_analog_level(), 100);
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_apply_config_replaces_wholesale() {
        init_tracing();
        let mut pipeline = PipelineBuilder::new().build().unwrap();
        let mut config = Config::default();
        config.noise_suppression.enabled = true;
        config.noise_suppression.level = NoiseSuppressionLevel::High;
        pipeline.apply_config(config.clone()).unwrap();
        assert_eq!(pipeline.get_config(), config);
    }

    #[test]
    fn test_invalid_config_leaves_active_one_untouched() {
        let mut pipeline = PipelineBuilder::new().build().unwrap();
        let good = pipeline.get_config();

        let mut bad = Config::default();
        bad.gain_controller1.target_level_dbfs = 99;
        assert!(pipeline.apply_config(bad).is_err());
        assert_eq!(pipeline.get_config(), good);
    }

    #[test]
    fn test_key_pressed_round_trip() {
        let mut pipeline = PipelineBuilder::new().build().unwrap();
        assert!(!pipeline.stream_key_pressed());
        pipeline.set_stream_key_pressed(true);
        assert!(pipeline.stream_key_pressed());
    }

    #[test]
    fn test_initialize_resets_call_state() {
        let mut pipeline = PipelineBuilder::new().build().unwrap();
        let stream = mono_16k();
        let src = tone_i16(0, 0.2);
        let mut dest = vec![0i16; 160];
        pipeline
            .process_stream(&src, &stream, &stream, &mut dest)
            .unwrap();
        pipeline.set_stream_delay_ms(30).unwrap();
        assert!(pipeline.was_stream_delay_set());
        assert_eq!(pipeline.call_metrics().capture_frames_processed, 1);

        pipeline.initialize();
        assert!(!pipeline.was_stream_delay_set());
        assert_eq!(pipeline.call_metrics().capture_frames_processed, 0);
        // Geometry and config survive the reset.
        assert_eq!(pipeline.proc_sample_rate_hz(), 16000);
    }
}

#[cfg(test)]
mod statistics_tests {
    use super::*;

    #[test]
    fn test_level_and_voice_stats_follow_their_stages() {
        let mut config = Config::default();
        config.level_estimation.enabled = true;
        config.voice_detection.enabled = true;
        let mut pipeline = PipelineBuilder::new().with_config(config).build().unwrap();

        let stream = mono_16k();
        let src = tone_i16(0, 0.5);
        let mut dest = vec![0i16; 160];
        pipeline
            .process_stream(&src, &stream, &stream, &mut dest)
            .unwrap();

        let stats = pipeline.get_statistics(true);
        let rms = stats.output_rms_dbfs.unwrap();
        assert!((0..=127).contains(&rms));
        assert!(rms < 127, "a loud tone is not silence");
        assert!(stats.voice_detected.is_some());
    }

    #[test]
    fn test_echo_stats_withheld_without_remote_tracks() {
        let mut pipeline = PipelineBuilder::new().build().unwrap();
        let stream = mono_16k();
        let src = tone_i16(0, 0.2);
        let mut dest = vec![0i16; 160];
        pipeline
            .process_stream(&src, &stream, &stream, &mut dest)
            .unwrap();

        // The detector is on by default, so the likelihood exists...
        assert!(pipeline
            .get_statistics(true)
            .residual_echo_likelihood
            .is_some());
        // ...but is withheld when no remote track could produce echo.
        assert!(pipeline
            .get_statistics(false)
            .residual_echo_likelihood
            .is_none());
    }

    #[test]
    fn test_delay_stat_reflects_reported_delay() {
        let mut pipeline = PipelineBuilder::new().build().unwrap();
        let stream = mono_16k();
        let src = frame_i16(0);
        let mut dest = vec![0i16; 160];

        pipeline
            .process_stream(&src, &stream, &stream, &mut dest)
            .unwrap();
        assert_eq!(pipeline.get_statistics(true).delay_ms, None);

        pipeline.set_stream_delay_ms(70).unwrap();
        pipeline
            .process_stream(&src, &stream, &stream, &mut dest)
            .unwrap();
        assert_eq!(pipeline.get_statistics(true).delay_ms, Some(70));
    }
}

#[cfg(test)]
mod mute_hint_tests {
    use super::*;

    #[test]
    fn test_muted_output_skips_analysis() {
        let mut config = Config::default();
        config.level_estimation.enabled = true;
        config.voice_detection.enabled = true;
        let mut pipeline = PipelineBuilder::new().with_config(config).build().unwrap();
        pipeline.set_output_will_be_muted(true);
        assert!(pipeline.output_will_be_muted());

        let stream = mono_16k();
        let src = tone_i16(0, 0.5);
        let mut dest = vec![0i16; 160];
        pipeline
            .process_stream(&src, &stream, &stream, &mut dest)
            .unwrap();
        // The signal still flows through, only the analysis idles.
        assert_eq!(dest, src);
        let stats = pipeline.get_statistics(true);
        assert_eq!(stats.output_rms_dbfs, Some(127));
        assert_eq!(stats.voice_detected, Some(false));

        pipeline.set_output_will_be_muted(false);
        pipeline
            .process_stream(&src, &stream, &stream, &mut dest)
            .unwrap();
        assert!(pipeline.get_statistics(true).output_rms_dbfs.unwrap() < 127);
    }
}

#[cfg(test)]
mod runtime_setting_tests {
    use super::*;

    #[test]
    fn test_pre_gain_applies_on_next_frame() {
        let mut config = Config::default();
        config.pre_amplifier.enabled = true;
        let mut pipeline = PipelineBuilder::new().with_config(config).build().unwrap();

        let stream = mono_16k();
        let mut storage = vec![0.25f32; 160];
        let mut channels: Vec<&mut [f32]> = vec![&mut storage];
        pipeline
            .process_stream_f32(&mut channels, &stream, &stream)
            .unwrap();
        assert!(storage.iter().all(|&s| (s - 0.25).abs() < 1e-6));

        pipeline.set_runtime_setting(RuntimeSetting::capture_pre_gain(2.0).unwrap());
        storage.fill(0.25);
        let mut channels: Vec<&mut [f32]> = vec![&mut storage];
        pipeline
            .process_stream_f32(&mut channels, &stream, &stream)
            .unwrap();
        assert!(storage.iter().all(|&s| (s - 0.5).abs() < 1e-6));
        assert_eq!(pipeline.call_metrics().capture_settings_applied, 1);
    }

    #[test]
    fn test_setting_for_disabled_stage_survives_until_enable() {
        let mut pipeline = PipelineBuilder::new().build().unwrap();
        pipeline.set_runtime_setting(RuntimeSetting::capture_pre_gain(3.0).unwrap());

        let stream = mono_16k();
        let mut storage = vec![0.1f32; 160];
        let mut channels: Vec<&mut [f32]> = vec![&mut storage];
        pipeline
            .process_stream_f32(&mut channels, &stream, &stream)
            .unwrap();
        // No pre-amplifier yet, nothing applied to the signal.
        assert!(storage.iter().all(|&s| (s - 0.1).abs() < 1e-6));

        let mut config = Config::default();
        config.pre_amplifier.enabled = true;
        pipeline.apply_config(config).unwrap();
        storage.fill(0.1);
        let mut channels: Vec<&mut [f32]> = vec![&mut storage];
        pipeline
            .process_stream_f32(&mut channels, &stream, &stream)
            .unwrap();
        assert!(storage.iter().all(|&s| (s - 0.3).abs() < 1e-5));
    }

    #[test]
    fn test_handle_enqueues_from_other_threads() {
        let mut config = Config::default();
        config.pre_amplifier.enabled = true;
        let mut pipeline = PipelineBuilder::new().with_config(config).build().unwrap();

        let handle = pipeline.runtime_settings_handle();
        let worker = std::thread::spawn(move || {
            handle.enqueue(RuntimeSetting::capture_pre_gain(2.0).unwrap());
        });
        worker.join().unwrap();

        let stream = mono_16k();
        let mut storage = vec![0.2f32; 160];
        let mut channels: Vec<&mut [f32]> = vec![&mut storage];
        pipeline
            .process_stream_f32(&mut channels, &stream, &stream)
            .unwrap();
        assert!(storage.iter().all(|&s| (s - 0.4).abs() < 1e-6));
    }
}
