// Capture-path processing
//
// Both capture entry points funnel into one chain over the internal buffer:
// analyze, amplify, filter, cancel echo, suppress noise, control gain,
// detect voice, then measure. The interleaved int16 path enforces the strict
// native-rate geometry contract; the deinterleaved float path accepts
// arbitrary rates and conforms the output geometry on copy-out.

use crate::error::{Error, Result};
use crate::frame::AudioFrame;
use crate::runtime_setting::RuntimeSetting;
use crate::stream_config::{ProcessingConfig, StreamConfig};
use crate::submodule::pack_render_audio_buffer;

use super::types::AudioPipeline;

impl AudioPipeline {
    /// Processes one capture frame in place, with geometry taken from the
    /// frame itself.
    pub fn process_frame(&mut self, frame: &mut AudioFrame) -> Result<()> {
        if !frame.is_length_consistent() {
            return Err(Error::BadDataLength {
                got: frame.data.len(),
                expected: frame.samples_per_channel * frame.num_channels,
            });
        }
        let config = frame.stream_config();
        self.i16_scratch.clear();
        self.i16_scratch.extend_from_slice(&frame.data);
        let src = std::mem::take(&mut self.i16_scratch);
        let result = self.process_stream(&src, &config, &config, &mut frame.data);
        self.i16_scratch = src;
        result
    }

    /// Processes one 10 ms capture frame of interleaved int16 samples.
    ///
    /// All four stream slots must use the same native rate on this path and
    /// the output geometry must equal the input geometry, so the processed
    /// frame is written back into `dest` sample for sample.
    pub fn process_stream(
        &mut self,
        src: &[i16],
        input_config: &StreamConfig,
        output_config: &StreamConfig,
        dest: &mut [i16],
    ) -> Result<()> {
        if src.len() != input_config.num_samples() {
            return Err(Error::BadDataLength {
                got: src.len(),
                expected: input_config.num_samples(),
            });
        }
        if dest.len() != output_config.num_samples() {
            return Err(Error::BadDataLength {
                got: dest.len(),
                expected: output_config.num_samples(),
            });
        }

        let formats = self.reconciled_capture_formats(input_config, output_config);
        formats.validate_native()?;
        self.maybe_reinitialize(formats);
        self.ensure_stages();
        self.check_capture_preconditions()?;

        // Clipping is judged on the raw device samples, before conversion.
        if src.iter().any(|&s| s == i16::MAX || s == i16::MIN) {
            self.metrics.clipped_capture_frames += 1;
        }

        self.input_buffer.copy_from_interleaved_i16(src);
        self.stage_capture_input();
        self.run_capture_chain();
        self.emit_capture_output_i16(dest);
        self.finish_capture_frame();
        Ok(())
    }

    /// Processes one 10 ms capture frame of deinterleaved float channels, in
    /// place.
    ///
    /// `channels` holds one slice per input channel, plus one trailing
    /// keyboard slice when the input geometry declares it; the keyboard
    /// channel is never processed. The processed frame is written back into
    /// the leading output-frame samples of the first output channels, which
    /// is what makes differing input and output geometries work without a
    /// second buffer.
    pub fn process_stream_f32(
        &mut self,
        channels: &mut [&mut [f32]],
        input_config: &StreamConfig,
        output_config: &StreamConfig,
    ) -> Result<()> {
        let expected_lists =
            input_config.num_channels() + usize::from(input_config.has_keyboard());
        if channels.len() != expected_lists {
            return Err(Error::BadNumberChannels {
                got: channels.len(),
                expected: expected_lists,
            });
        }
        for slice in channels.iter().take(input_config.num_channels()) {
            if slice.len() < input_config.num_frames() {
                return Err(Error::BadDataLength {
                    got: slice.len(),
                    expected: input_config.num_frames(),
                });
            }
        }
        for slice in channels.iter().take(output_config.num_channels()) {
            if slice.len() < output_config.num_frames() {
                return Err(Error::BadDataLength {
                    got: slice.len(),
                    expected: output_config.num_frames(),
                });
            }
        }

        let formats = self.reconciled_capture_formats(input_config, output_config);
        formats.validate()?;
        self.maybe_reinitialize(formats);
        self.ensure_stages();
        self.check_capture_preconditions()?;

        let frames = input_config.num_frames();
        if channels
            .iter()
            .take(input_config.num_channels())
            .any(|slice| slice[..frames].iter().any(|s| s.abs() >= 1.0))
        {
            self.metrics.clipped_capture_frames += 1;
        }

        if input_config.sample_rate_hz() == self.capture_buffer.sample_rate_hz() {
            for (channel, src) in self.capture_buffer.channels_mut().iter_mut().zip(&*channels) {
                channel.copy_from_slice(&src[..frames]);
            }
        } else {
            for ((channel, src), resampler) in self
                .capture_buffer
                .channels_mut()
                .iter_mut()
                .zip(&*channels)
                .zip(self.input_resamplers.iter_mut())
            {
                resampler.resample(&src[..frames], channel);
            }
        }
        self.run_capture_chain();
        self.capture_buffer.copy_to_deinterleaved(
            channels,
            output_config,
            &mut self.output_resamplers,
            &mut self.scratch,
        );
        self.finish_capture_frame();
        Ok(())
    }

    /// Moves staged int16 input into the processing buffer, resampling down
    /// to the internal rate when the pipeline config caps it.
    fn stage_capture_input(&mut self) {
        if self.input_buffer.sample_rate_hz() == self.capture_buffer.sample_rate_hz() {
            for (dst, src) in self
                .capture_buffer
                .channels_mut()
                .iter_mut()
                .zip(self.input_buffer.channels())
            {
                dst.copy_from_slice(src);
            }
        } else {
            for ((dst, src), resampler) in self
                .capture_buffer
                .channels_mut()
                .iter_mut()
                .zip(self.input_buffer.channels())
                .zip(self.input_resamplers.iter_mut())
            {
                resampler.resample(src, dst);
            }
        }
    }

    /// Writes the processed frame back as interleaved int16 at the device
    /// rate, going through the staging buffer when the internal rate is
    /// capped below it.
    fn emit_capture_output_i16(&mut self, dest: &mut [i16]) {
        if self.capture_buffer.sample_rate_hz() == self.input_buffer.sample_rate_hz() {
            self.capture_buffer.copy_to_interleaved_i16(dest);
        } else {
            for ((dst, src), resampler) in self
                .input_buffer
                .channels_mut()
                .iter_mut()
                .zip(self.capture_buffer.channels())
                .zip(self.output_resamplers.iter_mut())
            {
                resampler.resample(src, dst);
            }
            self.input_buffer.copy_to_interleaved_i16(dest);
        }
    }

    /// Capture geometry candidate for this frame. Render slots that were
    /// never configured mirror the capture slot so a capture-only caller is
    /// not forced to report a render geometry first.
    fn reconciled_capture_formats(
        &self,
        input_config: &StreamConfig,
        output_config: &StreamConfig,
    ) -> ProcessingConfig {
        let mut formats = self.formats;
        formats.input_stream = *input_config;
        formats.output_stream = *output_config;
        if formats.reverse_input_stream.sample_rate_hz() == 0 {
            formats.reverse_input_stream = StreamConfig::new(input_config.sample_rate_hz(), 1);
        }
        if formats.reverse_output_stream.sample_rate_hz() == 0 {
            formats.reverse_output_stream = formats.reverse_input_stream;
        }
        formats
    }

    /// Commits a geometry change; a change triggered by frame parameters
    /// rather than an explicit initialize counts as implicit.
    pub(crate) fn maybe_reinitialize(&mut self, formats: ProcessingConfig) {
        if self.initialized && formats == self.formats {
            return;
        }
        if self.initialized {
            self.metrics.implicit_reinitializations += 1;
        }
        self.set_formats(formats);
    }

    /// Checked before the frame is touched so a failing call has no side
    /// effects on the signal path.
    fn check_capture_preconditions(&self) -> Result<()> {
        let aec = &self.config.echo_canceller;
        if aec.enabled && !aec.mobile_mode && (!self.render_frame_seen || !self.delay.was_set) {
            return Err(Error::StreamParameterNotSet("stream delay"));
        }
        if self.config.gain_controller1.uses_analog_mode() && self.analog.current_level.is_none() {
            return Err(Error::StreamParameterNotSet("analog level"));
        }
        Ok(())
    }

    /// The fixed-order stage chain over the internal capture buffer.
    fn run_capture_chain(&mut self) {
        self.drain_capture_settings();

        if let Some(analyzer) = &mut self.capture_analyzer {
            analyzer.analyze(&self.capture_buffer);
        }
        if let Some(stage) = &mut self.pre_amplifier {
            stage.process(&mut self.capture_buffer);
        }
        if let Some(stage) = &mut self.high_pass_filter {
            stage.process(&mut self.capture_buffer);
        }
        if let Some(echo) = &mut self.echo_control {
            echo.analyze_capture(&self.capture_buffer);
            let delay = if self.delay.was_set {
                Some(self.delay.reported_delay_ms)
            } else {
                None
            };
            echo.process_capture(&mut self.capture_buffer, delay);
        }
        if let Some(stage) = &mut self.noise_suppressor {
            stage.process(&mut self.capture_buffer);
        }

        let mut agc1_recommendation = None;
        if let Some(stage) = &mut self.gain_controller1 {
            agc1_recommendation = stage.process(&mut self.capture_buffer, self.analog.current_level);
        }
        if let Some(stage) = &mut self.gain_controller2 {
            stage.process(&mut self.capture_buffer);
        }

        // Analysis of an output nobody will hear is wasted work; the echo
        // canceller above still adapts so unmuting is seamless.
        if !self.output_will_be_muted {
            if let Some(detector) = &mut self.echo_detector {
                pack_render_audio_buffer(&self.capture_buffer, &mut self.packed_mono);
                detector.analyze_capture_audio(&self.packed_mono);
            }
            if let Some(vad) = &mut self.voice_detector {
                vad.analyze(&self.capture_buffer);
            }
        }
        if let Some(processor) = &mut self.capture_post_processor {
            processor.process(&mut self.capture_buffer);
        }
        if !self.output_will_be_muted {
            if let Some(estimator) = &mut self.level_estimator {
                estimator.analyze(&self.capture_buffer);
            }
        }

        self.update_recommended_analog_level(agc1_recommendation);
        self.refresh_stats();
    }

    fn update_recommended_analog_level(&mut self, agc1_recommendation: Option<i32>) {
        if !self.config.gain_controller1.uses_analog_mode() {
            return;
        }
        let agc1 = &self.config.gain_controller1;
        let level = agc1_recommendation
            .or(self.analog.current_level)
            .or(self.analog.recommended_level)
            .unwrap_or(agc1.analog_level_minimum)
            .clamp(agc1.analog_level_minimum, agc1.analog_level_maximum);
        self.analog.recommended_level = Some(level);
    }

    fn refresh_stats(&mut self) {
        self.stats.output_rms_dbfs = self.level_estimator.as_ref().map(|e| e.rms_dbfs());
        self.stats.voice_detected = self.voice_detector.as_ref().map(|v| v.voice_detected());
        let echo_metrics = self.echo_detector.as_ref().map(|d| d.metrics());
        self.stats.residual_echo_likelihood = echo_metrics.map(|m| m.echo_likelihood);
        self.stats.residual_echo_likelihood_recent_max =
            echo_metrics.map(|m| m.echo_likelihood_recent_max);
        self.stats.delay_ms = self
            .delay
            .was_set
            .then_some(self.delay.reported_delay_ms);
    }

    fn finish_capture_frame(&mut self) {
        self.metrics.capture_frames_processed += 1;
        // The analog level is a per-frame parameter; require a fresh report
        // next frame.
        self.analog.current_level = None;
        if let Some(sink) = &mut self.debug_dump {
            sink.record_capture(&self.capture_buffer);
        }
    }

    pub(crate) fn apply_capture_setting(&mut self, setting: RuntimeSetting) {
        self.metrics.capture_settings_applied += 1;
        match setting {
            RuntimeSetting::CapturePreGain(gain) => match &mut self.pre_amplifier {
                Some(stage) => stage.set_gain_factor(gain),
                None => self.pending_pre_gain = Some(gain),
            },
            RuntimeSetting::CaptureCompressionGainDb(gain_db) => {
                match &mut self.gain_controller1 {
                    Some(stage) => stage.set_compression_gain_db(gain_db),
                    None => self.pending_compression_gain_db = Some(gain_db),
                }
            }
            RuntimeSetting::CaptureFixedPostGainDb(gain_db) => {
                match &mut self.gain_controller2 {
                    Some(stage) => stage.set_fixed_gain_db(gain_db),
                    None => self.pending_fixed_post_gain_db = Some(gain_db),
                }
            }
            // Render-targeted settings never land on this queue.
            RuntimeSetting::PlayoutVolumeChange(_) | RuntimeSetting::CustomRenderSetting(_) => {}
        }
    }
}
