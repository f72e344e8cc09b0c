// Render-path processing
//
// The render (reverse) direction exists to feed the echo machinery a
// reference of what the loudspeaker is about to play. Processing here is
// light: optional synthetic playout substitution, an optional host
// pre-processor, then analysis by the echo controller and the residual echo
// detector.

use crate::error::{Error, Result};
use crate::frame::AudioFrame;
use crate::runtime_setting::RuntimeSetting;
use crate::stream_config::{ProcessingConfig, StreamConfig};
use crate::submodule::pack_render_audio_buffer;

use super::types::AudioPipeline;

impl AudioPipeline {
    /// Processes one render frame in place, with geometry taken from the
    /// frame itself.
    pub fn process_reverse_frame(&mut self, frame: &mut AudioFrame) -> Result<()> {
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
        let result = self.process_reverse_stream(&src, &config, &config, &mut frame.data);
        self.i16_scratch = src;
        result
    }

    /// Processes one 10 ms render frame of interleaved int16 samples, under
    /// the same strict native-rate contract as the capture counterpart.
    pub fn process_reverse_stream(
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

        let formats = self.reconciled_render_formats(input_config, output_config);
        formats.validate_native()?;
        self.maybe_reinitialize(formats);
        self.ensure_stages();

        self.render_buffer.copy_from_interleaved_i16(src);
        self.run_render_chain();
        self.render_buffer.copy_to_interleaved_i16(dest);
        self.finish_render_frame();
        Ok(())
    }

    /// Processes one 10 ms render frame of deinterleaved float channels, in
    /// place, conforming to the reverse-output geometry on copy-out.
    pub fn process_reverse_stream_f32(
        &mut self,
        channels: &mut [&mut [f32]],
        input_config: &StreamConfig,
        output_config: &StreamConfig,
    ) -> Result<()> {
        if channels.len() != input_config.num_channels() {
            return Err(Error::BadNumberChannels {
                got: channels.len(),
                expected: input_config.num_channels(),
            });
        }
        for slice in channels.iter() {
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

        let formats = self.reconciled_render_formats(input_config, output_config);
        formats.validate()?;
        self.maybe_reinitialize(formats);
        self.ensure_stages();

        let frames = input_config.num_frames();
        for (channel, src) in self.render_buffer.channels_mut().iter_mut().zip(&*channels) {
            channel.copy_from_slice(&src[..frames]);
        }
        self.run_render_chain();
        self.render_buffer.copy_to_deinterleaved(
            channels,
            output_config,
            &mut self.render_output_resamplers,
            &mut self.scratch,
        );
        self.finish_render_frame();
        Ok(())
    }

    /// Analysis-only variant for callers that do not consume processed
    /// render audio. Runs the same internal chain without writing anything
    /// back.
    pub fn analyze_reverse_stream(
        &mut self,
        channels: &[&[f32]],
        reverse_config: &StreamConfig,
    ) -> Result<()> {
        if channels.len() != reverse_config.num_channels() {
            return Err(Error::BadNumberChannels {
                got: channels.len(),
                expected: reverse_config.num_channels(),
            });
        }
        for slice in channels.iter() {
            if slice.len() < reverse_config.num_frames() {
                return Err(Error::BadDataLength {
                    got: slice.len(),
                    expected: reverse_config.num_frames(),
                });
            }
        }

        let formats = self.reconciled_render_formats(reverse_config, reverse_config);
        formats.validate()?;
        self.maybe_reinitialize(formats);
        self.ensure_stages();

        self.render_buffer.copy_from_deinterleaved(channels);
        self.run_render_chain();
        self.finish_render_frame();
        Ok(())
    }

    /// Render geometry candidate for this frame. Capture slots that were
    /// never configured mirror the render slot, symmetric to the capture
    /// side.
    fn reconciled_render_formats(
        &self,
        input_config: &StreamConfig,
        output_config: &StreamConfig,
    ) -> ProcessingConfig {
        let mut formats = self.formats;
        formats.reverse_input_stream = *input_config;
        formats.reverse_output_stream = *output_config;
        if formats.input_stream.sample_rate_hz() == 0 {
            formats.input_stream = StreamConfig::new(input_config.sample_rate_hz(), 1);
        }
        if formats.output_stream.sample_rate_hz() == 0 {
            formats.output_stream = formats.input_stream;
        }
        formats
    }

    fn run_render_chain(&mut self) {
        self.drain_render_settings();

        if let Some(generator) = &mut self.playout_generator {
            generator.fill(&mut self.render_buffer);
        }
        if let Some(processor) = &mut self.render_pre_processor {
            processor.process(&mut self.render_buffer);
        }
        if let Some(echo) = &mut self.echo_control {
            echo.analyze_render(&mut self.render_buffer);
        }
        if let Some(detector) = &mut self.echo_detector {
            pack_render_audio_buffer(&self.render_buffer, &mut self.packed_mono);
            detector.analyze_render_audio(&self.packed_mono);
        }
    }

    fn finish_render_frame(&mut self) {
        self.metrics.render_frames_processed += 1;
        self.render_frame_seen = true;
        if let Some(sink) = &mut self.debug_dump {
            sink.record_render(&self.render_buffer);
        }
    }

    pub(crate) fn apply_render_setting(&mut self, setting: RuntimeSetting) {
        self.metrics.render_settings_applied += 1;
        match setting {
            RuntimeSetting::PlayoutVolumeChange(_) | RuntimeSetting::CustomRenderSetting(_) => {
                if let Some(processor) = &mut self.render_pre_processor {
                    processor.handle_runtime_setting(setting);
                }
            }
            // Capture-targeted settings never land on this queue.
            _ => {}
        }
    }
}
