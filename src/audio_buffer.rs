// Internal audio buffer
//
// The stage chain operates on deinterleaved f32 channel data in [-1, 1],
// one 10 ms chunk at a time. This module converts between the caller-facing
// formats (interleaved int16, deinterleaved float) and the internal layout,
// including output-geometry conformance: channel mixdown and sample-rate
// conversion at the output boundary.

use crate::stream_config::StreamConfig;

const I16_SCALE: f32 = 32768.0;

/// Deinterleaved f32 frame holding the processed channels of one chunk.
///
/// The keyboard channel, when present in the caller's data, is skipped on
/// copy-in and untouched on copy-out.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    sample_rate_hz: u32,
    num_frames: usize,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            sample_rate_hz: config.sample_rate_hz(),
            num_frames: config.num_frames(),
            channels: vec![vec![0.0; config.num_frames()]; config.num_channels()],
        }
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.channels
    }

    /// Resizes for a new geometry and zeroes all samples.
    pub fn reconfigure(&mut self, config: &StreamConfig) {
        self.sample_rate_hz = config.sample_rate_hz();
        self.num_frames = config.num_frames();
        self.channels
            .resize(config.num_channels(), vec![0.0; config.num_frames()]);
        for channel in &mut self.channels {
            channel.clear();
            channel.resize(config.num_frames(), 0.0);
        }
    }

    /// Fills the buffer from interleaved int16 samples.
    pub fn copy_from_interleaved_i16(&mut self, data: &[i16]) {
        let num_channels = self.channels.len();
        for (frame, samples) in data.chunks_exact(num_channels).enumerate() {
            for (ch, &sample) in samples.iter().enumerate() {
                self.channels[ch][frame] = f32::from(sample) / I16_SCALE;
            }
        }
    }

    /// Writes the buffer back as interleaved int16, saturating at full scale.
    pub fn copy_to_interleaved_i16(&self, data: &mut [i16]) {
        let num_channels = self.channels.len();
        for (frame, samples) in data.chunks_exact_mut(num_channels).enumerate() {
            for (ch, sample) in samples.iter_mut().enumerate() {
                let value = (self.channels[ch][frame] * I16_SCALE).round();
                *sample = value.clamp(-I16_SCALE, I16_SCALE - 1.0) as i16;
            }
        }
    }

    /// Fills the buffer from deinterleaved float channel slices. The slice
    /// list may carry one extra keyboard channel at the end; it is ignored.
    pub fn copy_from_deinterleaved(&mut self, src: &[&[f32]]) {
        for (ch, channel) in self.channels.iter_mut().enumerate() {
            let len = channel.len();
            channel.copy_from_slice(&src[ch][..len]);
        }
    }

    /// Mixes the processed channels down to `output_channels` into `dest`,
    /// resampling each output channel with its entry in `resamplers`.
    ///
    /// `dest` may be the same storage the input arrived in; only the leading
    /// `output_frames` samples of the first `output_channels` slices are
    /// written.
    pub fn copy_to_deinterleaved(
        &self,
        dest: &mut [&mut [f32]],
        output_config: &StreamConfig,
        resamplers: &mut [FrameResampler],
        scratch: &mut Vec<f32>,
    ) {
        let output_channels = output_config.num_channels();
        let output_frames = output_config.num_frames();
        let needs_resample = output_config.sample_rate_hz() != self.sample_rate_hz;

        for out_ch in 0..output_channels {
            scratch.clear();
            if output_channels == self.channels.len() {
                scratch.extend_from_slice(&self.channels[out_ch]);
            } else {
                // Mixdown to mono: average all processed channels.
                scratch.resize(self.num_frames, 0.0);
                let scale = 1.0 / self.channels.len() as f32;
                for channel in &self.channels {
                    for (acc, &sample) in scratch.iter_mut().zip(channel.iter()) {
                        *acc += sample * scale;
                    }
                }
            }

            if needs_resample {
                resamplers[out_ch].resample(scratch, &mut dest[out_ch][..output_frames]);
            } else {
                dest[out_ch][..output_frames].copy_from_slice(scratch);
            }
        }
    }
}

/// Per-channel linear-interpolation resampler producing exact chunk-sized
/// output. One sample of history carries across frames so chunk boundaries
/// stay continuous.
#[derive(Debug, Clone)]
pub struct FrameResampler {
    history: f32,
    primed: bool,
}

impl FrameResampler {
    pub fn new() -> Self {
        Self {
            history: 0.0,
            primed: false,
        }
    }

    pub fn reset(&mut self) {
        self.history = 0.0;
        self.primed = false;
    }

    /// Produces exactly `output.len()` samples from `input`.
    pub fn resample(&mut self, input: &[f32], output: &mut [f32]) {
        if input.is_empty() || output.is_empty() {
            return;
        }
        if !self.primed {
            self.history = input[0];
            self.primed = true;
        }

        let step = input.len() as f64 / output.len() as f64;
        for (i, out) in output.iter_mut().enumerate() {
            // Position measured from the history sample at -1.
            let pos = (i as f64 + 1.0) * step - 1.0;
            let idx = pos.floor();
            let frac = (pos - idx) as f32;
            let idx = idx as isize;

            let left = if idx < 0 {
                self.history
            } else {
                input[(idx as usize).min(input.len() - 1)]
            };
            let right = input[((idx + 1).max(0) as usize).min(input.len() - 1)];
            *out = left + (right - left) * frac;
        }

        self.history = input[input.len() - 1];
    }
}

impl Default for FrameResampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i16_round_trip() {
        let config = StreamConfig::new(16000, 2);
        let mut buffer = AudioBuffer::new(&config);
        let data: Vec<i16> = (0..320).map(|i| (i * 7 % 1000) as i16).collect();
        buffer.copy_from_interleaved_i16(&data);
        let mut out = vec![0i16; 320];
        buffer.copy_to_interleaved_i16(&mut out);
        assert_eq!(out, data);
    }

    #[test]
    fn test_copy_from_deinterleaved_skips_trailing_keyboard() {
        let config = StreamConfig::new(16000, 1);
        let mut buffer = AudioBuffer::new(&config);
        let voice = vec![0.5f32; 160];
        let keyboard = vec![0.9f32; 160];
        buffer.copy_from_deinterleaved(&[&voice, &keyboard]);
        assert!(buffer.channel(0).iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_mono_mixdown_averages() {
        let config = StreamConfig::new(8000, 2);
        let mut buffer = AudioBuffer::new(&config);
        buffer.channel_mut(0).fill(0.4);
        buffer.channel_mut(1).fill(0.2);

        let output_config = StreamConfig::new(8000, 1);
        let mut dest_storage = vec![0.0f32; 80];
        let mut dest: Vec<&mut [f32]> = vec![&mut dest_storage];
        let mut resamplers = vec![FrameResampler::new()];
        let mut scratch = Vec::new();
        buffer.copy_to_deinterleaved(&mut dest, &output_config, &mut resamplers, &mut scratch);
        for &sample in dest_storage.iter() {
            assert!((sample - 0.3).abs() < 1e-6);
        }
    }

    #[test]
    fn test_resampler_constant_signal() {
        let mut resampler = FrameResampler::new();
        let input = vec![0.5f32; 160];
        let mut output = vec![0.0f32; 480];
        resampler.resample(&input, &mut output);
        for &sample in &output {
            assert!((sample - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_resampler_exact_output_length() {
        let mut resampler = FrameResampler::new();
        let input: Vec<f32> = (0..441).map(|i| (i as f32 / 441.0).sin()).collect();
        let mut output = vec![0.0f32; 160];
        resampler.resample(&input, &mut output);
        assert_eq!(output.len(), 160);
        assert!(output.iter().all(|s| s.is_finite()));
    }
}
