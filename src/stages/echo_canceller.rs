use super::{frame_rms, validate_float};
use crate::audio_buffer::{AudioBuffer, FrameResampler};
use crate::submodule::EchoControl;

const MAX_DELAY_MS: u32 = 500;
const FILTER_TAPS: usize = 64;
const NLMS_STEP: f32 = 0.5;
const NLMS_EPS: f32 = 1e-6;
const MOBILE_SUPPRESSION_GAIN: f32 = 0.25;

/// Built-in echo-control engine.
///
/// Keeps a mono render reference aligned by the reported stream delay and
/// runs a short NLMS filter per capture channel. Mobile mode skips the
/// adaptive filter and applies render-gated suppression instead, which also
/// tolerates a missing delay report.
#[derive(Debug)]
pub struct BuiltinEchoCanceller {
    mobile_mode: bool,
    sample_rate_hz: u32,
    render_rate_hz: u32,

    // Render reference ring, downmixed to mono at the capture rate.
    reference: Vec<f32>,
    total_written: u64,
    resampler: FrameResampler,
    downmix: Vec<f32>,
    resampled: Vec<f32>,

    filters: Vec<Vec<f32>>,
    render_activity: f32,
    mobile_gain: f32,
}

impl BuiltinEchoCanceller {
    pub fn new(
        mobile_mode: bool,
        sample_rate_hz: u32,
        render_sample_rate_hz: u32,
        num_capture_channels: usize,
    ) -> Self {
        let capacity = ((MAX_DELAY_MS + 20) * sample_rate_hz / 1000) as usize;
        Self {
            mobile_mode,
            sample_rate_hz,
            render_rate_hz: render_sample_rate_hz,
            reference: vec![0.0; capacity],
            total_written: 0,
            resampler: FrameResampler::new(),
            downmix: Vec::new(),
            resampled: Vec::new(),
            filters: vec![vec![0.0; FILTER_TAPS]; num_capture_channels],
            render_activity: 0.0,
            mobile_gain: 1.0,
        }
    }

    pub fn reset(&mut self) {
        self.reference.fill(0.0);
        self.total_written = 0;
        self.resampler.reset();
        for filter in &mut self.filters {
            filter.fill(0.0);
        }
        self.render_activity = 0.0;
        self.mobile_gain = 1.0;
    }

    fn push_reference(&mut self, samples: &[f32]) {
        let capacity = self.reference.len();
        for &sample in samples {
            let index = (self.total_written % capacity as u64) as usize;
            self.reference[index] = sample;
            self.total_written += 1;
        }
    }

}

/// Reference sample `age` positions behind the newest written sample.
fn reference_at(reference: &[f32], total_written: u64, age: u64) -> f32 {
    if age >= total_written || age >= reference.len() as u64 {
        return 0.0;
    }
    let position = total_written - 1 - age;
    reference[(position % reference.len() as u64) as usize]
}

fn cancel_channel(
    filter: &mut [f32],
    reference: &[f32],
    total_written: u64,
    channel: &mut [f32],
    delay_samples: u64,
) {
    let frame_len = channel.len() as u64;
    for i in 0..channel.len() {
        // Age of the reference sample matching capture sample i.
        let base_age = delay_samples + frame_len - 1 - i as u64;

        let mut estimate = 0.0f32;
        let mut ref_energy = NLMS_EPS;
        for (k, &w) in filter.iter().enumerate() {
            let x = reference_at(reference, total_written, base_age + k as u64);
            estimate += w * x;
            ref_energy += x * x;
        }

        let desired = channel[i];
        let error = validate_float(desired - estimate);
        channel[i] = error;

        let step = NLMS_STEP * error / ref_energy;
        for (k, w) in filter.iter_mut().enumerate() {
            let x = reference_at(reference, total_written, base_age + k as u64);
            *w = validate_float(*w + step * x);
        }
    }
}

impl EchoControl for BuiltinEchoCanceller {
    fn analyze_render(&mut self, render: &mut AudioBuffer) {
        // Downmix to mono.
        self.downmix.clear();
        self.downmix.resize(render.num_frames(), 0.0);
        let scale = 1.0 / render.num_channels().max(1) as f32;
        for channel in render.channels() {
            for (acc, &sample) in self.downmix.iter_mut().zip(channel.iter()) {
                *acc += sample * scale;
            }
        }

        self.render_activity = 0.9 * self.render_activity + 0.1 * frame_rms(&self.downmix);

        if self.render_rate_hz != self.sample_rate_hz {
            let out_len = (self.sample_rate_hz / 100) as usize;
            self.resampled.resize(out_len, 0.0);
            let mut resampled = std::mem::take(&mut self.resampled);
            self.resampler.resample(&self.downmix, &mut resampled);
            self.push_reference(&resampled);
            self.resampled = resampled;
        } else {
            let downmix = std::mem::take(&mut self.downmix);
            self.push_reference(&downmix);
            self.downmix = downmix;
        }
    }

    fn analyze_capture(&mut self, _capture: &AudioBuffer) {}

    fn process_capture(&mut self, capture: &mut AudioBuffer, stream_delay_ms: Option<i32>) {
        if self.mobile_mode {
            // Gate the capture signal while the far end is active.
            let target = if self.render_activity > 0.005 {
                MOBILE_SUPPRESSION_GAIN
            } else {
                1.0
            };
            self.mobile_gain += 0.3 * (target - self.mobile_gain);
            let gain = self.mobile_gain;
            for channel in capture.channels_mut() {
                for sample in channel.iter_mut() {
                    *sample = validate_float(*sample * gain);
                }
            }
            return;
        }

        let delay_ms = stream_delay_ms.unwrap_or(0).clamp(0, MAX_DELAY_MS as i32) as u64;
        let delay_samples = delay_ms * self.sample_rate_hz as u64 / 1000;

        let reference = &self.reference;
        let total_written = self.total_written;
        for (filter, channel) in self.filters.iter_mut().zip(capture.channels_mut()) {
            cancel_channel(filter, reference, total_written, channel, delay_samples);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_config::StreamConfig;

    fn tone(buffer: &mut AudioBuffer, chunk: usize, freq: f32, amplitude: f32) {
        let rate = buffer.sample_rate_hz() as f32;
        let frames = buffer.num_frames();
        for ch in 0..buffer.num_channels() {
            for (i, sample) in buffer.channel_mut(ch).iter_mut().enumerate() {
                let n = (chunk * frames + i) as f32;
                *sample = (2.0 * std::f32::consts::PI * freq * n / rate).sin() * amplitude;
            }
        }
    }

    #[test]
    fn test_converges_on_zero_delay_echo() {
        let config = StreamConfig::new(8000, 1);
        let mut canceller = BuiltinEchoCanceller::new(false, 8000, 8000, 1);

        let mut render = AudioBuffer::new(&config);
        let mut capture = AudioBuffer::new(&config);

        let mut residual = f32::MAX;
        let mut initial = 0.0f32;
        for chunk in 0..200 {
            tone(&mut render, chunk, 440.0, 0.5);
            canceller.analyze_render(&mut render);

            // Capture is a pure scaled copy of the render signal.
            for (dst, &src) in capture
                .channel_mut(0)
                .iter_mut()
                .zip(render.channel(0).iter())
            {
                *dst = src * 0.5;
            }
            canceller.process_capture(&mut capture, Some(0));
            residual = capture.channel(0).iter().map(|s| s * s).sum();
            if chunk == 0 {
                initial = residual.max(1e-9);
            }
        }
        assert!(
            residual < initial * 0.5,
            "NLMS did not reduce the echo: {residual} vs {initial}"
        );
    }

    #[test]
    fn test_mobile_mode_attenuates_during_far_end_activity() {
        let config = StreamConfig::new(8000, 1);
        let mut canceller = BuiltinEchoCanceller::new(true, 8000, 8000, 1);

        let mut render = AudioBuffer::new(&config);
        let mut capture = AudioBuffer::new(&config);

        let mut out_rms = 1.0f32;
        for chunk in 0..100 {
            tone(&mut render, chunk, 440.0, 0.5);
            canceller.analyze_render(&mut render);
            capture.channel_mut(0).fill(0.3);
            canceller.process_capture(&mut capture, None);
            out_rms = frame_rms(capture.channel(0));
        }
        assert!(out_rms < 0.3 * 0.5, "mobile mode did not suppress: {out_rms}");
    }
}
