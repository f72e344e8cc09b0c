use super::{flush_denormal, validate_float};
use crate::audio_buffer::AudioBuffer;

const CUTOFF_HZ: f32 = 50.0;
const Q: f32 = 0.707;

/// Biquad IIR high-pass section.
#[derive(Debug, Clone)]
struct Biquad {
    a0: f32,
    a1: f32,
    a2: f32,
    b1: f32,
    b2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    fn high_pass(sample_rate: u32, freq: f32, q: f32) -> Self {
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate as f32;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let b0 = (1.0 + cos_w0) / 2.0;
        let b1 = -(1.0 + cos_w0);
        let b2 = (1.0 + cos_w0) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self {
            a0: b0 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let input_safe = validate_float(input);
        let output = self.a0 * input_safe + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;

        self.x2 = flush_denormal(self.x1);
        self.x1 = input_safe;
        self.y2 = flush_denormal(self.y1);
        self.y1 = validate_float(output);

        validate_float(output)
    }

    fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// DC and low-rumble removal ahead of the adaptive stages, one biquad per
/// channel.
#[derive(Debug)]
pub struct HighPassFilterStage {
    filters: Vec<Biquad>,
}

impl HighPassFilterStage {
    pub fn new(sample_rate_hz: u32, num_channels: usize) -> Self {
        Self {
            filters: vec![Biquad::high_pass(sample_rate_hz, CUTOFF_HZ, Q); num_channels],
        }
    }

    pub fn initialize(&mut self, sample_rate_hz: u32, num_channels: usize) {
        self.filters = vec![Biquad::high_pass(sample_rate_hz, CUTOFF_HZ, Q); num_channels];
    }

    pub fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }

    pub fn process(&mut self, audio: &mut AudioBuffer) {
        for (channel, filter) in audio.channels_mut().iter_mut().zip(&mut self.filters) {
            for sample in channel.iter_mut() {
                *sample = filter.process(*sample);
            }
        }
    }
}
