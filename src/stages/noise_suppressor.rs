use super::{frame_rms, safe_db_to_linear, validate_float};
use crate::audio_buffer::AudioBuffer;
use crate::config::NoiseSuppressionLevel;

/// Per-channel adaptive state.
#[derive(Debug, Clone)]
struct ChannelState {
    noise_rms: f32,
    gain: f32,
}

impl ChannelState {
    fn new() -> Self {
        Self {
            noise_rms: 1e-4,
            gain: 1.0,
        }
    }
}

/// Background noise suppression.
///
/// Tracks a per-channel noise floor and applies a frame-wise attenuation that
/// deepens as the signal approaches the floor. The applied gain never exceeds
/// unity, so suppression cannot amplify.
#[derive(Debug)]
pub struct NoiseSuppressorStage {
    max_attenuation_db: f32,
    channels: Vec<ChannelState>,
}

impl NoiseSuppressorStage {
    pub fn new(level: NoiseSuppressionLevel, num_channels: usize) -> Self {
        Self {
            max_attenuation_db: Self::attenuation_for(level),
            channels: vec![ChannelState::new(); num_channels],
        }
    }

    fn attenuation_for(level: NoiseSuppressionLevel) -> f32 {
        match level {
            NoiseSuppressionLevel::Low => 6.0,
            NoiseSuppressionLevel::Moderate => 12.0,
            NoiseSuppressionLevel::High => 18.0,
            NoiseSuppressionLevel::VeryHigh => 21.0,
        }
    }

    pub fn set_level(&mut self, level: NoiseSuppressionLevel) {
        self.max_attenuation_db = Self::attenuation_for(level);
    }

    pub fn initialize(&mut self, num_channels: usize) {
        self.channels = vec![ChannelState::new(); num_channels];
    }

    pub fn reset(&mut self) {
        let count = self.channels.len();
        self.initialize(count);
    }

    pub fn process(&mut self, audio: &mut AudioBuffer) {
        for (channel, state) in audio.channels_mut().iter_mut().zip(&mut self.channels) {
            let rms = frame_rms(channel);

            // Minimum-statistics style floor: drop fast, recover slowly.
            if rms < state.noise_rms {
                state.noise_rms += 0.3 * (rms - state.noise_rms);
            } else {
                state.noise_rms += 0.002 * (rms - state.noise_rms);
            }
            state.noise_rms = state.noise_rms.max(1e-6);

            let snr = rms / state.noise_rms;
            // Full attenuation at the floor, none from ~12 dB SNR upward.
            let weight = (1.0 - (snr - 1.0) / 3.0).clamp(0.0, 1.0);
            let target_gain = safe_db_to_linear(-self.max_attenuation_db * weight).min(1.0);

            for sample in channel.iter_mut() {
                // Smooth toward the target so chunk boundaries stay click-free.
                state.gain += 0.01 * (target_gain - state.gain);
                *sample = validate_float(*sample * state.gain.min(1.0));
            }
        }
    }
}
