use super::validate_float;
use crate::audio_buffer::AudioBuffer;

/// Fixed-gain amplification applied before any other capture processing.
#[derive(Debug)]
pub struct PreAmplifierStage {
    gain_factor: f32,
}

impl PreAmplifierStage {
    pub fn new(gain_factor: f32) -> Self {
        Self {
            gain_factor: gain_factor.max(1.0),
        }
    }

    /// Attenuation is not allowed; values below 1.0 are pinned to unity.
    pub fn set_gain_factor(&mut self, gain_factor: f32) {
        self.gain_factor = if gain_factor.is_finite() {
            gain_factor.max(1.0)
        } else {
            1.0
        };
    }

    pub fn gain_factor(&self) -> f32 {
        self.gain_factor
    }

    pub fn process(&mut self, audio: &mut AudioBuffer) {
        if self.gain_factor == 1.0 {
            return;
        }
        for channel in audio.channels_mut() {
            for sample in channel.iter_mut() {
                *sample = validate_float(*sample * self.gain_factor).clamp(-1.0, 1.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_config::StreamConfig;

    #[test]
    fn test_applies_gain() {
        let mut stage = PreAmplifierStage::new(2.0);
        let mut audio = AudioBuffer::new(&StreamConfig::new(8000, 1));
        audio.channel_mut(0).fill(0.25);
        stage.process(&mut audio);
        assert!(audio.channel(0).iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_rejects_attenuation() {
        let mut stage = PreAmplifierStage::new(2.0);
        stage.set_gain_factor(0.1);
        assert_eq!(stage.gain_factor(), 1.0);
    }

    #[test]
    fn test_saturates_at_full_scale() {
        let mut stage = PreAmplifierStage::new(10.0);
        let mut audio = AudioBuffer::new(&StreamConfig::new(8000, 1));
        audio.channel_mut(0).fill(0.5);
        stage.process(&mut audio);
        assert!(audio.channel(0).iter().all(|&s| s <= 1.0));
    }
}
