use super::{frame_rms, safe_log10, MIN_DB};
use crate::audio_buffer::AudioBuffer;

const HANGOVER_FRAMES: u32 = 8;

/// Energy-based voice activity detection with an adaptive noise floor and a
/// short hangover so word tails are not chopped.
#[derive(Debug)]
pub struct VoiceDetectorStage {
    noise_floor_db: f32,
    hangover: u32,
    voice_detected: bool,
}

impl VoiceDetectorStage {
    pub fn new() -> Self {
        Self {
            noise_floor_db: -65.0,
            hangover: 0,
            voice_detected: false,
        }
    }

    pub fn reset(&mut self) {
        self.noise_floor_db = -65.0;
        self.hangover = 0;
        self.voice_detected = false;
    }

    pub fn analyze(&mut self, audio: &AudioBuffer) -> bool {
        let mut rms = 0.0f32;
        for channel in audio.channels() {
            rms = rms.max(frame_rms(channel));
        }
        let rms_db = if rms > 1e-10 {
            20.0 * safe_log10(rms)
        } else {
            MIN_DB
        };

        // Track the floor downward quickly, upward slowly.
        if rms_db < self.noise_floor_db {
            self.noise_floor_db += 0.5 * (rms_db - self.noise_floor_db);
        } else {
            self.noise_floor_db += 0.005 * (rms_db - self.noise_floor_db);
        }
        self.noise_floor_db = self.noise_floor_db.clamp(MIN_DB, -20.0);

        let active = rms_db > self.noise_floor_db + 9.0 && rms_db > -55.0;
        if active {
            self.hangover = HANGOVER_FRAMES;
        } else if self.hangover > 0 {
            self.hangover -= 1;
        }

        self.voice_detected = active || self.hangover > 0;
        self.voice_detected
    }

    pub fn voice_detected(&self) -> bool {
        self.voice_detected
    }
}

impl Default for VoiceDetectorStage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_config::StreamConfig;

    #[test]
    fn test_silence_is_not_voice() {
        let mut vad = VoiceDetectorStage::new();
        let audio = AudioBuffer::new(&StreamConfig::new(16000, 1));
        for _ in 0..20 {
            vad.analyze(&audio);
        }
        assert!(!vad.voice_detected());
    }

    #[test]
    fn test_tone_after_silence_is_voice() {
        let mut vad = VoiceDetectorStage::new();
        let mut audio = AudioBuffer::new(&StreamConfig::new(16000, 1));

        for _ in 0..30 {
            audio.channel_mut(0).fill(0.0);
            vad.analyze(&audio);
        }
        for (i, sample) in audio.channel_mut(0).iter_mut().enumerate() {
            *sample = (2.0 * std::f32::consts::PI * 300.0 * i as f32 / 16000.0).sin() * 0.4;
        }
        assert!(vad.analyze(&audio));
    }
}
