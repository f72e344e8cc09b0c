use super::{frame_rms, safe_log10};
use crate::audio_buffer::AudioBuffer;

/// Output level estimation.
///
/// Reports the RMS of the fully processed capture signal on the [0, 127]
/// scale used by the statistics snapshot: 0 is full scale, 127 is mute.
#[derive(Debug)]
pub struct LevelEstimatorStage {
    rms_dbfs: i32,
}

impl LevelEstimatorStage {
    pub fn new() -> Self {
        Self { rms_dbfs: 127 }
    }

    pub fn reset(&mut self) {
        self.rms_dbfs = 127;
    }

    pub fn analyze(&mut self, audio: &AudioBuffer) {
        let mut rms = 0.0f32;
        for channel in audio.channels() {
            rms = rms.max(frame_rms(channel));
        }

        self.rms_dbfs = if rms > 1e-7 {
            (-20.0 * safe_log10(rms)).round().clamp(0.0, 127.0) as i32
        } else {
            127
        };
    }

    pub fn rms_dbfs(&self) -> i32 {
        self.rms_dbfs
    }
}

impl Default for LevelEstimatorStage {
    fn default() -> Self {
        Self::new()
    }
}
