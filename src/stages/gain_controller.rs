use super::{frame_peak, frame_rms, safe_db_to_linear, safe_log10, validate_float, MIN_DB};
use crate::audio_buffer::AudioBuffer;
use crate::config::{GainControlMode, GainController1};

const CLIP_PEAK: f32 = 0.99;
const ADAPTIVE_DIGITAL_MAX_GAIN_DB: f32 = 30.0;

/// First-generation gain control.
///
/// Brings the capture signal to the target envelope with a digital
/// compression stage; in analog mode it additionally prescribes an analog
/// level for the capture device through the feedback loop the orchestrator
/// runs each frame.
#[derive(Debug)]
pub struct GainController1Stage {
    mode: GainControlMode,
    target_level_dbfs: i32,
    compression_gain_db: f32,
    enable_limiter: bool,
    level_minimum: i32,
    level_maximum: i32,

    sample_rate_hz: u32,
    envelope_db: f32,
    attack_coeff: f32,
    release_coeff: f32,
    adaptive_gain_db: f32,
    recommended_level: Option<i32>,
}

impl GainController1Stage {
    pub fn new(config: &GainController1, sample_rate_hz: u32) -> Self {
        let mut stage = Self {
            mode: config.mode,
            target_level_dbfs: config.target_level_dbfs,
            compression_gain_db: config.compression_gain_db as f32,
            enable_limiter: config.enable_limiter,
            level_minimum: config.analog_level_minimum,
            level_maximum: config.analog_level_maximum,
            sample_rate_hz,
            envelope_db: MIN_DB,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            adaptive_gain_db: 0.0,
            recommended_level: None,
        };
        stage.set_time_constants(10.0, 200.0);
        stage
    }

    fn set_time_constants(&mut self, attack_ms: f32, release_ms: f32) {
        self.attack_coeff = (-1.0 / (attack_ms * 0.001 * self.sample_rate_hz as f32)).exp();
        self.release_coeff = (-1.0 / (release_ms * 0.001 * self.sample_rate_hz as f32)).exp();
    }

    pub fn initialize(&mut self, sample_rate_hz: u32) {
        self.sample_rate_hz = sample_rate_hz;
        self.set_time_constants(10.0, 200.0);
        self.reset();
    }

    pub fn reset(&mut self) {
        self.envelope_db = MIN_DB;
        self.adaptive_gain_db = 0.0;
        self.recommended_level = None;
    }

    /// Runtime update; does not touch the envelope or analog state.
    pub fn set_compression_gain_db(&mut self, gain_db: i32) {
        self.compression_gain_db = gain_db as f32;
    }

    pub fn uses_analog_mode(&self) -> bool {
        self.mode == GainControlMode::AdaptiveAnalog
    }

    /// Processes one frame. `analog_level` is the device level supplied by
    /// the caller (analog mode only). Returns the recommended analog level,
    /// already clamped into the configured bounds.
    pub fn process(&mut self, audio: &mut AudioBuffer, analog_level: Option<i32>) -> Option<i32> {
        let (peak, rms) = self.frame_levels(audio);

        if self.mode == GainControlMode::AdaptiveDigital {
            self.adapt_digital_gain(rms);
        }
        self.apply_digital_gain(audio);

        if self.mode == GainControlMode::AdaptiveAnalog {
            self.adapt_analog_level(peak, rms, analog_level);
            self.recommended_level
        } else {
            None
        }
    }

    fn frame_levels(&self, audio: &AudioBuffer) -> (f32, f32) {
        let mut peak = 0.0f32;
        let mut rms = 0.0f32;
        for channel in audio.channels() {
            peak = peak.max(frame_peak(channel));
            rms = rms.max(frame_rms(channel));
        }
        (peak, rms)
    }

    /// Digital stage: fixed/adaptive gain plus compression above the target
    /// level, with an optional hard limit at the target.
    fn apply_digital_gain(&mut self, audio: &mut AudioBuffer) {
        let makeup_db = self.compression_gain_db + self.adaptive_gain_db;
        let makeup = safe_db_to_linear(makeup_db);
        let threshold_db = -(self.target_level_dbfs as f32);

        for channel in audio.channels_mut() {
            for sample in channel.iter_mut() {
                let amplified = validate_float(*sample * makeup);
                let level = amplified.abs();
                let level_db = if level > 1e-10 {
                    20.0 * safe_log10(level)
                } else {
                    MIN_DB
                };

                let coeff = if level_db > self.envelope_db {
                    self.attack_coeff
                } else {
                    self.release_coeff
                };
                self.envelope_db =
                    validate_float(level_db + (self.envelope_db - level_db) * coeff);

                let reduction_db = if self.envelope_db > threshold_db {
                    if self.enable_limiter {
                        self.envelope_db - threshold_db
                    } else {
                        // Compress at 4:1 above the target instead of limiting.
                        (self.envelope_db - threshold_db) * 0.75
                    }
                } else {
                    0.0
                };

                let gain = safe_db_to_linear(-reduction_db.clamp(0.0, 60.0));
                *sample = validate_float(amplified * gain).clamp(-1.0, 1.0);
            }
        }
    }

    /// Analog loop: back off immediately on clipping, creep up while the
    /// signal stays well below target. Steps are relative to the level the
    /// device actually reports, so a caller that ignored the previous
    /// recommendation is not fought by the loop.
    fn adapt_analog_level(&mut self, peak: f32, rms: f32, analog_level: Option<i32>) {
        let range = (self.level_maximum - self.level_minimum).max(1);
        let current = analog_level
            .or(self.recommended_level)
            .unwrap_or(self.level_minimum + range / 2);

        let rms_dbfs = if rms > 1e-10 {
            20.0 * safe_log10(rms)
        } else {
            MIN_DB
        };
        let target_db = -(self.target_level_dbfs as f32);

        let step = (range / 16).max(1);
        let next = if peak >= CLIP_PEAK {
            current - step
        } else if rms_dbfs < target_db - 10.0 {
            current + (step / 2).max(1)
        } else if rms_dbfs > target_db + 3.0 {
            current - (step / 2).max(1)
        } else {
            current
        };

        self.recommended_level = Some(next.clamp(self.level_minimum, self.level_maximum));
    }

    /// Digital substitute for the analog prescription, bounded so the gain
    /// cannot run away on silence.
    fn adapt_digital_gain(&mut self, rms: f32) {
        let rms_dbfs = if rms > 1e-10 {
            20.0 * safe_log10(rms)
        } else {
            MIN_DB
        };
        let target_db = -(self.target_level_dbfs as f32);

        if rms_dbfs < target_db - 10.0 && rms_dbfs > -60.0 {
            self.adaptive_gain_db += 0.3;
        } else if rms_dbfs > target_db {
            self.adaptive_gain_db -= 1.0;
        }
        self.adaptive_gain_db = self.adaptive_gain_db.clamp(0.0, ADAPTIVE_DIGITAL_MAX_GAIN_DB);
    }
}
