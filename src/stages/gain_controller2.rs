use super::{frame_peak, frame_rms, safe_db_to_linear, safe_log10, validate_float, MIN_DB};
use crate::audio_buffer::AudioBuffer;
use crate::config::{GainController2, LevelEstimatorKind};

const ADAPTIVE_TARGET_DBFS: f32 = -18.0;
const ADAPTIVE_MAX_GAIN_DB: f32 = 24.0;
const LIMITER_THRESHOLD_DB: f32 = -1.0;

/// Next-generation gain control: fixed digital gain, an optional adaptive
/// digital stage, then a limiter.
#[derive(Debug)]
pub struct GainController2Stage {
    fixed_gain_db: f32,
    adaptive_enabled: bool,
    level_estimator: LevelEstimatorKind,

    sample_rate_hz: u32,
    adaptive_gain_db: f32,
    limiter_envelope_db: f32,
    limiter_release_coeff: f32,
}

impl GainController2Stage {
    pub fn new(config: &GainController2, sample_rate_hz: u32) -> Self {
        let mut stage = Self {
            fixed_gain_db: config.fixed_gain_db,
            adaptive_enabled: config.adaptive_digital.enabled,
            level_estimator: config.adaptive_digital.level_estimator,
            sample_rate_hz,
            adaptive_gain_db: 0.0,
            limiter_envelope_db: MIN_DB,
            limiter_release_coeff: 0.0,
        };
        stage.set_limiter_release(50.0);
        stage
    }

    fn set_limiter_release(&mut self, release_ms: f32) {
        self.limiter_release_coeff =
            (-1.0 / (release_ms * 0.001 * self.sample_rate_hz as f32)).exp();
    }

    pub fn initialize(&mut self, sample_rate_hz: u32) {
        self.sample_rate_hz = sample_rate_hz;
        self.set_limiter_release(50.0);
        self.reset();
    }

    pub fn reset(&mut self) {
        self.adaptive_gain_db = 0.0;
        self.limiter_envelope_db = MIN_DB;
    }

    /// Runtime update of the fixed gain; adaptive state is left alone.
    pub fn set_fixed_gain_db(&mut self, gain_db: f32) {
        self.fixed_gain_db = gain_db.clamp(0.0, 90.0);
    }

    pub fn process(&mut self, audio: &mut AudioBuffer) {
        if self.adaptive_enabled {
            self.adapt(audio);
        }

        let gain = safe_db_to_linear(self.fixed_gain_db + self.adaptive_gain_db);
        let threshold_db = LIMITER_THRESHOLD_DB;

        for channel in audio.channels_mut() {
            for sample in channel.iter_mut() {
                let amplified = validate_float(*sample * gain);
                let level = amplified.abs();
                let level_db = if level > 1e-10 {
                    20.0 * safe_log10(level)
                } else {
                    MIN_DB
                };

                let target = level_db.max(self.limiter_envelope_db);
                self.limiter_envelope_db = validate_float(
                    target + (self.limiter_envelope_db - target) * self.limiter_release_coeff,
                );

                let reduction_db = (self.limiter_envelope_db - threshold_db).clamp(0.0, 60.0);
                let limiter_gain = if self.limiter_envelope_db > threshold_db {
                    safe_db_to_linear(-reduction_db).min(1.0)
                } else {
                    1.0
                };
                *sample = validate_float(amplified * limiter_gain).clamp(-1.0, 1.0);
            }
        }
    }

    fn adapt(&mut self, audio: &AudioBuffer) {
        let mut level = 0.0f32;
        for channel in audio.channels() {
            let estimate = match self.level_estimator {
                LevelEstimatorKind::Rms => frame_rms(channel),
                LevelEstimatorKind::Peak => frame_peak(channel),
            };
            level = level.max(estimate);
        }
        let level_dbfs = if level > 1e-10 {
            20.0 * safe_log10(level)
        } else {
            MIN_DB
        };

        // Move slowly upward, back off faster; never below unity overall.
        if level_dbfs < ADAPTIVE_TARGET_DBFS - 6.0 && level_dbfs > -60.0 {
            self.adaptive_gain_db += 0.2;
        } else if level_dbfs > ADAPTIVE_TARGET_DBFS {
            self.adaptive_gain_db -= 0.8;
        }
        self.adaptive_gain_db = self.adaptive_gain_db.clamp(0.0, ADAPTIVE_MAX_GAIN_DB);
    }
}
