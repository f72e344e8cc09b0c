// Pipeline configuration tree
//
// One nested struct per stage, each with an `enabled` flag plus its own
// parameters, and a handful of pipeline-wide knobs. Applying a config is a
// whole-object replace, never a merge; a config that fails range validation
// is rejected without touching the active one.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Pipeline-wide knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Maximum allowed internal processing rate. Only 32000 and 48000 are
    /// meaningful; any other value is treated as 48000.
    pub maximum_internal_processing_rate: u32,
    /// Force multi-channel processing on playout and capture audio.
    /// Experimental and likely to change.
    pub experimental_multi_channel: bool,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            maximum_internal_processing_rate: 48000,
            experimental_multi_channel: false,
        }
    }
}

impl Pipeline {
    /// Effective processing-rate cap after the 32k/48k coercion rule.
    pub fn effective_max_rate(&self) -> u32 {
        if self.maximum_internal_processing_rate == 32000 {
            32000
        } else {
            48000
        }
    }
}

/// Amplifies the capture signal before any other processing is done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreAmplifier {
    pub enabled: bool,
    pub fixed_gain_factor: f32,
}

impl Default for PreAmplifier {
    fn default() -> Self {
        Self {
            enabled: false,
            fixed_gain_factor: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HighPassFilter {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EchoCanceller {
    pub enabled: bool,
    /// Lighter-weight mode that tolerates a missing stream delay.
    pub mobile_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoiseSuppressionLevel {
    Low,
    Moderate,
    High,
    VeryHigh,
}

/// Background noise suppression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseSuppression {
    pub enabled: bool,
    pub level: NoiseSuppressionLevel,
}

impl Default for NoiseSuppression {
    fn default() -> Self {
        Self {
            enabled: false,
            level: NoiseSuppressionLevel::Moderate,
        }
    }
}

/// Enables reporting of `voice_detected` in the statistics snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VoiceDetection {
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GainControlMode {
    /// Prescribes an analog gain for the capture device plus a digital
    /// compression stage. Requires the analog-level feedback loop.
    AdaptiveAnalog,
    /// Like the analog mode but the adaptive scaling happens in the digital
    /// domain; no device coupling required.
    AdaptiveDigital,
    /// Only the digital compression stage, with a fixed gain.
    FixedDigital,
}

/// First-generation gain control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainController1 {
    pub enabled: bool,
    pub mode: GainControlMode,
    /// Target peak level in -dBFS (positive convention). Limited to [0, 31].
    pub target_level_dbfs: i32,
    /// Maximum gain the compression stage may apply, in dB. Limited to [0, 90].
    /// For updates after setup, use a RuntimeSetting instead.
    pub compression_gain_db: i32,
    /// Hard-limit the compressed signal to the target level.
    pub enable_limiter: bool,
    /// Analog level range of the capture device. Limited to [0, 65535].
    pub analog_level_minimum: i32,
    pub analog_level_maximum: i32,
}

impl Default for GainController1 {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: GainControlMode::AdaptiveAnalog,
            target_level_dbfs: 3,
            compression_gain_db: 9,
            enable_limiter: true,
            analog_level_minimum: 0,
            analog_level_maximum: 255,
        }
    }
}

impl GainController1 {
    pub fn uses_analog_mode(&self) -> bool {
        self.enabled && self.mode == GainControlMode::AdaptiveAnalog
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelEstimatorKind {
    Rms,
    Peak,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveDigital {
    pub enabled: bool,
    pub level_estimator: LevelEstimatorKind,
}

impl Default for AdaptiveDigital {
    fn default() -> Self {
        Self {
            enabled: false,
            level_estimator: LevelEstimatorKind::Rms,
        }
    }
}

/// Next-generation gain control: fixed digital gain, optional adaptive
/// digital stage, then a limiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainController2 {
    pub enabled: bool,
    /// Fixed gain applied before the limiter, in dB. Limited to [0, 90].
    pub fixed_gain_db: f32,
    pub adaptive_digital: AdaptiveDigital,
}

impl Default for GainController2 {
    fn default() -> Self {
        Self {
            enabled: false,
            fixed_gain_db: 0.0,
            adaptive_digital: AdaptiveDigital::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidualEchoDetector {
    pub enabled: bool,
}

impl Default for ResidualEchoDetector {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Enables reporting of `output_rms_dbfs` in the statistics snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LevelEstimation {
    pub enabled: bool,
}

/// The whole configuration surface of the pipeline.
///
/// Intended for setup-time use; flipping flags mid-stream resets the affected
/// stage's adaptive state. Use `RuntimeSetting` for hot-path parameter
/// changes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    pub pipeline: Pipeline,
    pub pre_amplifier: PreAmplifier,
    pub high_pass_filter: HighPassFilter,
    pub echo_canceller: EchoCanceller,
    pub noise_suppression: NoiseSuppression,
    pub voice_detection: VoiceDetection,
    pub gain_controller1: GainController1,
    pub gain_controller2: GainController2,
    pub residual_echo_detector: ResidualEchoDetector,
    pub level_estimation: LevelEstimation,
}

impl Config {
    /// Range-checks every numeric parameter. A failing config must be
    /// rejected as a whole; callers never apply it partially.
    pub fn validate(&self) -> Result<()> {
        if self.pre_amplifier.enabled && self.pre_amplifier.fixed_gain_factor < 1.0 {
            return Err(Error::BadParameter(format!(
                "pre-amplifier gain must be >= 1.0, got {}",
                self.pre_amplifier.fixed_gain_factor
            )));
        }

        let agc1 = &self.gain_controller1;
        if !(0..=31).contains(&agc1.target_level_dbfs) {
            return Err(Error::BadParameter(format!(
                "AGC1 target level must be in [0, 31] dBFS, got {}",
                agc1.target_level_dbfs
            )));
        }
        if !(0..=90).contains(&agc1.compression_gain_db) {
            return Err(Error::BadParameter(format!(
                "AGC1 compression gain must be in [0, 90] dB, got {}",
                agc1.compression_gain_db
            )));
        }
        for level in [agc1.analog_level_minimum, agc1.analog_level_maximum] {
            if !(0..=65535).contains(&level) {
                return Err(Error::BadParameter(format!(
                    "analog level bound must be in [0, 65535], got {level}"
                )));
            }
        }
        if agc1.analog_level_minimum >= agc1.analog_level_maximum {
            return Err(Error::BadParameter(format!(
                "analog level minimum {} must be below maximum {}",
                agc1.analog_level_minimum, agc1.analog_level_maximum
            )));
        }

        let agc2 = &self.gain_controller2;
        if !(0.0..=90.0).contains(&agc2.fixed_gain_db) || !agc2.fixed_gain_db.is_finite() {
            return Err(Error::BadParameter(format!(
                "AGC2 fixed gain must be in [0, 90] dB, got {}",
                agc2.fixed_gain_db
            )));
        }

        Ok(())
    }

    /// JSON rendering of the effective config, for logs and dumps.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "<unserializable config>".into())
    }
}
