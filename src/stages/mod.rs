// Built-in processing stages
//
// Always-available stages of the capture chain, gated by configuration flags
// only. Each stage processes one 10 ms chunk at a time and keeps its own
// adaptive state, which a pipeline reinitialization resets.

pub mod echo_canceller;
pub mod echo_detector;
pub mod gain_controller;
pub mod gain_controller2;
pub mod high_pass_filter;
pub mod level_estimator;
pub mod noise_suppressor;
pub mod pre_amplifier;
pub mod voice_detector;

pub use echo_canceller::BuiltinEchoCanceller;
pub use echo_detector::DefaultEchoDetector;
pub use gain_controller::GainController1Stage;
pub use gain_controller2::GainController2Stage;
pub use high_pass_filter::HighPassFilterStage;
pub use level_estimator::LevelEstimatorStage;
pub use noise_suppressor::NoiseSuppressorStage;
pub use pre_amplifier::PreAmplifierStage;
pub use voice_detector::VoiceDetectorStage;

/// Audio stability constants for denormal protection
const DENORMAL_THRESHOLD: f32 = 1e-15;
const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = 40.0;
const MIN_LOG_INPUT: f32 = 1e-10;

/// Aggressive denormal protection for filter stability
#[inline]
fn flush_denormal(x: f32) -> f32 {
    let abs_x = x.abs();
    if abs_x < DENORMAL_THRESHOLD || !x.is_finite() {
        0.0
    } else if abs_x > 100.0 {
        // Clamp extreme values that could cause instability
        if x > 0.0 {
            100.0
        } else {
            -100.0
        }
    } else {
        x
    }
}

/// Safe logarithm with denormal protection
#[inline]
fn safe_log10(x: f32) -> f32 {
    if x > MIN_LOG_INPUT {
        x.log10()
    } else {
        MIN_LOG_INPUT.log10()
    }
}

/// Safe dB conversion with clamping
#[inline]
fn safe_db_to_linear(db: f32) -> f32 {
    let clamped_db = db.clamp(MIN_DB, MAX_DB);
    10.0_f32.powf(clamped_db / 20.0)
}

/// Clamp and validate floating point values
#[inline]
fn validate_float(x: f32) -> f32 {
    if x.is_finite() {
        flush_denormal(x)
    } else {
        0.0
    }
}

/// RMS of one channel's chunk.
fn frame_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|&s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Peak absolute sample of one channel's chunk.
fn frame_peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |peak, &s| peak.max(s.abs()))
}
