// Statistics surface
//
// A snapshot struct refreshed after each capture frame, plus the explicit
// per-call metrics collector that replaces implicit process-global counters.
// The collector is reset at call boundaries by the no-arg initialize().

use serde::Serialize;

/// Statistics refreshed after every processed capture frame.
///
/// Fields are None while their producing stage is disabled. When
/// `has_remote_tracks` is false, echo-related fields are withheld because
/// they only make sense with at least one remote track.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AudioProcessingStats {
    /// RMS of the output signal in [0, 127], where 0 is full scale and 127
    /// is muted, per the level-estimation stage.
    pub output_rms_dbfs: Option<i32>,
    /// Voice-activity decision for the last frame.
    pub voice_detected: Option<bool>,
    /// Residual echo likelihood in [0, 1].
    pub residual_echo_likelihood: Option<f64>,
    /// Recent maximum of the residual echo likelihood.
    pub residual_echo_likelihood_recent_max: Option<f64>,
    /// Delay applied to the last capture frame, when one was set.
    pub delay_ms: Option<i32>,
}

/// Per-call metrics, owned by the orchestrator and reset explicitly at call
/// boundaries instead of living in process-global state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CallMetrics {
    pub capture_frames_processed: u64,
    pub render_frames_processed: u64,
    /// Frames whose int16 input hit full scale on at least one sample.
    pub clipped_capture_frames: u64,
    /// Geometry reconciliations triggered implicitly by frame parameters.
    pub implicit_reinitializations: u64,
    /// Runtime settings applied on the capture path.
    pub capture_settings_applied: u64,
    /// Runtime settings applied on the render path.
    pub render_settings_applied: u64,
}

impl CallMetrics {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_counters() {
        let mut metrics = CallMetrics {
            capture_frames_processed: 10,
            render_frames_processed: 9,
            clipped_capture_frames: 1,
            implicit_reinitializations: 2,
            capture_settings_applied: 3,
            render_settings_applied: 4,
        };
        metrics.reset();
        assert_eq!(metrics, CallMetrics::default());
    }
}
