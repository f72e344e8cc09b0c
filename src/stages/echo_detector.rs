use super::frame_rms;
use crate::submodule::{EchoDetector, EchoDetectorMetrics};

const RENDER_HISTORY_FRAMES: usize = 128;
const CORRELATION_WINDOW: usize = 32;
const MAX_LAG_FRAMES: usize = 64;
const RECENT_MAX_DECAY: f64 = 0.995;

/// Default residual echo detector.
///
/// Correlates the recent capture frame-energy sequence against lagged render
/// frame energies; a strong match at some lag means far-end audio is leaking
/// back in. Likelihood is the best normalized correlation across lags.
#[derive(Debug)]
pub struct DefaultEchoDetector {
    render_energies: Vec<f32>,
    capture_energies: Vec<f32>,
    likelihood: f64,
    recent_max: f64,
}

impl DefaultEchoDetector {
    pub fn new() -> Self {
        Self {
            render_energies: Vec::with_capacity(RENDER_HISTORY_FRAMES),
            capture_energies: Vec::with_capacity(CORRELATION_WINDOW),
            likelihood: 0.0,
            recent_max: 0.0,
        }
    }

    fn update_likelihood(&mut self) {
        if self.capture_energies.len() < CORRELATION_WINDOW {
            return;
        }
        let capture = &self.capture_energies[self.capture_energies.len() - CORRELATION_WINDOW..];

        let mut best = 0.0f64;
        let available = self.render_energies.len();
        for lag in 0..MAX_LAG_FRAMES {
            if lag + CORRELATION_WINDOW > available {
                break;
            }
            let start = available - lag - CORRELATION_WINDOW;
            let render = &self.render_energies[start..start + CORRELATION_WINDOW];
            best = best.max(normalized_correlation(capture, render));
        }

        self.likelihood = best.clamp(0.0, 1.0);
        self.recent_max = (self.recent_max * RECENT_MAX_DECAY).max(self.likelihood);
    }
}

fn normalized_correlation(a: &[f32], b: &[f32]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().map(|&x| x as f64).sum::<f64>() / n;
    let mean_b = b.iter().map(|&x| x as f64).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let da = x as f64 - mean_a;
        let db = y as f64 - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a < 1e-12 || var_b < 1e-12 {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

impl Default for DefaultEchoDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl EchoDetector for DefaultEchoDetector {
    fn initialize(
        &mut self,
        _capture_sample_rate_hz: u32,
        _num_capture_channels: usize,
        _render_sample_rate_hz: u32,
        _num_render_channels: usize,
    ) {
        self.render_energies.clear();
        self.capture_energies.clear();
        self.likelihood = 0.0;
        self.recent_max = 0.0;
    }

    fn analyze_render_audio(&mut self, render_audio: &[f32]) {
        if self.render_energies.len() == RENDER_HISTORY_FRAMES {
            self.render_energies.remove(0);
        }
        self.render_energies.push(frame_rms(render_audio));
    }

    fn analyze_capture_audio(&mut self, capture_audio: &[f32]) {
        if self.capture_energies.len() == CORRELATION_WINDOW {
            self.capture_energies.remove(0);
        }
        self.capture_energies.push(frame_rms(capture_audio));
        self.update_likelihood();
    }

    fn metrics(&self) -> EchoDetectorMetrics {
        EchoDetectorMetrics {
            echo_likelihood: self.likelihood,
            echo_likelihood_recent_max: self.recent_max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(level: f32) -> Vec<f32> {
        vec![level; 160]
    }

    #[test]
    fn test_metrics_start_at_zero() {
        let detector = DefaultEchoDetector::new();
        let metrics = detector.metrics();
        assert_eq!(metrics.echo_likelihood, 0.0);
        assert_eq!(metrics.echo_likelihood_recent_max, 0.0);
    }

    #[test]
    fn test_detects_copied_render_in_capture() {
        let mut detector = DefaultEchoDetector::new();
        detector.initialize(16000, 1, 16000, 1);

        // Capture mirrors the render modulation exactly: strong correlation.
        for i in 0..100 {
            let level = if (i / 5) % 2 == 0 { 0.5 } else { 0.05 };
            detector.analyze_render_audio(&frame(level));
            detector.analyze_capture_audio(&frame(level * 0.5));
        }
        assert!(
            detector.metrics().echo_likelihood > 0.9,
            "likelihood {}",
            detector.metrics().echo_likelihood
        );
    }

    #[test]
    fn test_uncorrelated_capture_scores_low() {
        let mut detector = DefaultEchoDetector::new();
        detector.initialize(16000, 1, 16000, 1);

        for i in 0..100 {
            let render_level = if (i / 5) % 2 == 0 { 0.5 } else { 0.05 };
            detector.analyze_render_audio(&frame(render_level));
            // Constant capture energy carries no correlation.
            detector.analyze_capture_audio(&frame(0.2));
        }
        assert!(detector.metrics().echo_likelihood < 0.3);
    }
}
