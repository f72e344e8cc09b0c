// Pluggable submodule contracts
//
// Optional processing and analysis units attach to the pipeline through
// these traits. The orchestrator exclusively owns every attached instance
// and drives its whole lifecycle: (re)initialize on geometry change, one
// call per processed frame, diagnostic rendering on demand.

use crate::audio_buffer::AudioBuffer;
use crate::runtime_setting::RuntimeSetting;

/// A custom processing hook for the capture-post or render-pre role.
pub trait CustomProcessing: Send {
    /// Called whenever the stream geometry changes.
    fn initialize(&mut self, sample_rate_hz: u32, num_channels: usize);

    /// Processes one frame in place.
    fn process(&mut self, audio: &mut AudioBuffer);

    /// Diagnostic rendering of internal state.
    fn describe(&self) -> String;

    /// Hot-path parameter updates routed from the runtime-settings queue.
    fn handle_runtime_setting(&mut self, _setting: RuntimeSetting) {}
}

/// A custom analysis hook observing the capture signal without modifying it.
pub trait CustomAudioAnalyzer: Send {
    fn initialize(&mut self, sample_rate_hz: u32, num_channels: usize);

    /// Observes one frame; must not mutate shared state visible to callers.
    fn analyze(&mut self, audio: &AudioBuffer);

    fn describe(&self) -> String;
}

/// Echo-likelihood metrics; reflect completed frames only, never a frame in
/// flight.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EchoDetectorMetrics {
    pub echo_likelihood: f64,
    pub echo_likelihood_recent_max: f64,
}

/// A residual echo detector observing both stream directions.
pub trait EchoDetector: Send {
    fn initialize(
        &mut self,
        capture_sample_rate_hz: u32,
        num_capture_channels: usize,
        render_sample_rate_hz: u32,
        num_render_channels: usize,
    );

    /// Read-only analysis of one packed render frame.
    fn analyze_render_audio(&mut self, render_audio: &[f32]);

    /// Read-only analysis of one packed capture frame.
    fn analyze_capture_audio(&mut self, capture_audio: &[f32]);

    fn metrics(&self) -> EchoDetectorMetrics;
}

/// Packs an audio buffer into a flat sample vector the way echo detectors
/// consume it: the first channel, frame by frame.
pub fn pack_render_audio_buffer(audio: &AudioBuffer, packed: &mut Vec<f32>) {
    packed.clear();
    if audio.num_channels() > 0 {
        packed.extend_from_slice(audio.channel(0));
    }
}

/// An echo-control engine (full echo canceller) consuming the render
/// reference and the reported stream delay.
pub trait EchoControl: Send {
    /// Observes (and may modify) one render frame used as the echo reference.
    fn analyze_render(&mut self, render: &mut AudioBuffer);

    /// Observes the capture frame before cancellation.
    fn analyze_capture(&mut self, capture: &AudioBuffer);

    /// Cancels echo in the capture frame. `stream_delay_ms` is the reconciled
    /// delay for this frame, or None when the engine must manage without it.
    fn process_capture(&mut self, capture: &mut AudioBuffer, stream_delay_ms: Option<i32>);
}

/// Factory producing one echo-control engine per initialization geometry.
pub trait EchoControlFactory: Send {
    fn create(
        &self,
        sample_rate_hz: u32,
        num_render_channels: usize,
        num_capture_channels: usize,
    ) -> Box<dyn EchoControl>;
}

/// Sink for per-frame debug recordings. Dropping the sink may block until
/// pending background work drains; that is the one permitted blocking point.
pub trait DebugDumpSink: Send {
    fn record_capture(&mut self, audio: &AudioBuffer);
    fn record_render(&mut self, audio: &AudioBuffer);
}

/// Generator substituting synthetic playout audio into the render path.
pub trait PlayoutAudioGenerator: Send {
    fn initialize(&mut self, sample_rate_hz: u32, num_channels: usize);
    fn fill(&mut self, audio: &mut AudioBuffer);
}
