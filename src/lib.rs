// audio-pipeline
//
// Real-time two-stream audio processing. The pipeline consumes synchronized
// 10 ms frames from a capture (near-end) and a render (far-end) stream and
// runs the capture signal through a fixed-order chain of configurable
// stages: pre-amplification, high-pass filtering, echo cancellation, noise
// suppression, gain control, voice detection and level estimation. The
// render stream feeds the echo machinery its loudspeaker reference.

pub mod audio_buffer;
pub mod builder;
pub mod config;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod runtime_setting;
pub mod stages;
pub mod stats;
pub mod stream_config;
pub mod submodule;

pub use builder::PipelineBuilder;
pub use config::{
    Config, GainControlMode, GainController1, GainController2, NoiseSuppressionLevel,
};
pub use error::{Error, Result};
pub use frame::AudioFrame;
pub use pipeline::AudioPipeline;
pub use runtime_setting::{RuntimeSetting, SettingsHandle};
pub use stats::{AudioProcessingStats, CallMetrics};
pub use stream_config::{
    is_native_rate, ProcessingConfig, StreamConfig, CHUNK_SIZE_MS, MAX_NATIVE_SAMPLE_RATE_HZ,
    NATIVE_SAMPLE_RATES_HZ,
};
pub use submodule::{
    CustomAudioAnalyzer, CustomProcessing, DebugDumpSink, EchoControl, EchoControlFactory,
    EchoDetector, EchoDetectorMetrics, PlayoutAudioGenerator,
};
