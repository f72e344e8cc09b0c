// Orchestrator state and control surface
//
// Construction, geometry reconciliation, configuration replace, and the
// side-channel setters/getters. The per-frame paths live in capture.rs and
// render.rs.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audio_buffer::{AudioBuffer, FrameResampler};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::runtime_setting::{RuntimeSetting, SettingsHandle, SettingsQueue};
use crate::stages::{
    BuiltinEchoCanceller, DefaultEchoDetector, GainController1Stage, GainController2Stage,
    HighPassFilterStage, LevelEstimatorStage, NoiseSuppressorStage, PreAmplifierStage,
    VoiceDetectorStage,
};
use crate::stats::{AudioProcessingStats, CallMetrics};
use crate::stream_config::{ProcessingConfig, StreamConfig};
use crate::submodule::{
    CustomAudioAnalyzer, CustomProcessing, DebugDumpSink, EchoControl, EchoControlFactory,
    EchoDetector, PlayoutAudioGenerator,
};

const MIN_STREAM_DELAY_MS: i32 = 0;
const MAX_STREAM_DELAY_MS: i32 = 500;

/// Temporal alignment between the two streams.
#[derive(Debug, Default)]
pub(crate) struct DelayState {
    pub(crate) reported_delay_ms: i32,
    pub(crate) offset_ms: i32,
    pub(crate) was_set: bool,
}

/// Analog input gain feedback loop.
#[derive(Debug, Default)]
pub(crate) struct AnalogLevelState {
    /// Level supplied by the caller for the current frame; cleared after the
    /// frame is processed.
    pub(crate) current_level: Option<i32>,
    pub(crate) recommended_level: Option<i32>,
}

/// The pipeline orchestrator.
///
/// Drives a configurable chain of processing stages over synchronized 10 ms
/// capture and render frames. Created through [`crate::PipelineBuilder`].
///
/// Thread model: the capture and render entry points may live on different
/// threads but must not race with themselves or with their own getters and
/// setters. The one multi-producer-safe entry point is runtime-setting
/// enqueue.
pub struct AudioPipeline {
    pub(crate) config: Config,
    pub(crate) formats: ProcessingConfig,
    pub(crate) initialized: bool,

    pub(crate) delay: DelayState,
    pub(crate) analog: AnalogLevelState,
    pub(crate) key_pressed: bool,
    pub(crate) output_will_be_muted: bool,
    pub(crate) render_frame_seen: bool,

    // Working buffers, sized by the current geometry. The capture buffer
    // runs at the internal processing rate, which is the input rate capped
    // by the pipeline config; the input buffer stages int16 data at the
    // device rate when the two differ.
    pub(crate) capture_buffer: AudioBuffer,
    pub(crate) input_buffer: AudioBuffer,
    pub(crate) render_buffer: AudioBuffer,
    pub(crate) input_resamplers: Vec<FrameResampler>,
    pub(crate) output_resamplers: Vec<FrameResampler>,
    pub(crate) render_output_resamplers: Vec<FrameResampler>,
    pub(crate) scratch: Vec<f32>,
    pub(crate) packed_mono: Vec<f32>,
    pub(crate) i16_scratch: Vec<i16>,

    // Built-in stages, allocated lazily when their config block enables them.
    pub(crate) pre_amplifier: Option<PreAmplifierStage>,
    pub(crate) high_pass_filter: Option<HighPassFilterStage>,
    pub(crate) echo_control: Option<Box<dyn EchoControl>>,
    pub(crate) noise_suppressor: Option<NoiseSuppressorStage>,
    pub(crate) gain_controller1: Option<GainController1Stage>,
    pub(crate) gain_controller2: Option<GainController2Stage>,
    pub(crate) voice_detector: Option<VoiceDetectorStage>,
    pub(crate) level_estimator: Option<LevelEstimatorStage>,
    pub(crate) echo_detector: Option<Box<dyn EchoDetector>>,
    pub(crate) echo_detector_is_host: bool,

    // Host-supplied collaborators, exclusively owned.
    pub(crate) echo_control_factory: Option<Box<dyn EchoControlFactory>>,
    pub(crate) capture_post_processor: Option<Box<dyn CustomProcessing>>,
    pub(crate) render_pre_processor: Option<Box<dyn CustomProcessing>>,
    pub(crate) capture_analyzer: Option<Box<dyn CustomAudioAnalyzer>>,

    // Diagnostics collaborators; dropping one may block until its background
    // work drains, which is the only permitted blocking point.
    pub(crate) debug_dump: Option<Box<dyn DebugDumpSink>>,
    pub(crate) playout_generator: Option<Box<dyn PlayoutAudioGenerator>>,

    pub(crate) settings: Arc<SettingsQueue>,

    // Runtime settings that arrived while their target stage was disabled.
    // Consumed when the stage is allocated; a config replace of the stage's
    // block wins over anything applied earlier.
    pub(crate) pending_pre_gain: Option<f32>,
    pub(crate) pending_compression_gain_db: Option<i32>,
    pub(crate) pending_fixed_post_gain_db: Option<f32>,

    pub(crate) stats: AudioProcessingStats,
    pub(crate) metrics: CallMetrics,
}

impl AudioPipeline {
    pub(crate) fn from_parts(
        echo_control_factory: Option<Box<dyn EchoControlFactory>>,
        capture_post_processor: Option<Box<dyn CustomProcessing>>,
        render_pre_processor: Option<Box<dyn CustomProcessing>>,
        echo_detector: Option<Box<dyn EchoDetector>>,
        capture_analyzer: Option<Box<dyn CustomAudioAnalyzer>>,
    ) -> Self {
        let formats = ProcessingConfig::default();
        let echo_detector_is_host = echo_detector.is_some();
        Self {
            config: Config::default(),
            formats,
            initialized: false,
            delay: DelayState::default(),
            analog: AnalogLevelState::default(),
            key_pressed: false,
            output_will_be_muted: false,
            render_frame_seen: false,
            capture_buffer: AudioBuffer::new(&formats.input_stream),
            input_buffer: AudioBuffer::new(&formats.input_stream),
            render_buffer: AudioBuffer::new(&formats.reverse_input_stream),
            input_resamplers: Vec::new(),
            output_resamplers: Vec::new(),
            render_output_resamplers: Vec::new(),
            scratch: Vec::new(),
            packed_mono: Vec::new(),
            i16_scratch: Vec::new(),
            pre_amplifier: None,
            high_pass_filter: None,
            echo_control: None,
            noise_suppressor: None,
            gain_controller1: None,
            gain_controller2: None,
            voice_detector: None,
            level_estimator: None,
            echo_detector,
            echo_detector_is_host,
            echo_control_factory,
            capture_post_processor,
            render_pre_processor,
            capture_analyzer,
            debug_dump: None,
            playout_generator: None,
            settings: SettingsQueue::new(),
            pending_pre_gain: None,
            pending_compression_gain_db: None,
            pending_fixed_post_gain_db: None,
            stats: AudioProcessingStats::default(),
            metrics: CallMetrics::default(),
        }
    }

    /// Resets internal adaptive state while retaining all user settings.
    ///
    /// Call between logical calls; configuration, geometry and pending
    /// runtime parameters survive, adaptive state and per-call metrics do
    /// not.
    pub fn initialize(&mut self) {
        debug!("resetting pipeline adaptive state at call boundary");
        if let Some(stage) = &mut self.high_pass_filter {
            stage.reset();
        }
        if let Some(stage) = &mut self.noise_suppressor {
            stage.reset();
        }
        if let Some(stage) = &mut self.gain_controller1 {
            stage.reset();
        }
        if let Some(stage) = &mut self.gain_controller2 {
            stage.reset();
        }
        if let Some(stage) = &mut self.voice_detector {
            stage.reset();
        }
        if let Some(stage) = &mut self.level_estimator {
            stage.reset();
        }
        if self.initialized {
            self.reinitialize_submodules();
        }

        self.delay.was_set = false;
        self.render_frame_seen = false;
        self.analog.current_level = None;
        self.stats = AudioProcessingStats::default();
        self.metrics.reset();
    }

    /// Initializes with explicit stream geometry. Fails without touching the
    /// previous state if the geometry is invalid.
    pub fn initialize_with(&mut self, processing_config: &ProcessingConfig) -> Result<()> {
        processing_config.validate()?;
        self.set_formats(*processing_config);
        Ok(())
    }

    /// Geometry is validated by the caller; this commits it.
    pub(crate) fn set_formats(&mut self, processing_config: ProcessingConfig) {
        info!(
            capture_rate = processing_config.input_stream.sample_rate_hz(),
            capture_channels = processing_config.input_stream.num_channels(),
            render_rate = processing_config.reverse_input_stream.sample_rate_hz(),
            render_channels = processing_config.reverse_input_stream.num_channels(),
            "reinitializing pipeline geometry"
        );
        self.formats = processing_config;
        let proc_rate = processing_config
            .input_stream
            .sample_rate_hz()
            .min(self.config.pipeline.effective_max_rate());
        let proc_config =
            StreamConfig::new(proc_rate, processing_config.input_stream.num_channels());
        self.capture_buffer.reconfigure(&proc_config);
        self.input_buffer.reconfigure(&processing_config.input_stream);
        self.render_buffer
            .reconfigure(&processing_config.reverse_input_stream);
        self.input_resamplers = vec![FrameResampler::new(); proc_config.num_channels()];
        self.output_resamplers = vec![
            FrameResampler::new();
            processing_config.output_stream.num_channels()
        ];
        self.render_output_resamplers = vec![
            FrameResampler::new();
            processing_config.reverse_output_stream.num_channels()
        ];
        self.initialized = true;
        self.reinitialize_submodules();
    }

    /// Re-derives every allocated stage's internal layout from the current
    /// geometry, resetting adaptive state.
    pub(crate) fn reinitialize_submodules(&mut self) {
        let rate = self.capture_buffer.sample_rate_hz();
        let channels = self.formats.input_stream.num_channels();
        let render_rate = self.formats.reverse_input_stream.sample_rate_hz();
        let render_channels = self.formats.reverse_input_stream.num_channels();

        if let Some(stage) = &mut self.high_pass_filter {
            stage.initialize(rate, channels);
        }
        if let Some(stage) = &mut self.noise_suppressor {
            stage.initialize(channels);
        }
        if let Some(stage) = &mut self.gain_controller1 {
            stage.initialize(rate);
        }
        if let Some(stage) = &mut self.gain_controller2 {
            stage.initialize(rate);
        }
        if let Some(stage) = &mut self.voice_detector {
            stage.reset();
        }
        if let Some(stage) = &mut self.level_estimator {
            stage.reset();
        }
        if let Some(detector) = &mut self.echo_detector {
            detector.initialize(rate, channels, render_rate, render_channels);
        }
        // Echo control is recreated rather than re-derived; its filter
        // layout depends on the geometry.
        if self.echo_control.is_some() {
            self.echo_control = Some(self.create_echo_control());
        }
        if let Some(processor) = &mut self.render_pre_processor {
            processor.initialize(render_rate, render_channels);
        }
        if let Some(processor) = &mut self.capture_post_processor {
            processor.initialize(rate, channels);
        }
        if let Some(analyzer) = &mut self.capture_analyzer {
            analyzer.initialize(rate, channels);
        }
        if let Some(generator) = &mut self.playout_generator {
            generator.initialize(render_rate, render_channels);
        }
    }

    pub(crate) fn create_echo_control(&self) -> Box<dyn EchoControl> {
        let rate = self.capture_buffer.sample_rate_hz();
        let channels = self.formats.input_stream.num_channels();
        let render_rate = self.formats.reverse_input_stream.sample_rate_hz();
        match &self.echo_control_factory {
            Some(factory) => factory.create(
                rate,
                self.formats.reverse_input_stream.num_channels(),
                channels,
            ),
            None => Box::new(BuiltinEchoCanceller::new(
                self.config.echo_canceller.mobile_mode,
                rate,
                render_rate,
                channels,
            )),
        }
    }

    /// Allocates stages whose config block is enabled but whose instance is
    /// missing (first enable, or re-enable after a disable dropped it).
    pub(crate) fn ensure_stages(&mut self) {
        if self.config.pre_amplifier.enabled && self.pre_amplifier.is_none() {
            let gain = self
                .pending_pre_gain
                .take()
                .unwrap_or(self.config.pre_amplifier.fixed_gain_factor);
            self.pre_amplifier = Some(PreAmplifierStage::new(gain));
        }
        if self.config.high_pass_filter.enabled && self.high_pass_filter.is_none() {
            self.high_pass_filter = Some(HighPassFilterStage::new(
                self.capture_buffer.sample_rate_hz(),
                self.formats.input_stream.num_channels(),
            ));
        }
        if self.config.echo_canceller.enabled && self.echo_control.is_none() {
            self.echo_control = Some(self.create_echo_control());
        }
        if self.config.noise_suppression.enabled && self.noise_suppressor.is_none() {
            self.noise_suppressor = Some(NoiseSuppressorStage::new(
                self.config.noise_suppression.level,
                self.formats.input_stream.num_channels(),
            ));
        }
        if self.config.gain_controller1.enabled && self.gain_controller1.is_none() {
            let mut stage = GainController1Stage::new(
                &self.config.gain_controller1,
                self.capture_buffer.sample_rate_hz(),
            );
            if let Some(gain_db) = self.pending_compression_gain_db.take() {
                stage.set_compression_gain_db(gain_db);
            }
            self.gain_controller1 = Some(stage);
        }
        if self.config.gain_controller2.enabled && self.gain_controller2.is_none() {
            let mut stage = GainController2Stage::new(
                &self.config.gain_controller2,
                self.capture_buffer.sample_rate_hz(),
            );
            if let Some(gain_db) = self.pending_fixed_post_gain_db.take() {
                stage.set_fixed_gain_db(gain_db);
            }
            self.gain_controller2 = Some(stage);
        }
        if self.config.voice_detection.enabled && self.voice_detector.is_none() {
            self.voice_detector = Some(VoiceDetectorStage::new());
        }
        if self.config.level_estimation.enabled && self.level_estimator.is_none() {
            self.level_estimator = Some(LevelEstimatorStage::new());
        }
        if self.config.residual_echo_detector.enabled && self.echo_detector.is_none() {
            let mut detector: Box<dyn EchoDetector> = Box::new(DefaultEchoDetector::new());
            detector.initialize(
                self.capture_buffer.sample_rate_hz(),
                self.formats.input_stream.num_channels(),
                self.formats.reverse_input_stream.sample_rate_hz(),
                self.formats.reverse_input_stream.num_channels(),
            );
            self.echo_detector = Some(detector);
        }
    }

    /// Replaces the whole configuration tree; never merges. An invalid
    /// config is rejected with the active one untouched.
    pub fn apply_config(&mut self, config: Config) -> Result<()> {
        config.validate()?;
        // Mobile-mode cancellation is a property of the built-in engine; a
        // host-supplied engine cannot honor it.
        if config.echo_canceller.enabled
            && config.echo_canceller.mobile_mode
            && self.echo_control_factory.is_some()
        {
            return Err(Error::UnsupportedComponent);
        }

        // Stages whose block changed are dropped so the next frame
        // reallocates them with the new parameters; unchanged blocks keep
        // their adaptive state.
        if config.pre_amplifier != self.config.pre_amplifier {
            self.pre_amplifier = None;
        }
        if config.high_pass_filter != self.config.high_pass_filter {
            self.high_pass_filter = None;
        }
        if config.echo_canceller != self.config.echo_canceller {
            self.echo_control = None;
        }
        if config.noise_suppression != self.config.noise_suppression {
            self.noise_suppressor = None;
        }
        if config.gain_controller1 != self.config.gain_controller1 {
            self.gain_controller1 = None;
        }
        if config.gain_controller2 != self.config.gain_controller2 {
            self.gain_controller2 = None;
        }
        if config.voice_detection != self.config.voice_detection {
            self.voice_detector = None;
        }
        if config.level_estimation != self.config.level_estimation {
            self.level_estimator = None;
        }
        if config.residual_echo_detector != self.config.residual_echo_detector
            && !self.echo_detector_is_host
        {
            self.echo_detector = None;
        }

        let pipeline_changed = config.pipeline != self.config.pipeline;
        debug!(config = %config.to_json_string(), "applying pipeline config");
        self.config = config;
        // The processing-rate cap feeds into the buffer layout.
        if pipeline_changed && self.initialized {
            let formats = self.formats;
            self.set_formats(formats);
        }
        Ok(())
    }

    /// The last applied configuration, verbatim.
    pub fn get_config(&self) -> Config {
        self.config.clone()
    }

    // ---- runtime settings -------------------------------------------------

    /// Enqueues a runtime setting; never blocks, safe from any thread.
    pub fn set_runtime_setting(&self, setting: RuntimeSetting) {
        self.settings.enqueue(setting);
    }

    /// Cloneable producer handle for setter threads.
    pub fn runtime_settings_handle(&self) -> SettingsHandle {
        SettingsHandle::new(Arc::clone(&self.settings))
    }

    // ---- side-channel setters/getters ------------------------------------

    /// Supplies the device analog level for the upcoming capture frame.
    /// Required every frame while adaptive-analog gain control is enabled.
    pub fn set_stream_analog_level(&mut self, level: i32) -> Result<()> {
        if !self.config.gain_controller1.enabled {
            return Err(Error::NotEnabled("gain_controller1"));
        }
        let agc1 = &self.config.gain_controller1;
        let clamped = level.clamp(agc1.analog_level_minimum, agc1.analog_level_maximum);
        self.analog.current_level = Some(clamped);
        if clamped != level {
            warn!(level, clamped, "analog level outside configured bounds");
            return Err(Error::BadStreamParameterWarning("analog level"));
        }
        Ok(())
    }

    /// Recommended device level after the last capture frame, always inside
    /// the configured bounds.
    pub fn recommended_stream_analog_level(&self) -> i32 {
        let agc1 = &self.config.gain_controller1;
        self.analog
            .recommended_level
            .or(self.analog.current_level)
            .unwrap_or(agc1.analog_level_minimum)
            .clamp(agc1.analog_level_minimum, agc1.analog_level_maximum)
    }

    /// Reports the delay between a render frame and the capture frame
    /// containing its echo. Values outside [0, 500] ms are clamped and
    /// reported as a warning; the clamped value still takes effect.
    pub fn set_stream_delay_ms(&mut self, delay_ms: i32) -> Result<()> {
        let with_offset = delay_ms + self.delay.offset_ms;
        let clamped = with_offset.clamp(MIN_STREAM_DELAY_MS, MAX_STREAM_DELAY_MS);
        self.delay.reported_delay_ms = clamped;
        self.delay.was_set = true;
        if clamped != with_offset {
            warn!(delay_ms, with_offset, clamped, "stream delay clamped");
            return Err(Error::BadStreamParameterWarning("stream delay"));
        }
        Ok(())
    }

    pub fn stream_delay_ms(&self) -> i32 {
        self.delay.reported_delay_ms
    }

    pub fn was_stream_delay_set(&self) -> bool {
        self.delay.was_set
    }

    /// Additive offset applied to subsequently reported delays.
    pub fn set_delay_offset_ms(&mut self, offset_ms: i32) {
        self.delay.offset_ms = offset_ms;
    }

    pub fn delay_offset_ms(&self) -> i32 {
        self.delay.offset_ms
    }

    /// Signals whether a key press occurred with this chunk of audio.
    pub fn set_stream_key_pressed(&mut self, key_pressed: bool) {
        self.key_pressed = key_pressed;
    }

    pub fn stream_key_pressed(&self) -> bool {
        self.key_pressed
    }

    /// Hints that the processed output will be muted or otherwise unused.
    /// Analysis-only capture work is skipped while the hint is active.
    pub fn set_output_will_be_muted(&mut self, muted: bool) {
        self.output_will_be_muted = muted;
    }

    pub fn output_will_be_muted(&self) -> bool {
        self.output_will_be_muted
    }

    // ---- diagnostics ------------------------------------------------------

    /// Attaches a debug-dump sink, replacing (and dropping) any previous one.
    /// The drop may block until the old sink's pending work completes.
    pub fn attach_debug_dump(&mut self, sink: Box<dyn DebugDumpSink>) {
        self.debug_dump = Some(sink);
    }

    pub fn detach_debug_dump(&mut self) {
        self.debug_dump = None;
    }

    /// Attaches a synthetic playout generator, replacing any previous one.
    pub fn attach_playout_generator(&mut self, mut generator: Box<dyn PlayoutAudioGenerator>) {
        if self.initialized {
            generator.initialize(
                self.formats.reverse_input_stream.sample_rate_hz(),
                self.formats.reverse_input_stream.num_channels(),
            );
        }
        self.playout_generator = Some(generator);
    }

    pub fn detach_playout_generator(&mut self) {
        self.playout_generator = None;
    }

    /// Statistics refreshed after the last capture frame. Echo-related
    /// fields are withheld when no remote tracks are active.
    pub fn get_statistics(&self, has_remote_tracks: bool) -> AudioProcessingStats {
        let mut stats = self.stats;
        if !has_remote_tracks {
            stats.residual_echo_likelihood = None;
            stats.residual_echo_likelihood_recent_max = None;
        }
        stats
    }

    /// Per-call metrics; reset by the no-arg [`initialize`](Self::initialize).
    pub fn call_metrics(&self) -> CallMetrics {
        self.metrics
    }

    // ---- geometry introspection ------------------------------------------

    /// The internal processing rate: the capture input rate capped by
    /// `Config::pipeline`.
    pub fn proc_sample_rate_hz(&self) -> u32 {
        self.capture_buffer.sample_rate_hz()
    }

    pub fn num_input_channels(&self) -> usize {
        self.formats.input_stream.num_channels()
    }

    pub fn num_proc_channels(&self) -> usize {
        self.formats.input_stream.num_channels()
    }

    pub fn num_output_channels(&self) -> usize {
        self.formats.output_stream.num_channels()
    }

    pub fn num_reverse_channels(&self) -> usize {
        self.formats.reverse_input_stream.num_channels()
    }
}

impl std::fmt::Debug for AudioPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioPipeline")
            .field("config", &self.config)
            .field("formats", &self.formats)
            .field("initialized", &self.initialized)
            .field("delay", &self.delay)
            .field("analog", &self.analog)
            .field("render_frame_seen", &self.render_frame_seen)
            .finish_non_exhaustive()
    }
}
