// Pipeline builder
//
// Assembles an AudioPipeline from an initial configuration and optional
// host-supplied submodules. The builder is a plain value consumed by
// build(), so every submodule ends up exclusively owned by the pipeline.

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::AudioPipeline;
use crate::submodule::{
    CustomAudioAnalyzer, CustomProcessing, EchoControlFactory, EchoDetector,
};

/// Builder for [`AudioPipeline`].
///
/// ```
/// use audio_pipeline::{Config, PipelineBuilder};
///
/// let mut config = Config::default();
/// config.high_pass_filter.enabled = true;
/// let pipeline = PipelineBuilder::new().with_config(config).build().unwrap();
/// assert!(pipeline.get_config().high_pass_filter.enabled);
/// ```
#[derive(Default)]
pub struct PipelineBuilder {
    config: Config,
    echo_control_factory: Option<Box<dyn EchoControlFactory>>,
    capture_post_processor: Option<Box<dyn CustomProcessing>>,
    render_pre_processor: Option<Box<dyn CustomProcessing>>,
    echo_detector: Option<Box<dyn EchoDetector>>,
    capture_analyzer: Option<Box<dyn CustomAudioAnalyzer>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial configuration; may be replaced later through
    /// [`AudioPipeline::apply_config`].
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Custom echo-control engine factory, replacing the built-in canceller.
    pub fn with_echo_control_factory(mut self, factory: Box<dyn EchoControlFactory>) -> Self {
        self.echo_control_factory = Some(factory);
        self
    }

    /// Processor run on the capture signal after all built-in stages.
    pub fn with_capture_post_processor(mut self, processor: Box<dyn CustomProcessing>) -> Self {
        self.capture_post_processor = Some(processor);
        self
    }

    /// Processor run on the render signal before any analysis.
    pub fn with_render_pre_processor(mut self, processor: Box<dyn CustomProcessing>) -> Self {
        self.render_pre_processor = Some(processor);
        self
    }

    /// Custom residual echo detector, replacing the built-in one regardless
    /// of the `residual_echo_detector` config flag.
    pub fn with_echo_detector(mut self, detector: Box<dyn EchoDetector>) -> Self {
        self.echo_detector = Some(detector);
        self
    }

    /// Observer of the capture signal ahead of the stage chain.
    pub fn with_capture_analyzer(mut self, analyzer: Box<dyn CustomAudioAnalyzer>) -> Self {
        self.capture_analyzer = Some(analyzer);
        self
    }

    /// Validates the configuration and assembles the pipeline. The first
    /// processed frame (or an explicit `initialize_with`) establishes the
    /// stream geometry.
    pub fn build(self) -> Result<AudioPipeline> {
        self.config.validate()?;
        let mut pipeline = AudioPipeline::from_parts(
            self.echo_control_factory,
            self.capture_post_processor,
            self.render_pre_processor,
            self.echo_detector,
            self.capture_analyzer,
        );
        pipeline.apply_config(self.config)?;
        Ok(pipeline)
    }
}
