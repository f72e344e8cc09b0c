// Pipeline orchestrator
//
// The core component: owns the stream geometry, the stage instances, the
// delay and analog-level state and the runtime-settings queue, and exposes
// the frame-processing entry points for both stream directions. The impl is
// split by concern: construction and control surface in types.rs, the
// capture path in capture.rs, the render path in render.rs, and the
// runtime-settings drain in settings.rs.

mod capture;
mod render;
mod settings;
mod types;

pub use types::AudioPipeline;
