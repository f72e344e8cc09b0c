// Runtime-settings drain
//
// Each processing call drains the FIFO for its own direction exactly once,
// before touching the frame. The queue handle is cloned out of self first so
// the apply callbacks can borrow the pipeline mutably.

use std::sync::Arc;

use super::types::AudioPipeline;

impl AudioPipeline {
    pub(crate) fn drain_capture_settings(&mut self) {
        let settings = Arc::clone(&self.settings);
        settings.drain_capture(|setting| self.apply_capture_setting(setting));
    }

    pub(crate) fn drain_render_settings(&mut self) {
        let settings = Arc::clone(&self.settings);
        settings.drain_render(|setting| self.apply_render_setting(setting));
    }
}
