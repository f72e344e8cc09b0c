// Runtime settings
//
// A narrow, hot-path-safe side channel for parameter changes that must not
// force a pipeline reinitialization. Settings are constructed through
// validating factories, enqueued from any thread, and drained in FIFO order
// by the processing thread once per frame.

use std::sync::Arc;

use crossbeam::queue::SegQueue;

use crate::error::{Error, Result};

/// A single hot-path-safe parameter update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuntimeSetting {
    /// Pre-amplifier gain factor; attenuation is not allowed.
    CapturePreGain(f32),
    /// AGC1 compression gain, mirroring `Config::gain_controller1`.
    CaptureCompressionGainDb(i32),
    /// AGC2 fixed digital gain, mirroring `Config::gain_controller2`.
    CaptureFixedPostGainDb(f32),
    /// The playout volume changed on the device; render-side stages may react.
    PlayoutVolumeChange(i32),
    /// Opaque payload for a host-supplied render pre-processor.
    CustomRenderSetting(f32),
}

impl RuntimeSetting {
    pub fn capture_pre_gain(gain: f32) -> Result<Self> {
        if !gain.is_finite() || gain < 1.0 {
            return Err(Error::BadParameter(format!(
                "capture pre-gain must be >= 1.0 (attenuation not allowed), got {gain}"
            )));
        }
        Ok(Self::CapturePreGain(gain))
    }

    pub fn capture_compression_gain_db(gain_db: i32) -> Result<Self> {
        if !(0..=90).contains(&gain_db) {
            return Err(Error::BadParameter(format!(
                "compression gain must be in [0, 90] dB, got {gain_db}"
            )));
        }
        Ok(Self::CaptureCompressionGainDb(gain_db))
    }

    pub fn capture_fixed_post_gain_db(gain_db: f32) -> Result<Self> {
        if !gain_db.is_finite() || !(0.0..=90.0).contains(&gain_db) {
            return Err(Error::BadParameter(format!(
                "fixed post gain must be in [0, 90] dB, got {gain_db}"
            )));
        }
        Ok(Self::CaptureFixedPostGainDb(gain_db))
    }

    pub fn playout_volume_change(volume: i32) -> Self {
        Self::PlayoutVolumeChange(volume)
    }

    pub fn custom_render_setting(payload: f32) -> Self {
        Self::CustomRenderSetting(payload)
    }

    /// True when the setting targets the render path and should be drained by
    /// the reverse-stream call rather than the capture call.
    pub fn targets_render_path(&self) -> bool {
        matches!(
            self,
            Self::PlayoutVolumeChange(_) | Self::CustomRenderSetting(_)
        )
    }
}

/// Multi-producer conduit feeding settings to the two processing call sites.
///
/// One lock-free FIFO per direction; enqueue routes by setting kind so each
/// call site only ever drains the settings relevant to it. Unbounded by
/// policy: settings are small and infrequent.
#[derive(Debug, Default)]
pub struct SettingsQueue {
    capture: SegQueue<RuntimeSetting>,
    render: SegQueue<RuntimeSetting>,
}

impl SettingsQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Never blocks; safe from any thread.
    pub fn enqueue(&self, setting: RuntimeSetting) {
        if setting.targets_render_path() {
            self.render.push(setting);
        } else {
            self.capture.push(setting);
        }
    }

    /// Drains the capture-targeted settings that were pending when the call
    /// began. Settings enqueued while draining wait for the next frame.
    pub fn drain_capture(&self, apply: impl FnMut(RuntimeSetting)) {
        Self::drain(&self.capture, apply);
    }

    /// Render-side counterpart of `drain_capture`.
    pub fn drain_render(&self, apply: impl FnMut(RuntimeSetting)) {
        Self::drain(&self.render, apply);
    }

    fn drain(queue: &SegQueue<RuntimeSetting>, mut apply: impl FnMut(RuntimeSetting)) {
        // Snapshot the length first so settings racing in mid-drain are
        // deferred to the next frame.
        let pending = queue.len();
        for _ in 0..pending {
            match queue.pop() {
                Some(setting) => apply(setting),
                None => break,
            }
        }
    }
}

/// Cloneable producer handle for threads that only enqueue.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    queue: Arc<SettingsQueue>,
}

impl SettingsHandle {
    pub(crate) fn new(queue: Arc<SettingsQueue>) -> Self {
        Self { queue }
    }

    pub fn enqueue(&self, setting: RuntimeSetting) {
        self.queue.enqueue(setting);
    }
}
