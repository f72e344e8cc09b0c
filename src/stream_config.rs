// Stream geometry types
//
// A StreamConfig describes one stream slot: sample rate, channel count and
// whether a trailing keyboard channel is present. Four named slots form a
// ProcessingConfig, which is what the orchestrator reconciles whenever the
// caller-reported geometry changes.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fixed chunk duration; every frame carries exactly this much audio.
pub const CHUNK_SIZE_MS: u32 = 10;

/// Sample rates accepted by the interleaved int16 entry points.
pub const NATIVE_SAMPLE_RATES_HZ: [u32; 4] = [8000, 16000, 32000, 48000];

/// Highest native rate; also the default internal processing cap.
pub const MAX_NATIVE_SAMPLE_RATE_HZ: u32 = 48000;

/// Geometry of one audio stream slot.
///
/// `num_channels` excludes the keyboard channel. When `has_keyboard` is true,
/// the last channel of any corresponding channel list is the keyboard channel
/// and is never processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    sample_rate_hz: u32,
    num_channels: usize,
    has_keyboard: bool,
    num_frames: usize,
}

impl StreamConfig {
    pub fn new(sample_rate_hz: u32, num_channels: usize) -> Self {
        Self {
            sample_rate_hz,
            num_channels,
            has_keyboard: false,
            num_frames: frames_per_chunk(sample_rate_hz),
        }
    }

    pub fn with_keyboard(sample_rate_hz: u32, num_channels: usize, has_keyboard: bool) -> Self {
        Self {
            sample_rate_hz,
            num_channels,
            has_keyboard,
            num_frames: frames_per_chunk(sample_rate_hz),
        }
    }

    pub fn set_sample_rate_hz(&mut self, sample_rate_hz: u32) {
        self.sample_rate_hz = sample_rate_hz;
        self.num_frames = frames_per_chunk(sample_rate_hz);
    }

    pub fn set_num_channels(&mut self, num_channels: usize) {
        self.num_channels = num_channels;
    }

    pub fn set_has_keyboard(&mut self, has_keyboard: bool) {
        self.has_keyboard = has_keyboard;
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    /// Channel count excluding the keyboard channel.
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn has_keyboard(&self) -> bool {
        self.has_keyboard
    }

    /// Samples per channel in one 10 ms chunk.
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Total processed samples in one chunk (keyboard channel excluded).
    pub fn num_samples(&self) -> usize {
        self.num_channels * self.num_frames
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

fn frames_per_chunk(sample_rate_hz: u32) -> usize {
    // Widened so absurd rates fail validation instead of overflowing here.
    (u64::from(sample_rate_hz) * u64::from(CHUNK_SIZE_MS) / 1000) as usize
}

pub fn is_native_rate(sample_rate_hz: u32) -> bool {
    NATIVE_SAMPLE_RATES_HZ.contains(&sample_rate_hz)
}

/// Geometry of all four stream slots, compared for equality as a tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub input_stream: StreamConfig,
    pub output_stream: StreamConfig,
    pub reverse_input_stream: StreamConfig,
    pub reverse_output_stream: StreamConfig,
}

impl ProcessingConfig {
    /// Validates the geometry for the deinterleaved float entry path.
    ///
    /// Arbitrary rates are permitted, but every slot needs a positive rate and
    /// channel count, and each output slot must carry one channel or as many
    /// channels as its input slot.
    pub fn validate(&self) -> Result<()> {
        for slot in [
            &self.input_stream,
            &self.output_stream,
            &self.reverse_input_stream,
            &self.reverse_output_stream,
        ] {
            if slot.sample_rate_hz() == 0 {
                return Err(Error::BadSampleRate(slot.sample_rate_hz()));
            }
            if slot.num_channels() == 0 {
                return Err(Error::BadNumberChannels {
                    got: 0,
                    expected: 1,
                });
            }
        }

        let in_ch = self.input_stream.num_channels();
        let out_ch = self.output_stream.num_channels();
        if out_ch != 1 && out_ch != in_ch {
            return Err(Error::BadNumberChannels {
                got: out_ch,
                expected: in_ch,
            });
        }

        let rev_in_ch = self.reverse_input_stream.num_channels();
        let rev_out_ch = self.reverse_output_stream.num_channels();
        if rev_out_ch != 1 && rev_out_ch != rev_in_ch {
            return Err(Error::BadNumberChannels {
                got: rev_out_ch,
                expected: rev_in_ch,
            });
        }

        Ok(())
    }

    /// Validates the stricter geometry contract of the interleaved int16 path:
    /// all rates native and mutually equal, output geometry equal to input.
    pub fn validate_native(&self) -> Result<()> {
        self.validate()?;

        for slot in [
            &self.input_stream,
            &self.output_stream,
            &self.reverse_input_stream,
            &self.reverse_output_stream,
        ] {
            if !is_native_rate(slot.sample_rate_hz()) {
                return Err(Error::BadSampleRate(slot.sample_rate_hz()));
            }
        }

        let rate = self.input_stream.sample_rate_hz();
        if self.output_stream.sample_rate_hz() != rate
            || self.reverse_input_stream.sample_rate_hz() != rate
            || self.reverse_output_stream.sample_rate_hz() != rate
        {
            return Err(Error::BadSampleRate(rate));
        }

        if self.output_stream != self.input_stream {
            return Err(Error::BadNumberChannels {
                got: self.output_stream.num_channels(),
                expected: self.input_stream.num_channels(),
            });
        }

        Ok(())
    }
}
