// Interleaved int16 audio frame
//
// The fixed-format entry points exchange audio as one 10 ms chunk of
// interleaved 16-bit PCM. Geometry travels with the frame; when it differs
// from the last-initialized geometry the pipeline reinitializes implicitly.

use crate::stream_config::{StreamConfig, CHUNK_SIZE_MS};

/// One 10 ms chunk of interleaved int16 audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub sample_rate_hz: u32,
    pub num_channels: usize,
    pub samples_per_channel: usize,
    /// Interleaved samples, `samples_per_channel * num_channels` long.
    pub data: Vec<i16>,
}

impl AudioFrame {
    /// A silent frame with geometry derived from the sample rate.
    pub fn new(sample_rate_hz: u32, num_channels: usize) -> Self {
        let samples_per_channel =
            (u64::from(sample_rate_hz) * u64::from(CHUNK_SIZE_MS) / 1000) as usize;
        Self {
            sample_rate_hz,
            num_channels,
            samples_per_channel,
            data: vec![0; samples_per_channel * num_channels],
        }
    }

    /// A frame filled with the provided interleaved samples.
    pub fn from_interleaved(sample_rate_hz: u32, num_channels: usize, data: Vec<i16>) -> Self {
        let samples_per_channel = if num_channels == 0 {
            0
        } else {
            data.len() / num_channels
        };
        Self {
            sample_rate_hz,
            num_channels,
            samples_per_channel,
            data,
        }
    }

    /// Geometry of this frame as a stream slot description.
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig::new(self.sample_rate_hz, self.num_channels)
    }

    /// True when the payload length matches the declared geometry.
    pub fn is_length_consistent(&self) -> bool {
        self.data.len() == self.samples_per_channel * self.num_channels
    }
}
