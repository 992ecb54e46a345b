use std::time::Duration;

/// Decoder binary used when none is configured.
pub const DEFAULT_COMMAND: &str = "ffmpeg";

/// Output format expected by the downstream sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioConfig {
    /// Interleaved channel count requested from the decoder.
    pub channels: u16,
    /// Sample rate in Hz requested from the decoder.
    pub sample_rate: u32,
    /// Time covered by one emitted frame; also the emitter tick period.
    pub interval: Duration,
}

impl Default for AudioConfig {
    /// Mono 48 kHz in 10 ms frames.
    fn default() -> Self {
        Self {
            channels: 1,
            sample_rate: 48_000,
            interval: Duration::from_millis(10),
        }
    }
}

impl AudioConfig {
    /// Samples per frame across all channels.
    ///
    /// `sample_rate * interval * channels`, truncated to whole samples.
    pub fn frame_size(&self) -> usize {
        let per_channel =
            u128::from(self.sample_rate) * self.interval.as_micros() / 1_000_000;
        (per_channel as usize).saturating_mul(usize::from(self.channels))
    }

    /// Bytes of 16-bit PCM needed for one frame.
    pub fn frame_bytes(&self) -> usize {
        self.frame_size().saturating_mul(2)
    }
}

/// Settings fixed at stream construction.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Decoder program to execute.
    pub command: String,
    /// Initial volume multiplier.
    pub volume: f32,
    /// Initial seek position.
    pub offset: Duration,
    /// Sink output format.
    pub audio: AudioConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND.to_string(),
            volume: 1.0,
            offset: Duration::ZERO,
            audio: AudioConfig::default(),
        }
    }
}
