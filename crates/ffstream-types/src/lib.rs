use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a stream.
///
/// `Stopped` is terminal: a stopped stream never plays again.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// Created, decoder not started yet.
    #[default]
    Initial,
    /// Frames are being emitted.
    Playing,
    /// Decoder alive, frame emission suspended.
    Paused,
    /// Decoder killed and reaped.
    Stopped,
}

impl StreamState {
    /// `true` while a decoder process is attached to the stream.
    pub fn is_active(self) -> bool {
        matches!(self, StreamState::Playing | StreamState::Paused)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Initial => "initial",
            StreamState::Playing => "playing",
            StreamState::Paused => "paused",
            StreamState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Reason why a stream reached `Stopped`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Decoder output ended or failed mid-stream.
    Eof,
    /// Playback was explicitly stopped by a command.
    Stopped,
}

/// Point-in-time telemetry for one stream.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamStatus {
    /// Current lifecycle state.
    pub state: StreamState,
    /// Audio handed to the sink so far, in milliseconds.
    pub elapsed_ms: u64,
    /// Total media duration in milliseconds, once announced by the decoder.
    pub duration_ms: Option<u64>,
    /// Current volume multiplier.
    pub volume: f32,
    /// Set once the stream has stopped.
    pub end_reason: Option<EndReason>,
}
