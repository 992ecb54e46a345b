use std::io;

use thiserror::Error;

/// Errors returned synchronously by [`crate::Stream`] control calls.
///
/// Precondition failures leave the stream state unchanged.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream already playing")]
    AlreadyPlaying,
    #[error("stream is not playing")]
    NotPlaying,
    #[error("stream is not playing nor paused")]
    NotPlayingOrPaused,
    #[error("stream has stopped")]
    StreamStopped,
    #[error("no source attached")]
    NoSource,
    /// Source/offset can only change before the first `play`.
    #[error("source is fixed once the stream has started")]
    SourceFixed,
    #[error("source start hook failed: {0}")]
    SourceStart(#[source] io::Error),
    #[error("failed to start stream worker thread: {0}")]
    Worker(#[source] io::Error),
    #[error("failed to spawn decoder {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, StreamError>;
