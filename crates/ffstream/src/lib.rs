pub mod config;
pub mod duration;
pub mod emitter;
pub mod error;
pub mod pending;
pub mod process;
pub mod sink;
pub mod source;
pub mod stream;

pub use config::{AudioConfig, StreamConfig};
pub use error::StreamError;
pub use sink::{AudioFrame, ChannelSink, OutgoingAudio};
pub use source::{ExecSource, FileSource, ReaderSource, Source};
pub use stream::Stream;

pub use ffstream_types::{EndReason, StreamState, StreamStatus};
