//! Downstream frame hand-off.
//!
//! Every emitter run opens its own channel and drops the sender when the run ends,
//! which is how consumers learn that no more frames will arrive for that run.

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

/// One frame of interleaved signed 16-bit samples.
pub type AudioFrame = Vec<i16>;

/// Destination for emitted frames.
pub trait OutgoingAudio: Send + Sync {
    /// Open the channel for one emitter run.
    fn open(&self) -> Sender<AudioFrame>;
}

/// Sink that hands each run's receiver to a consumer.
///
/// Runs are queued in order; a consumer takes them with [`ChannelSink::next_run`]
/// and drains each receiver until it disconnects.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    runs_tx: Sender<Receiver<AudioFrame>>,
    runs_rx: Receiver<Receiver<AudioFrame>>,
}

impl Default for ChannelSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelSink {
    pub fn new() -> Self {
        let (runs_tx, runs_rx) = crossbeam_channel::unbounded();
        Self { runs_tx, runs_rx }
    }

    /// Block until the next run opens.
    pub fn next_run(&self) -> Option<Receiver<AudioFrame>> {
        self.runs_rx.recv().ok()
    }

    /// Like [`ChannelSink::next_run`] but gives up after `timeout`.
    pub fn next_run_timeout(&self, timeout: Duration) -> Option<Receiver<AudioFrame>> {
        self.runs_rx.recv_timeout(timeout).ok()
    }

    /// Queue of opened runs, for use in `select!`.
    pub fn runs(&self) -> &Receiver<Receiver<AudioFrame>> {
        &self.runs_rx
    }
}

impl OutgoingAudio for ChannelSink {
    fn open(&self) -> Sender<AudioFrame> {
        // Unbounded so a slow consumer never holds the emitter away from its pause check.
        let (tx, rx) = crossbeam_channel::unbounded();
        let _ = self.runs_tx.send(rx);
        tx
    }
}
