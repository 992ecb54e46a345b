//! Stream lifecycle: `Initial → Playing ⇄ Paused → Stopped`.
//!
//! A [`Stream`] owns one decoder session. `play` spawns the decoder and starts the
//! duration parser and frame emitter threads; `pause` parks the emitter with the
//! decoder still running; `stop` (or end of decoder output) tears everything down.
//! `Stopped` is terminal.
//!
//! Locking: `control` serialises play and pause, `inner` orders every state
//! transition, `duration` is only ever taken after `inner`. `stop` takes `inner`
//! alone so it can always kill the decoder, even while a pause handoff is blocked.

use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, select};

use crate::config::StreamConfig;
use crate::duration::spawn_duration_parser;
use crate::emitter::{EmitterConfig, EmitterExit, Meter, run_emitter};
use crate::error::{Result, StreamError};
use crate::pending::Pending;
use crate::process::{Decoder, Launcher, ProcessOutput, SystemLauncher, decoder_arguments};
use crate::sink::OutgoingAudio;
use crate::source::Source;
use ffstream_types::{EndReason, StreamState, StreamStatus};

/// Handle to one transcode-and-stream session.
///
/// Cheap to clone; all clones control the same session.
#[derive(Clone)]
pub struct Stream {
    shared: Arc<Shared>,
}

struct Shared {
    config: StreamConfig,
    launcher: Box<dyn Launcher>,
    sink: Arc<dyn OutgoingAudio>,
    control: Mutex<()>,
    inner: Mutex<Inner>,
    duration: Mutex<Duration>,
    meter: Arc<Meter>,
    pending: Pending,
    pause_tx: Sender<()>,
    pause_rx: Receiver<()>,
}

struct Inner {
    state: StreamState,
    source: Option<Box<dyn Source>>,
    offset: Duration,
    decoder: Option<Decoder>,
    run: Option<EmitterRun>,
    end_reason: Option<EndReason>,
}

/// A spawned emitter thread.
struct EmitterRun {
    handle: JoinHandle<EmitterExit>,
    /// Disconnects when the thread exits.
    done: Receiver<()>,
}

impl Stream {
    /// Create a stream that launches real decoder processes.
    pub fn new(config: StreamConfig, sink: impl OutgoingAudio + 'static) -> Self {
        Self::with_launcher(config, sink, SystemLauncher)
    }

    /// Create a stream with a custom process launcher.
    pub fn with_launcher(
        config: StreamConfig,
        sink: impl OutgoingAudio + 'static,
        launcher: impl Launcher + 'static,
    ) -> Self {
        let (pause_tx, pause_rx) = crossbeam_channel::bounded(0);
        let meter = Arc::new(Meter::new(config.volume));
        let offset = config.offset;
        Self {
            shared: Arc::new(Shared {
                config,
                launcher: Box::new(launcher),
                sink: Arc::new(sink),
                control: Mutex::new(()),
                inner: Mutex::new(Inner {
                    state: StreamState::Initial,
                    source: None,
                    offset,
                    decoder: None,
                    run: None,
                    end_reason: None,
                }),
                duration: Mutex::new(Duration::ZERO),
                meter,
                pending: Pending::new(),
                pause_tx,
                pause_rx,
            }),
        }
    }

    /// Attach the media origin. Only allowed before the first `play`.
    pub fn set_source(&self, source: impl Source + 'static) -> Result<()> {
        let mut inner = self.shared.lock_inner();
        if inner.state != StreamState::Initial {
            return Err(StreamError::SourceFixed);
        }
        inner.source = Some(Box::new(source));
        Ok(())
    }

    /// Seek position for the first `play`. Only allowed before it.
    pub fn set_offset(&self, offset: Duration) -> Result<()> {
        let mut inner = self.shared.lock_inner();
        if inner.state != StreamState::Initial {
            return Err(StreamError::SourceFixed);
        }
        inner.offset = offset;
        Ok(())
    }

    pub fn offset(&self) -> Duration {
        self.shared.lock_inner().offset
    }

    /// Start the decoder, or resume frame emission after `pause`.
    pub fn play(&self) -> Result<()> {
        let _control = self.shared.control.lock().unwrap();
        let mut inner = self.shared.lock_inner();
        let state = inner.state;
        match state {
            StreamState::Playing => Err(StreamError::AlreadyPlaying),
            StreamState::Stopped => Err(StreamError::StreamStopped),
            StreamState::Paused => self.resume(inner),
            StreamState::Initial => self.start(&mut inner),
        }
    }

    fn start(&self, inner: &mut Inner) -> Result<()> {
        let shared = &self.shared;
        let offset = inner.offset;
        let Some(source) = inner.source.as_mut() else {
            return Err(StreamError::NoSource);
        };

        let args = decoder_arguments(offset, source.arguments(), &shared.config.audio);
        let mut command = Command::new(&shared.config.command);
        command.args(&args).stdin(Stdio::null());
        source.start(&mut command).map_err(StreamError::SourceStart)?;

        let (mut decoder, stdout, stderr) = match Decoder::start(shared.launcher.as_ref(), command)
        {
            Ok(started) => started,
            Err(e) => {
                source.done();
                return Err(StreamError::Spawn {
                    command: shared.config.command.clone(),
                    source: e,
                });
            }
        };

        // Weak so a parser draining a live decoder never keeps the session alive.
        let publish = {
            let shared = Arc::downgrade(shared);
            move |duration: Duration| {
                if let Some(shared) = shared.upgrade() {
                    shared.publish_duration(duration);
                }
            }
        };
        let spawned =
            spawn_duration_parser(stderr, publish).and_then(|_| self.spawn_emitter(stdout));
        let run = match spawned {
            Ok(run) => run,
            Err(e) => {
                decoder.terminate();
                source.done();
                inner.state = StreamState::Stopped;
                return Err(StreamError::Worker(e));
            }
        };

        tracing::info!(
            command = %shared.config.command,
            args = ?args,
            offset_ms = offset.as_millis() as u64,
            "stream started"
        );
        inner.decoder = Some(decoder);
        inner.run = Some(run);
        inner.state = StreamState::Playing;
        shared.pending.add();
        Ok(())
    }

    fn resume(&self, mut inner: MutexGuard<'_, Inner>) -> Result<()> {
        let previous = inner.run.take();
        drop(inner);
        let exit = previous.map(|run| run.handle.join());

        let mut inner = self.shared.lock_inner();
        let reader = match exit {
            Some(Ok(EmitterExit::Paused(reader))) if inner.state == StreamState::Paused => reader,
            _ => {
                self.shared.cleanup(&mut inner, EndReason::Eof);
                return Err(StreamError::StreamStopped);
            }
        };
        match self.spawn_emitter(reader) {
            Ok(run) => {
                inner.run = Some(run);
                inner.state = StreamState::Playing;
                tracing::debug!(elapsed_ms = self.elapsed().as_millis() as u64, "stream resumed");
                Ok(())
            }
            Err(e) => {
                self.shared.cleanup(&mut inner, EndReason::Eof);
                Err(StreamError::Worker(e))
            }
        }
    }

    fn spawn_emitter(&self, reader: ProcessOutput) -> std::io::Result<EmitterRun> {
        let shared = Arc::clone(&self.shared);
        let cfg = EmitterConfig {
            interval: shared.config.audio.interval,
            frame_bytes: shared.config.audio.frame_bytes(),
        };
        let (done_tx, done) = crossbeam_channel::bounded::<()>(0);
        let handle = thread::Builder::new()
            .name("ffstream-emitter".into())
            .spawn(move || {
                let _done = done_tx;
                run_emitter(
                    reader,
                    cfg,
                    shared.meter.clone(),
                    shared.pause_rx.clone(),
                    shared.sink.as_ref(),
                    |e| {
                        tracing::debug!("decoder output ended: {e}");
                        let mut inner = shared.lock_inner();
                        shared.cleanup(&mut inner, EndReason::Eof);
                    },
                )
            })?;
        Ok(EmitterRun { handle, done })
    }

    /// Suspend frame emission, leaving the decoder running.
    ///
    /// Returns once the emitter has parked, or once it has ended on its own. In the
    /// latter case the stream ends up `Stopped` even though this call succeeds.
    pub fn pause(&self) -> Result<()> {
        let _control = self.shared.control.lock().unwrap();
        let done = {
            let mut inner = self.shared.lock_inner();
            if inner.state != StreamState::Playing {
                return Err(StreamError::NotPlaying);
            }
            inner.state = StreamState::Paused;
            inner.run.as_ref().map(|run| run.done.clone())
        };
        if let Some(done) = done {
            select! {
                send(self.shared.pause_tx, ()) -> _ => {}
                recv(done) -> _ => {}
            }
        }
        tracing::debug!(state = %self.state(), "stream paused");
        Ok(())
    }

    /// Kill the decoder and end the stream.
    ///
    /// Blocks until the emitter thread has exited. Does not wait for a pending
    /// `pause`; the kill ends the emitter run, which releases that `pause` too.
    pub fn stop(&self) -> Result<()> {
        let run = {
            let mut inner = self.shared.lock_inner();
            if !inner.state.is_active() {
                return Err(StreamError::NotPlayingOrPaused);
            }
            self.shared.cleanup(&mut inner, EndReason::Stopped);
            *self.shared.duration.lock().unwrap() = Duration::ZERO;
            inner.run.take()
        };
        if let Some(run) = run {
            if run.handle.join().is_err() {
                tracing::warn!("emitter thread panicked");
            }
        }
        Ok(())
    }

    /// Block until the session has ended.
    pub fn wait(&self) {
        self.shared.pending.wait();
    }

    /// Like [`Stream::wait`] with a deadline. Returns `true` if the session ended.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.shared.pending.wait_timeout(timeout)
    }

    pub fn state(&self) -> StreamState {
        self.shared.lock_inner().state
    }

    /// Audio emitted so far, one interval per frame. Lock-free.
    pub fn elapsed(&self) -> Duration {
        self.shared.meter.elapsed()
    }

    /// Media length announced by the decoder; zero until known and after `stop`.
    pub fn duration(&self) -> Duration {
        *self.shared.duration.lock().unwrap()
    }

    pub fn volume(&self) -> f32 {
        self.shared.meter.volume()
    }

    /// Takes effect from the next emitted frame.
    pub fn set_volume(&self, volume: f32) {
        self.shared.meter.set_volume(volume);
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.shared.lock_inner().end_reason
    }

    /// Snapshot of state and telemetry.
    pub fn status(&self) -> StreamStatus {
        let (state, end_reason) = {
            let inner = self.shared.lock_inner();
            (inner.state, inner.end_reason)
        };
        let duration = self.duration();
        StreamStatus {
            state,
            elapsed_ms: self.elapsed().as_millis() as u64,
            duration_ms: (!duration.is_zero()).then(|| duration.as_millis() as u64),
            volume: self.volume(),
            end_reason,
        }
    }
}

impl Shared {
    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Tear the session down. Runs once; later calls are no-ops.
    fn cleanup(&self, inner: &mut Inner, reason: EndReason) {
        if inner.state == StreamState::Stopped {
            return;
        }
        if let Some(mut decoder) = inner.decoder.take() {
            decoder.terminate();
        }
        if let Some(source) = inner.source.as_mut() {
            source.done();
        }
        while self.pause_rx.try_recv().is_ok() {}
        let was_started = inner.state.is_active();
        inner.state = StreamState::Stopped;
        inner.end_reason = Some(reason);
        if was_started {
            self.pending.done();
        }
        tracing::info!(
            reason = ?reason,
            elapsed_ms = self.meter.elapsed().as_millis() as u64,
            "stream stopped"
        );
    }

    fn publish_duration(&self, duration: Duration) {
        let inner = self.lock_inner();
        if !inner.state.is_active() {
            return;
        }
        *self.duration.lock().unwrap() = duration;
    }
}

impl Drop for Shared {
    /// Last handle gone while a session is still attached (typically paused):
    /// kill the decoder and release the source.
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.state.is_active() {
            self.cleanup(&mut inner, EndReason::Stopped);
        }
    }
}
