//! Frame emitter: paces decoder PCM into the outgoing sink.
//!
//! One run per play/resume. Each tick reads exactly one frame from decoder stdout,
//! scales it by the live volume and pushes it downstream. A read failure (EOF
//! included) ends the run through the caller's cleanup hook; a suspend signal ends
//! it immediately and hands the reader back for the next run.

use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, select};

use crate::process::ProcessOutput;
use crate::sink::{AudioFrame, OutgoingAudio};

/// Live volume and elapsed-time counters shared between control calls and the emitter.
///
/// Both are plain atomics with relaxed ordering: volume is a best-effort snapshot
/// per frame, elapsed only ever grows.
#[derive(Debug)]
pub struct Meter {
    volume_bits: AtomicU32,
    elapsed_nanos: AtomicU64,
}

impl Meter {
    pub fn new(volume: f32) -> Self {
        Self {
            volume_bits: AtomicU32::new(volume.to_bits()),
            elapsed_nanos: AtomicU64::new(0),
        }
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::Relaxed))
    }

    fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.elapsed_nanos.fetch_add(nanos, Ordering::Relaxed);
    }
}

/// Decode little-endian 16-bit samples and multiply each by `volume`.
///
/// Out-of-range products wrap like a fixed-width integer cast; they are not clamped.
/// A trailing odd byte is ignored.
pub fn scale_frame(bytes: &[u8], volume: f32) -> AudioFrame {
    bytes
        .chunks_exact(2)
        .map(|pair| {
            let sample = f32::from(i16::from_le_bytes([pair[0], pair[1]]));
            (volume * sample) as i32 as i16
        })
        .collect()
}

/// How an emitter run ended.
pub(crate) enum EmitterExit {
    /// Suspend signal accepted; carries the decoder stdout for the next run.
    Paused(ProcessOutput),
    /// Decoder output failed or ended; the cleanup hook has run.
    Finished,
}

/// Fixed parameters of an emitter run.
#[derive(Clone, Copy, Debug)]
pub(crate) struct EmitterConfig {
    pub(crate) interval: Duration,
    /// Bytes read per tick; at least one sample.
    pub(crate) frame_bytes: usize,
}

/// Emit frames until suspended or until decoder output fails.
///
/// The sink channel is opened on entry and closed (dropped) exactly once on return,
/// after `on_read_failure` has run on the failure path.
pub(crate) fn run_emitter<F>(
    mut reader: ProcessOutput,
    cfg: EmitterConfig,
    meter: Arc<Meter>,
    pause: Receiver<()>,
    sink: &dyn OutgoingAudio,
    on_read_failure: F,
) -> EmitterExit
where
    F: FnOnce(io::Error),
{
    let outgoing = sink.open();
    let ticker = crossbeam_channel::tick(cfg.interval);
    let mut buf = vec![0u8; cfg.frame_bytes.max(2)];
    let mut sink_closed = false;

    loop {
        select! {
            recv(pause) -> _ => {
                tracing::debug!(elapsed_ms = meter.elapsed().as_millis() as u64, "emitter suspended");
                return EmitterExit::Paused(reader);
            }
            recv(ticker) -> _ => {
                if let Err(e) = reader.read_exact(&mut buf) {
                    on_read_failure(e);
                    return EmitterExit::Finished;
                }
                let frame = scale_frame(&buf, meter.volume());
                meter.advance(cfg.interval);
                if outgoing.send(frame).is_err() && !sink_closed {
                    sink_closed = true;
                    tracing::debug!("outgoing receiver dropped; frames are discarded");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ChannelSink;
    use std::io::Cursor;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    const CFG: EmitterConfig = EmitterConfig {
        interval: Duration::from_millis(2),
        frame_bytes: 4,
    };

    #[test]
    fn unity_volume_is_passthrough() {
        let samples = [0, 1, -1, i16::MAX, i16::MIN, 1234];
        assert_eq!(scale_frame(&pcm(&samples), 1.0), samples.to_vec());
    }

    #[test]
    fn scaling_is_linear() {
        let samples = [100, -250, 3000];
        let half = scale_frame(&pcm(&samples), 0.5);
        let full = scale_frame(&pcm(&samples), 1.0);
        let double = scale_frame(&pcm(&samples), 2.0);
        assert_eq!(half, vec![50, -125, 1500]);
        for (d, f) in double.iter().zip(&full) {
            assert_eq!(*d, f * 2);
        }
    }

    #[test]
    fn overflow_wraps_instead_of_clamping() {
        let out = scale_frame(&pcm(&[20_000, -20_000]), 2.0);
        assert_eq!(out, vec![(40_000i32) as i16, (-40_000i32) as i16]);
        assert_eq!(out[0], -25_536);
    }

    #[test]
    fn fractional_products_truncate_toward_zero() {
        assert_eq!(scale_frame(&pcm(&[3, -3]), 0.5), vec![1, -1]);
    }

    #[test]
    fn meter_volume_roundtrips_and_elapsed_accumulates() {
        let meter = Meter::new(0.25);
        assert_eq!(meter.volume(), 0.25);
        meter.set_volume(1.5);
        assert_eq!(meter.volume(), 1.5);

        meter.advance(Duration::from_millis(10));
        meter.advance(Duration::from_millis(10));
        assert_eq!(meter.elapsed(), Duration::from_millis(20));
    }

    #[test]
    fn emits_every_frame_then_runs_cleanup_and_closes() {
        let sink = ChannelSink::new();
        let meter = Arc::new(Meter::new(2.0));
        let (_pause_tx, pause_rx) = crossbeam_channel::bounded(0);
        let reader = Box::new(Cursor::new(pcm(&[1, 2, 3, 4, 5])));
        let (failed_tx, failed_rx) = mpsc::channel();

        let exit = run_emitter(reader, CFG, meter.clone(), pause_rx, &sink, move |e| {
            failed_tx.send(e.kind()).unwrap();
        });

        assert!(matches!(exit, EmitterExit::Finished));
        assert_eq!(failed_rx.recv().unwrap(), io::ErrorKind::UnexpectedEof);
        let run = sink.next_run().unwrap();
        let frames: Vec<AudioFrame> = run.iter().collect();
        assert_eq!(frames, vec![vec![2, 4], vec![6, 8]]);
        assert_eq!(meter.elapsed(), CFG.interval * 2);
    }

    #[test]
    fn suspend_returns_reader_without_cleanup() {
        let sink = ChannelSink::new();
        let meter = Arc::new(Meter::new(1.0));
        let (pause_tx, pause_rx) = crossbeam_channel::bounded(0);
        let reader = Box::new(Cursor::new(pcm(&[7; 4000])));

        let handle = {
            let sink = sink.clone();
            let meter = meter.clone();
            thread::spawn(move || {
                run_emitter(reader, CFG, meter, pause_rx, &sink, |_| {
                    panic!("cleanup must not run on suspend")
                })
            })
        };

        let run = sink.next_run().unwrap();
        assert_eq!(run.recv().unwrap(), vec![7, 7]);
        pause_tx.send(()).unwrap();

        let exit = handle.join().unwrap();
        let EmitterExit::Paused(mut rest) = exit else {
            panic!("expected suspended run");
        };
        // Channel closes once the run ends.
        while run.recv().is_ok() {}
        let mut next = [0u8; 2];
        rest.read_exact(&mut next).unwrap();
        assert_eq!(i16::from_le_bytes(next), 7);
    }

    #[test]
    fn elapsed_tracks_wall_clock_within_one_interval() {
        let sink = ChannelSink::new();
        let meter = Arc::new(Meter::new(1.0));
        let (_pause_tx, pause_rx) = crossbeam_channel::bounded(0);
        let reader = Box::new(Cursor::new(pcm(&[0; 20])));
        let cfg = EmitterConfig {
            interval: Duration::from_millis(5),
            frame_bytes: 4,
        };

        let started = Instant::now();
        run_emitter(reader, cfg, meter.clone(), pause_rx, &sink, |_| {});
        let wall = started.elapsed();

        assert_eq!(meter.elapsed(), cfg.interval * 10);
        assert!(meter.elapsed() <= wall + cfg.interval);
    }
}
