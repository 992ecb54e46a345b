//! Runs one stream from the command line.
//!
//! Frames go to a writer thread (file or discard), status lines to the log, and
//! Ctrl-C stops the stream early.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, select};

use crate::cli::{Args, Command};
use crate::config;
use ffstream::{ChannelSink, ExecSource, FileSource, ReaderSource, Stream, StreamError};
use ffstream_types::StreamStatus;

/// Resolve settings, play the stream to the end and report the outcome.
pub fn run(args: Args) -> Result<()> {
    let cfg = config::from_args(&args)?;
    let sink = ChannelSink::new();
    let stream = Stream::new(cfg.stream.clone(), sink.clone());
    attach_source(&stream, &args.cmd)?;

    let out = open_output(cfg.output.as_deref())?;
    // Never sent on; dropping the sender tells helper threads the stream is over.
    let (finished_tx, finished_rx) = crossbeam_channel::bounded::<()>(0);

    let writer = {
        let sink = sink.clone();
        let finished = finished_rx.clone();
        thread::Builder::new()
            .name("ffstream-writer".into())
            .spawn(move || {
                let mut out = out;
                write_frames(&sink, &mut out, &finished)
            })
            .context("spawn frame writer")?
    };
    let reporter = match cfg.status_interval {
        Some(every) => {
            let stream = stream.clone();
            let finished = finished_rx.clone();
            let handle = thread::Builder::new()
                .name("ffstream-status".into())
                .spawn(move || report_status(&stream, every, &finished))
                .context("spawn status reporter")?;
            Some(handle)
        }
        None => None,
    };

    {
        let stream = stream.clone();
        ctrlc::set_handler(move || match stream.stop() {
            Ok(()) => tracing::info!("interrupted; stream stopped"),
            Err(StreamError::NotPlayingOrPaused) => {}
            Err(e) => tracing::warn!("stop on interrupt failed: {e}"),
        })
        .context("install ctrl-c handler")?;
    }

    tracing::info!(
        command = %cfg.stream.command,
        channels = cfg.stream.audio.channels,
        sample_rate = cfg.stream.audio.sample_rate,
        interval_ms = cfg.stream.audio.interval.as_millis() as u64,
        output = ?cfg.output,
        "starting stream"
    );
    let played = stream.play();
    if played.is_ok() {
        stream.wait();
    }
    drop(finished_tx);

    let frames = writer
        .join()
        .map_err(|_| anyhow::anyhow!("frame writer panicked"))?
        .context("write frames")?;
    if let Some(reporter) = reporter {
        if reporter.join().is_err() {
            tracing::warn!("status reporter panicked");
        }
    }
    played.context("start stream")?;

    let status = stream.status();
    tracing::info!(frames, status = %status_line(&status)?, "stream finished");
    Ok(())
}

fn attach_source(stream: &Stream, cmd: &Command) -> Result<()> {
    match cmd {
        Command::File { path } => stream.set_source(FileSource::new(path))?,
        Command::Exec { program, args } => {
            stream.set_source(ExecSource::new(program.clone(), args.iter().cloned()))?
        }
        Command::Stdin => stream.set_source(ReaderSource::new(stdin_file()?))?,
    }
    Ok(())
}

#[cfg(unix)]
fn stdin_file() -> Result<File> {
    use std::os::fd::AsFd;

    let fd = io::stdin()
        .as_fd()
        .try_clone_to_owned()
        .context("duplicate stdin")?;
    Ok(File::from(fd))
}

#[cfg(windows)]
fn stdin_file() -> Result<File> {
    use std::os::windows::io::AsHandle;

    let handle = io::stdin()
        .as_handle()
        .try_clone_to_owned()
        .context("duplicate stdin")?;
    Ok(File::from(handle))
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write + Send>> {
    match path {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("create output {:?}", path))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::sink())),
    }
}

/// Drain every emitter run into `out` until `finished` disconnects.
///
/// Runs already queued when `finished` fires are still drained. Returns the number
/// of frames written.
fn write_frames<W: Write>(sink: &ChannelSink, out: &mut W, finished: &Receiver<()>) -> io::Result<u64> {
    let mut frames = 0;
    loop {
        select! {
            recv(sink.runs()) -> run => match run {
                Ok(run) => {
                    for frame in run.iter() {
                        write_frame(out, &frame)?;
                        frames += 1;
                    }
                }
                Err(_) => break,
            },
            recv(finished) -> _ => {
                while let Ok(run) = sink.runs().try_recv() {
                    for frame in run.iter() {
                        write_frame(out, &frame)?;
                        frames += 1;
                    }
                }
                break;
            }
        }
    }
    out.flush()?;
    Ok(frames)
}

fn write_frame<W: Write>(out: &mut W, frame: &[i16]) -> io::Result<()> {
    let bytes: Vec<u8> = frame.iter().flat_map(|s| s.to_le_bytes()).collect();
    out.write_all(&bytes)
}

fn report_status(stream: &Stream, every: Duration, finished: &Receiver<()>) {
    let ticker = crossbeam_channel::tick(every);
    loop {
        select! {
            recv(ticker) -> _ => match status_line(&stream.status()) {
                Ok(line) => tracing::info!(status = %line, "stream status"),
                Err(e) => tracing::warn!("status encode failed: {e}"),
            },
            recv(finished) -> _ => return,
        }
    }
}

fn status_line(status: &StreamStatus) -> serde_json::Result<String> {
    serde_json::to_string(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffstream::OutgoingAudio;
    use ffstream_types::{EndReason, StreamState};

    #[test]
    fn frames_are_written_little_endian() {
        let mut out = Vec::new();
        write_frame(&mut out, &[1, -2, 0x1234]).unwrap();
        assert_eq!(out, vec![0x01, 0x00, 0xfe, 0xff, 0x34, 0x12]);
    }

    #[test]
    fn writer_drains_queued_runs_after_finish() {
        let sink = ChannelSink::new();
        let first = sink.open();
        first.send(vec![1, 2]).unwrap();
        first.send(vec![3, 4]).unwrap();
        drop(first);
        let second = sink.open();
        second.send(vec![5, 6]).unwrap();
        drop(second);

        let (finished_tx, finished_rx) = crossbeam_channel::bounded::<()>(0);
        drop(finished_tx);
        let mut out = Vec::new();
        let frames = write_frames(&sink, &mut out, &finished_rx).unwrap();

        assert_eq!(frames, 3);
        assert_eq!(out.len(), 12);
        assert_eq!(&out[8..], &[5, 0, 6, 0]);
    }

    #[test]
    fn writer_follows_runs_as_they_open() {
        let sink = ChannelSink::new();
        let (finished_tx, finished_rx) = crossbeam_channel::bounded::<()>(0);
        let writer = {
            let sink = sink.clone();
            thread::spawn(move || {
                let mut out = Vec::new();
                let frames = write_frames(&sink, &mut out, &finished_rx).unwrap();
                (frames, out)
            })
        };

        let run = sink.open();
        run.send(vec![7]).unwrap();
        drop(run);
        thread::sleep(Duration::from_millis(10));
        drop(finished_tx);

        let (frames, out) = writer.join().unwrap();
        assert_eq!(frames, 1);
        assert_eq!(out, vec![7, 0]);
    }

    #[test]
    fn status_line_is_json() {
        let status = StreamStatus {
            state: StreamState::Playing,
            elapsed_ms: 250,
            duration_ms: None,
            volume: 1.0,
            end_reason: None,
        };
        let line = status_line(&status).unwrap();
        assert!(line.contains(r#""state":"playing""#));
        assert!(line.contains(r#""elapsed_ms":250"#));

        let done = StreamStatus {
            state: StreamState::Stopped,
            end_reason: Some(EndReason::Stopped),
            ..status
        };
        assert!(status_line(&done).unwrap().contains(r#""end_reason":"stopped""#));
    }

    #[test]
    fn missing_output_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.pcm");
        assert!(open_output(Some(&path)).is_err());
        assert!(open_output(None).is_ok());
    }
}
