//! Scripted stand-in for the decoder process.

use std::io::{self, Cursor, Read};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};

use super::{DecoderProcess, Launcher, ProcessOutput};

/// Counters and controls shared between a test and the processes it launched.
#[derive(Clone, Default)]
pub(crate) struct FakeProbe {
    launches: Arc<AtomicUsize>,
    kills: Arc<AtomicUsize>,
    waits: Arc<AtomicUsize>,
    parked: Arc<AtomicUsize>,
    args: Arc<Mutex<Vec<Vec<String>>>>,
    hangups: Arc<Mutex<Vec<Sender<()>>>>,
}

impl FakeProbe {
    pub(crate) fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub(crate) fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub(crate) fn waits(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }

    /// Reads currently blocked waiting for a hang-up.
    pub(crate) fn parked_reads(&self) -> usize {
        self.parked.load(Ordering::SeqCst)
    }

    /// Arguments of the most recent launch.
    pub(crate) fn last_args(&self) -> Vec<String> {
        self.args.lock().unwrap().last().cloned().unwrap_or_default()
    }

    /// Close stdout of every launched process as if the decoder died.
    pub(crate) fn hang_up(&self) {
        self.hangups.lock().unwrap().clear();
    }
}

/// Launcher producing [`FakeProcess`]es that replay the same script.
pub(crate) struct FakeLauncher {
    pcm: Vec<u8>,
    stderr: String,
    hold_open: bool,
    fail: bool,
    probe: FakeProbe,
}

impl FakeLauncher {
    /// Stdout yields `pcm` then EOF; stderr yields `stderr` then EOF.
    pub(crate) fn new(pcm: Vec<u8>, stderr: &str) -> Self {
        Self {
            pcm,
            stderr: stderr.to_string(),
            hold_open: false,
            fail: false,
            probe: FakeProbe::default(),
        }
    }

    /// Stdout yields `pcm`, then blocks until the process is killed or hung up.
    pub(crate) fn live(pcm: Vec<u8>, stderr: &str) -> Self {
        Self {
            hold_open: true,
            ..Self::new(pcm, stderr)
        }
    }

    /// Every launch fails as if the binary did not exist.
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new(), "")
        }
    }

    pub(crate) fn probe(&self) -> FakeProbe {
        self.probe.clone()
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, command: Command) -> io::Result<Box<dyn DecoderProcess>> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::NotFound, "fake decoder missing"));
        }
        self.probe.launches.fetch_add(1, Ordering::SeqCst);
        let args = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        self.probe.args.lock().unwrap().push(args);

        let open = if self.hold_open {
            let (alive_tx, alive_rx) = crossbeam_channel::bounded(0);
            self.probe.hangups.lock().unwrap().push(alive_tx);
            Some(alive_rx)
        } else {
            None
        };
        Ok(Box::new(FakeProcess {
            stdout: Some(Box::new(FakeStdout {
                data: Cursor::new(self.pcm.clone()),
                open,
                parked: self.probe.parked.clone(),
            })),
            stderr: Some(Box::new(Cursor::new(self.stderr.clone().into_bytes()))),
            probe: self.probe.clone(),
        }))
    }
}

pub(crate) struct FakeProcess {
    stdout: Option<ProcessOutput>,
    stderr: Option<ProcessOutput>,
    probe: FakeProbe,
}

impl DecoderProcess for FakeProcess {
    fn take_stdout(&mut self) -> Option<ProcessOutput> {
        self.stdout.take()
    }

    fn take_stderr(&mut self) -> Option<ProcessOutput> {
        self.stderr.take()
    }

    fn kill(&mut self) -> io::Result<()> {
        self.probe.kills.fetch_add(1, Ordering::SeqCst);
        self.probe.hang_up();
        Ok(())
    }

    fn wait(&mut self) -> io::Result<()> {
        self.probe.waits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Scripted bytes, optionally followed by a read that blocks until hang-up.
struct FakeStdout {
    data: Cursor<Vec<u8>>,
    open: Option<Receiver<()>>,
    parked: Arc<AtomicUsize>,
}

impl Read for FakeStdout {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.data.read(buf)?;
        if n > 0 || buf.is_empty() {
            return Ok(n);
        }
        if let Some(open) = self.open.take() {
            self.parked.fetch_add(1, Ordering::SeqCst);
            // Never sent on; returns once every sender is gone.
            let _ = open.recv();
            self.parked.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(0)
    }
}
