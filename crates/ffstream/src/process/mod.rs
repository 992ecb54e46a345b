//! Decoder process management.
//!
//! Spawning goes through a [`Launcher`] so the pipeline can run against a scripted
//! fake in tests. A started [`Decoder`] hands out its raw PCM (stdout) and
//! diagnostics (stderr) once, and keeps the handle for the kill-and-reap teardown.

#[cfg(test)]
pub(crate) mod fake;

use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use crate::config::AudioConfig;

/// Boxed byte stream read from the decoder.
pub type ProcessOutput = Box<dyn Read + Send>;

/// A running decoder process.
pub trait DecoderProcess: Send {
    /// Raw PCM output; yields `Some` once.
    fn take_stdout(&mut self) -> Option<ProcessOutput>;
    /// Diagnostic text output; yields `Some` once.
    fn take_stderr(&mut self) -> Option<ProcessOutput>;
    /// Forcibly terminate the process.
    fn kill(&mut self) -> io::Result<()>;
    /// Block until the process has exited.
    fn wait(&mut self) -> io::Result<()>;
    /// OS process id, when there is one.
    fn id(&self) -> Option<u32> {
        None
    }
}

/// Starts decoder processes.
pub trait Launcher: Send + Sync {
    fn launch(&self, command: Command) -> io::Result<Box<dyn DecoderProcess>>;
}

/// Launches real OS processes with piped stdout/stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, mut command: Command) -> io::Result<Box<dyn DecoderProcess>> {
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        let child = command.spawn()?;
        Ok(Box::new(ChildProcess { child }))
    }
}

struct ChildProcess {
    child: Child,
}

impl DecoderProcess for ChildProcess {
    fn take_stdout(&mut self) -> Option<ProcessOutput> {
        self.child
            .stdout
            .take()
            .map(|out| Box::new(out) as ProcessOutput)
    }

    fn take_stderr(&mut self) -> Option<ProcessOutput> {
        self.child
            .stderr
            .take()
            .map(|err| Box::new(err) as ProcessOutput)
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    fn wait(&mut self) -> io::Result<()> {
        let status = self.child.wait()?;
        tracing::debug!(status = %status, "decoder exited");
        Ok(())
    }

    fn id(&self) -> Option<u32> {
        Some(self.child.id())
    }
}

/// Build the full decoder argument list.
///
/// Order: seek (only when `offset > 0`), source arguments, then raw s16le output
/// at the sink's channel count and rate, written to stdout.
pub fn decoder_arguments(
    offset: Duration,
    source_args: Vec<String>,
    audio: &AudioConfig,
) -> Vec<String> {
    let mut args = Vec::with_capacity(source_args.len() + 9);
    if !offset.is_zero() {
        args.push("-ss".to_string());
        args.push(offset.as_secs_f64().to_string());
    }
    args.extend(source_args);
    args.extend([
        "-ac".to_string(),
        audio.channels.to_string(),
        "-ar".to_string(),
        audio.sample_rate.to_string(),
        "-f".to_string(),
        "s16le".to_string(),
        "-".to_string(),
    ]);
    args
}

/// Owned handle of a started decoder.
pub struct Decoder {
    process: Box<dyn DecoderProcess>,
    terminated: bool,
}

impl Decoder {
    /// Launch `command` and detach both output streams.
    ///
    /// Returns `(decoder, stdout, stderr)`. A process that comes up without both
    /// pipes is torn down again and reported as an error.
    pub fn start(
        launcher: &dyn Launcher,
        command: Command,
    ) -> io::Result<(Self, ProcessOutput, ProcessOutput)> {
        let process = launcher.launch(command)?;
        let mut decoder = Decoder {
            process,
            terminated: false,
        };
        let stdout = decoder.process.take_stdout();
        let stderr = decoder.process.take_stderr();
        match (stdout, stderr) {
            (Some(stdout), Some(stderr)) => {
                tracing::debug!(pid = ?decoder.process.id(), "decoder started");
                Ok((decoder, stdout, stderr))
            }
            _ => {
                decoder.terminate();
                Err(io::Error::other("decoder output pipes not captured"))
            }
        }
    }

    /// Kill and reap the process. Only the first call has any effect.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        if let Err(e) = self.process.kill() {
            // Already exited on its own; still needs reaping.
            tracing::debug!("decoder kill: {e}");
        }
        if let Err(e) = self.process.wait() {
            tracing::warn!("decoder wait failed: {e}");
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        self.terminate();
    }
}
