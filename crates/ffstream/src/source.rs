//! Media origins feeding the decoder.
//!
//! A [`Source`] contributes the decoder input arguments and brackets the decoder
//! process lifetime with `start`/`done`.

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

/// Media origin for one stream.
pub trait Source: Send {
    /// Decoder arguments selecting the input, in order.
    fn arguments(&self) -> Vec<String>;

    /// Called right before the decoder is spawned, e.g. to wire its stdin.
    fn start(&mut self, command: &mut Command) -> io::Result<()>;

    /// Called once after the decoder has exited (or failed to spawn).
    fn done(&mut self);
}

/// A file or URL the decoder opens itself.
#[derive(Clone, Debug)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Source for FileSource {
    fn arguments(&self) -> Vec<String> {
        vec!["-i".to_string(), self.path.to_string_lossy().into_owned()]
    }

    fn start(&mut self, _command: &mut Command) -> io::Result<()> {
        Ok(())
    }

    fn done(&mut self) {}
}

/// An open file handed to the decoder as its standard input.
///
/// The handle moves into the child on `start`, so a reader source is single-use.
#[derive(Debug)]
pub struct ReaderSource {
    input: Option<File>,
}

impl ReaderSource {
    pub fn new(input: File) -> Self {
        Self { input: Some(input) }
    }
}

impl Source for ReaderSource {
    fn arguments(&self) -> Vec<String> {
        stdin_arguments()
    }

    fn start(&mut self, command: &mut Command) -> io::Result<()> {
        let input = self
            .input
            .take()
            .ok_or_else(|| io::Error::other("reader source already consumed"))?;
        command.stdin(Stdio::from(input));
        Ok(())
    }

    fn done(&mut self) {}
}

/// Output of another program piped into the decoder's standard input.
#[derive(Debug)]
pub struct ExecSource {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
}

impl ExecSource {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            child: None,
        }
    }
}

impl Source for ExecSource {
    fn arguments(&self) -> Vec<String> {
        stdin_arguments()
    }

    fn start(&mut self, command: &mut Command) -> io::Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::other("producer stdout not captured"));
        };
        tracing::debug!(program = %self.program, pid = child.id(), "exec source started");
        command.stdin(Stdio::from(stdout));
        self.child = Some(child);
        Ok(())
    }

    fn done(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                tracing::debug!(program = %self.program, "exec source kill: {e}");
            }
            let _ = child.wait();
        }
    }
}

fn stdin_arguments() -> Vec<String> {
    vec!["-i".to_string(), "-".to_string()]
}
