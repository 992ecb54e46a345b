//! ffstream: decode any input with an external decoder and emit timed PCM frames.
//!
//! ## Inputs
//! - `file`: a path or URL the decoder opens itself.
//! - `exec`: the standard output of another program.
//! - `stdin`: this process's standard input.
//!
//! Frames are written as raw s16le to `--output`, or discarded.

mod cli;
mod config;
mod runtime;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ffstream=info")),
        )
        .init();

    runtime::run(args)
}
