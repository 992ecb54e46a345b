use std::path::PathBuf;

use clap::{Parser, Subcommand};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "ffstream", version = VERSION)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// TOML settings file; flags given on the command line win
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Decoder program (default: ffmpeg)
    #[arg(long)]
    pub command: Option<String>,

    /// Start position in seconds
    #[arg(long)]
    pub offset: Option<f64>,

    /// Volume multiplier (1.0 = unchanged)
    #[arg(long)]
    pub volume: Option<f32>,

    /// Output channel count
    #[arg(long)]
    pub channels: Option<u16>,

    /// Output sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Frame length in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Write raw s16le frames here; frames are discarded when omitted
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Log a JSON status line this often (0 disables)
    #[arg(long)]
    pub status_interval_ms: Option<u64>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Decode a file or URL
    File {
        /// Path or URL handed to the decoder
        path: PathBuf,
    },

    /// Decode the standard output of another program
    Exec {
        /// Producer program
        program: String,
        /// Producer arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Decode this process's standard input
    Stdin,
}
