//! Settings file loading and command-line overlay.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::Args;
use ffstream::{AudioConfig, StreamConfig};

const DEFAULT_STATUS_INTERVAL_MS: u64 = 1000;

/// Settings file schema. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Decoder program.
    pub command: Option<String>,
    /// Volume multiplier.
    pub volume: Option<f32>,
    /// Start position in seconds.
    pub offset: Option<f64>,
    pub channels: Option<u16>,
    pub sample_rate: Option<u32>,
    pub interval_ms: Option<u64>,
    /// Raw PCM output file.
    pub output: Option<PathBuf>,
    /// Status log period; 0 disables.
    pub status_interval_ms: Option<u64>,
}

impl Settings {
    /// Load settings from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let settings =
            toml::from_str::<Settings>(&raw).with_context(|| format!("parse config {:?}", path))?;
        Ok(settings)
    }

    /// Replace fields with the ones given on the command line.
    pub fn overlay(mut self, args: &Args) -> Self {
        if args.command.is_some() {
            self.command = args.command.clone();
        }
        if args.output.is_some() {
            self.output = args.output.clone();
        }
        self.volume = args.volume.or(self.volume);
        self.offset = args.offset.or(self.offset);
        self.channels = args.channels.or(self.channels);
        self.sample_rate = args.sample_rate.or(self.sample_rate);
        self.interval_ms = args.interval_ms.or(self.interval_ms);
        self.status_interval_ms = args.status_interval_ms.or(self.status_interval_ms);
        self
    }

    /// Fill defaults and validate.
    pub fn resolve(self) -> Result<RunConfig> {
        let defaults = StreamConfig::default();
        let offset = match self.offset {
            Some(secs) => Duration::try_from_secs_f64(secs)
                .with_context(|| format!("invalid offset {secs}"))?,
            None => defaults.offset,
        };
        let audio = AudioConfig {
            channels: self.channels.unwrap_or(defaults.audio.channels),
            sample_rate: self.sample_rate.unwrap_or(defaults.audio.sample_rate),
            interval: self
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.audio.interval),
        };
        if audio.frame_size() == 0 {
            anyhow::bail!(
                "empty frame: {} channel(s) at {} Hz every {:?}",
                audio.channels,
                audio.sample_rate,
                audio.interval
            );
        }
        let volume = self.volume.unwrap_or(defaults.volume);
        if !volume.is_finite() {
            anyhow::bail!("invalid volume {volume}");
        }

        let status_ms = self
            .status_interval_ms
            .unwrap_or(DEFAULT_STATUS_INTERVAL_MS);
        Ok(RunConfig {
            stream: StreamConfig {
                command: self.command.unwrap_or(defaults.command),
                volume,
                offset,
                audio,
            },
            output: self.output,
            status_interval: (status_ms > 0).then(|| Duration::from_millis(status_ms)),
        })
    }
}

/// Fully resolved run parameters.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub stream: StreamConfig,
    pub output: Option<PathBuf>,
    pub status_interval: Option<Duration>,
}

/// Load the optional settings file, overlay flags and resolve.
pub fn from_args(args: &Args) -> Result<RunConfig> {
    let settings = match args.config.as_deref() {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    settings.overlay(args).resolve()
}
