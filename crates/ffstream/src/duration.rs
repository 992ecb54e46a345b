//! Total-duration discovery from decoder diagnostics.
//!
//! The decoder announces the media length on stderr as `Duration: HH:MM:SS.xx`.
//! The parser takes the first announcement only; fractional seconds are ignored.

use std::io::{self, BufRead, BufReader};
use std::sync::LazyLock;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

use crate::process::ProcessOutput;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration: ([0-9]+)?:([0-9]+)?:([0-9]+)?").expect("valid duration pattern")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("duration field {0:?} is not a valid number")]
    InvalidField(String),
    #[error("duration {hours}:{minutes}:{seconds} is out of range")]
    OutOfRange { hours: u64, minutes: u64, seconds: u64 },
}

/// Parse a duration announcement out of one diagnostic line.
///
/// Returns `None` when the line carries no announcement. Missing fields count as zero.
pub fn parse_duration_line(line: &str) -> Option<Result<Duration, DurationParseError>> {
    let caps = DURATION_RE.captures(line)?;
    let field = |i: usize| -> Result<u64, DurationParseError> {
        match caps.get(i) {
            None => Ok(0),
            Some(m) => m
                .as_str()
                .parse::<u64>()
                .map_err(|_| DurationParseError::InvalidField(m.as_str().to_string())),
        }
    };
    Some(match (field(1), field(2), field(3)) {
        (Ok(hours), Ok(minutes), Ok(seconds)) => hms_to_duration(hours, minutes, seconds),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => Err(e),
    })
}

fn hms_to_duration(hours: u64, minutes: u64, seconds: u64) -> Result<Duration, DurationParseError> {
    hours
        .checked_mul(3600)
        .and_then(|h| minutes.checked_mul(60).and_then(|m| h.checked_add(m)))
        .and_then(|hm| hm.checked_add(seconds))
        .map(Duration::from_secs)
        .ok_or(DurationParseError::OutOfRange {
            hours,
            minutes,
            seconds,
        })
}

/// Read lines until the first duration announcement.
///
/// Stops at the first match, at a malformed announcement (logged), or at EOF.
pub fn scan_for_duration<R: BufRead>(reader: &mut R) -> Option<Duration> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => return None,
            Ok(_) => {}
        }
        let line = String::from_utf8_lossy(&buf);
        match parse_duration_line(&line) {
            None => continue,
            Some(Ok(duration)) => return Some(duration),
            Some(Err(e)) => {
                tracing::warn!(line = %line.trim_end(), "duration parse failed: {e}");
                return None;
            }
        }
    }
}

/// Scan decoder stderr on a background thread and hand the first duration to `publish`.
///
/// Once scanning ends the rest of the stream is drained unread until EOF, so the
/// decoder never stalls on a full or closed diagnostics pipe.
pub(crate) fn spawn_duration_parser<F>(stderr: ProcessOutput, publish: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce(Duration) + Send + 'static,
{
    thread::Builder::new()
        .name("ffstream-duration".into())
        .spawn(move || {
            let mut reader = BufReader::new(stderr);
            if let Some(duration) = scan_for_duration(&mut reader) {
                tracing::debug!(duration_ms = duration.as_millis() as u64, "duration parsed");
                publish(duration);
            }
            let _ = io::copy(&mut reader, &mut io::sink());
        })
}
