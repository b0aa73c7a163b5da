//! Event log format.
//!
//! An event log is the verbatim text stream produced by `getevent -l`, one
//! field update per line, e.g.
//!
//! ```text
//! /dev/input/event8: EV_ABS       ABS_MT_POSITION_X    0000021c
//! /dev/input/event8: EV_KEY       BTN_TOUCH            DOWN
//! ```
//!
//! Lines are matched by substring and trailing value token, so extra fields
//! and unrelated lines are tolerated.

use crate::errors::TouchReplayError;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const POSITION_X: &str = "ABS_MT_POSITION_X";
pub const POSITION_Y: &str = "ABS_MT_POSITION_Y";
pub const TOUCH_BUTTON: &str = "BTN_TOUCH";
pub const TOUCH_DOWN: &str = "DOWN";
pub const TOUCH_UP: &str = "UP";

/// Typed view of one raw log line.
///
/// Coordinate payloads are the undecoded trailing token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLine<'a> {
    PositionX(&'a str),
    PositionY(&'a str),
    TouchDown,
    TouchUp,
    Unrecognized,
}

impl<'a> EventLine<'a> {
    pub fn classify(line: &'a str) -> Self {
        let value = line.split_whitespace().last().unwrap_or("");
        if line.contains(POSITION_X) {
            Self::PositionX(value)
        } else if line.contains(POSITION_Y) {
            Self::PositionY(value)
        } else if line.contains(TOUCH_BUTTON) && value == TOUCH_DOWN {
            Self::TouchDown
        } else if line.contains(TOUCH_BUTTON) && value == TOUCH_UP {
            Self::TouchUp
        } else {
            Self::Unrecognized
        }
    }
}

/// Decode a hexadecimal coordinate token. Accepts an optional `0x` prefix.
pub fn decode_coordinate(token: &str) -> Option<u32> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

/// Append-only writer for an event log. Consumed by [`EventLogWriter::finish`].
pub struct EventLogWriter {
    path: PathBuf,
    out: BufWriter<File>,
    lines: u64,
    bytes: u64,
}

impl EventLogWriter {
    /// Create or truncate the log at `path`, creating parent directories.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TouchReplayError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| storage_error(&path, e))?;
            }
        }
        let file = File::create(&path).map_err(|e| storage_error(&path, e))?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
            lines: 0,
            bytes: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `line` exactly as received.
    pub fn append(&mut self, line: &str) -> Result<(), TouchReplayError> {
        self.out
            .write_all(line.as_bytes())
            .map_err(|e| storage_error(&self.path, e))?;
        self.lines += 1;
        self.bytes += line.len() as u64;
        Ok(())
    }

    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    /// Flush and sync the log, returning `(lines, bytes)` written.
    pub fn finish(mut self) -> Result<(u64, u64), TouchReplayError> {
        self.out
            .flush()
            .map_err(|e| storage_error(&self.path, e))?;
        self.out
            .get_ref()
            .sync_all()
            .map_err(|e| storage_error(&self.path, e))?;
        Ok((self.lines, self.bytes))
    }
}

/// Open an existing log for sequential reading.
pub fn open_event_log(path: impl AsRef<Path>) -> Result<BufReader<File>, TouchReplayError> {
    let path = path.as_ref();
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| storage_error(path, e))
}

fn storage_error(path: &Path, error: std::io::Error) -> TouchReplayError {
    TouchReplayError::Storage(format!("{}: {error}", path.display()))
}
