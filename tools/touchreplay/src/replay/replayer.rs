//! Replay: rebuild taps from an event log and dispatch them in log order.

use crate::errors::TouchReplayError;
use crate::logging::append_run_log;
use crate::replay::recording::{decode_coordinate, open_event_log, EventLine};
use crate::transport::DeviceTransport;
use serde_json::json;
use std::io::BufRead;
use std::path::Path;

// ── Touch state machine ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapAction {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Idle,
    Touching,
}

/// A coordinate token that is not valid hexadecimal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub token: String,
}

/// Working state for one replay pass.
///
/// Coordinates are sticky: a touch cycle that does not resend X or Y reuses
/// the last value seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TouchState {
    pub x: Option<u32>,
    pub y: Option<u32>,
    pub touching: bool,
}

impl TouchState {
    pub fn phase(&self) -> TouchPhase {
        if self.touching {
            TouchPhase::Touching
        } else {
            TouchPhase::Idle
        }
    }

    /// Apply one classified line, returning the tap it completes, if any.
    ///
    /// On a decode error the state is left unchanged.
    pub fn apply(&mut self, event: EventLine<'_>) -> Result<Option<TapAction>, DecodeError> {
        match event {
            EventLine::PositionX(token) => {
                self.x = Some(decode(token)?);
                Ok(None)
            }
            EventLine::PositionY(token) => {
                self.y = Some(decode(token)?);
                Ok(None)
            }
            EventLine::TouchDown => {
                self.touching = true;
                Ok(None)
            }
            EventLine::TouchUp if self.touching => {
                self.touching = false;
                Ok(self.x.zip(self.y).map(|(x, y)| TapAction { x, y }))
            }
            EventLine::TouchUp | EventLine::Unrecognized => Ok(None),
        }
    }
}

fn decode(token: &str) -> Result<u32, DecodeError> {
    decode_coordinate(token).ok_or_else(|| DecodeError {
        token: token.to_string(),
    })
}

// ── Replayer ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchedTap {
    /// 1-based log line holding the release.
    pub line: usize,
    pub tap: TapAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapFailure {
    pub line: usize,
    pub tap: TapAction,
    pub reason: String,
}

impl TapFailure {
    pub fn to_error(&self) -> TouchReplayError {
        TouchReplayError::TapFailed {
            line: self.line,
            x: self.tap.x,
            y: self.tap.y,
            reason: self.reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub lines_read: usize,
    pub taps: Vec<DispatchedTap>,
    pub failures: Vec<TapFailure>,
}

impl ReplaySummary {
    pub fn taps_attempted(&self) -> usize {
        self.taps.len() + self.failures.len()
    }
}

/// Per-tap hook; an error aborts the replay before the tap is sent.
type TapObserver<'a> = dyn FnMut(&TapAction) -> Result<(), TouchReplayError> + 'a;

pub struct Replayer<'a> {
    transport: &'a dyn DeviceTransport,
    observer: Option<Box<TapObserver<'a>>>,
}

impl<'a> Replayer<'a> {
    pub fn new(transport: &'a dyn DeviceTransport) -> Self {
        Self {
            transport,
            observer: None,
        }
    }

    /// Call `observer` just before each tap is sent.
    pub fn with_observer(
        mut self,
        observer: impl FnMut(&TapAction) -> Result<(), TouchReplayError> + 'a,
    ) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Replay the event log at `path`.
    pub fn replay(&mut self, path: &Path) -> Result<ReplaySummary, TouchReplayError> {
        let reader = open_event_log(path)?;
        append_run_log(
            "info",
            "replayer.started",
            json!({ "log_path": path.display().to_string() }),
        );
        let summary = self.replay_lines(reader)?;
        append_run_log(
            "info",
            "replayer.finished",
            json!({
                "lines_read": summary.lines_read,
                "taps": summary.taps.len(),
                "failed_taps": summary.failures.len(),
            }),
        );
        Ok(summary)
    }

    /// Drive a fresh [`TouchState`] over `reader`, dispatching taps as they complete.
    ///
    /// A malformed coordinate stops the pass; taps already sent stay sent.
    /// A rejected tap is recorded and the pass continues.
    pub fn replay_lines(&mut self, reader: impl BufRead) -> Result<ReplaySummary, TouchReplayError> {
        let mut state = TouchState::default();
        let mut summary = ReplaySummary::default();

        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(|e| {
                TouchReplayError::Storage(format!("reading event log line {line_no}: {e}"))
            })?;
            summary.lines_read = line_no;

            let tap = match state.apply(EventLine::classify(&line)) {
                Ok(Some(tap)) => tap,
                Ok(None) => continue,
                Err(DecodeError { token }) => {
                    append_run_log(
                        "error",
                        "replayer.parse_failed",
                        json!({
                            "line": line_no,
                            "token": token,
                            "taps_dispatched": summary.taps.len(),
                        }),
                    );
                    return Err(TouchReplayError::Parse {
                        line: line_no,
                        token,
                    });
                }
            };

            if let Some(observer) = self.observer.as_mut() {
                observer(&tap)?;
            }
            match self.transport.send_tap(tap.x, tap.y) {
                Ok(()) => {
                    append_run_log(
                        "debug",
                        "replayer.tap.dispatched",
                        json!({ "line": line_no, "x": tap.x, "y": tap.y }),
                    );
                    summary.taps.push(DispatchedTap { line: line_no, tap });
                }
                Err(error) => {
                    let failure = TapFailure {
                        line: line_no,
                        tap,
                        reason: error.to_string(),
                    };
                    append_run_log(
                        "warn",
                        "replayer.tap.failed",
                        json!({
                            "line": line_no,
                            "x": tap.x,
                            "y": tap.y,
                            "reason": failure.reason,
                        }),
                    );
                    summary.failures.push(failure);
                }
            }
        }

        Ok(summary)
    }
}
