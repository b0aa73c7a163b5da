//! Recording: copy a live device event stream into an event log.

use crate::cancel::CancellationToken;
use crate::errors::TouchReplayError;
use crate::logging::append_run_log;
use crate::replay::recording::{EventLine, EventLogWriter};
use crate::runtime::{LineStream, StreamEnd, StreamPoll};
use crate::transport::DeviceTransport;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordTermination {
    /// Stopped by the cancellation token.
    Cancelled,
    /// The device stream ended cleanly.
    StreamEnded,
    /// The bridge died; lines written before it did remain valid.
    TransportLost(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSummary {
    pub log_path: PathBuf,
    pub lines_written: u64,
    pub bytes_written: u64,
    /// `BTN_TOUCH DOWN` lines seen.
    pub touches: u64,
    pub termination: RecordTermination,
}

impl RecordSummary {
    pub fn is_partial(&self) -> bool {
        matches!(self.termination, RecordTermination::TransportLost(_))
    }
}

pub struct Recorder<'a> {
    transport: &'a dyn DeviceTransport,
    poll_interval: Duration,
}

impl<'a> Recorder<'a> {
    /// `poll_interval` bounds how long a cancellation can go unnoticed.
    pub fn new(transport: &'a dyn DeviceTransport, poll_interval: Duration) -> Self {
        Self {
            transport,
            poll_interval,
        }
    }

    /// Record `device_path` into `log_path` until the stream ends or `cancel` fires.
    ///
    /// The log is opened before the device stream, so an unwritable path fails
    /// without touching the device.
    pub fn record(
        &self,
        device_path: &str,
        log_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<RecordSummary, TouchReplayError> {
        let mut log = EventLogWriter::create(log_path)?;
        let mut stream = self.transport.stream_lines(device_path)?;
        append_run_log(
            "info",
            "recorder.started",
            json!({
                "device": device_path,
                "log_path": log_path.display().to_string(),
            }),
        );

        let pumped = self.pump(stream.as_mut(), &mut log, cancel);
        stream.close();
        let (termination, touches) = match pumped {
            Ok(done) => done,
            Err(error) => {
                append_run_log(
                    "error",
                    "recorder.write_failed",
                    json!({
                        "lines_written": log.lines_written(),
                        "error": error.to_string(),
                    }),
                );
                return Err(error);
            }
        };
        let (lines_written, bytes_written) = log.finish()?;

        let summary = RecordSummary {
            log_path: log_path.to_path_buf(),
            lines_written,
            bytes_written,
            touches,
            termination,
        };
        append_run_log(
            if summary.is_partial() { "warn" } else { "info" },
            "recorder.finished",
            json!({
                "lines_written": summary.lines_written,
                "touches": summary.touches,
                "termination": format!("{:?}", summary.termination),
            }),
        );
        Ok(summary)
    }

    fn pump(
        &self,
        stream: &mut dyn LineStream,
        log: &mut EventLogWriter,
        cancel: &CancellationToken,
    ) -> Result<(RecordTermination, u64), TouchReplayError> {
        let mut touches = 0;
        // An unterminated line is held until the stream shows it was final.
        let mut fragment: Option<String> = None;
        loop {
            if cancel.is_cancelled() {
                return Ok((RecordTermination::Cancelled, touches));
            }
            match stream.next_line(self.poll_interval) {
                StreamPoll::Line(line) => {
                    if let Some(held) = fragment.take() {
                        write_line(log, &held, &mut touches)?;
                    }
                    if line.ends_with('\n') {
                        write_line(log, &line, &mut touches)?;
                    } else {
                        fragment = Some(line);
                    }
                }
                StreamPoll::Idle => {}
                // An interrupt also reaches the bridge, which may exit before
                // the token is observed.
                StreamPoll::Ended(_) if cancel.is_cancelled() => {
                    return Ok((RecordTermination::Cancelled, touches));
                }
                StreamPoll::Ended(StreamEnd::Eof) => {
                    if let Some(held) = fragment.take() {
                        write_line(log, &held, &mut touches)?;
                    }
                    return Ok((RecordTermination::StreamEnded, touches));
                }
                StreamPoll::Ended(StreamEnd::Failed(reason)) => {
                    return Ok((RecordTermination::TransportLost(reason), touches));
                }
            }
        }
    }
}

fn write_line(
    log: &mut EventLogWriter,
    line: &str,
    touches: &mut u64,
) -> Result<(), TouchReplayError> {
    log.append(line)?;
    if EventLine::classify(line) == EventLine::TouchDown {
        *touches += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{FakeProcessRunner, ScriptedLineStream};
    use crate::transport::AdbTransport;
    use std::sync::atomic::Ordering;

    const POLL: Duration = Duration::from_millis(5);

    #[test]
    fn copies_stream_verbatim_until_eof() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.txt");
        let runner = FakeProcessRunner::default();
        let stream = ScriptedLineStream::new()
            .line("/dev/input/event8: EV_KEY       BTN_TOUCH            DOWN\r\n")
            .idle()
            .line("/dev/input/event8: EV_KEY       BTN_TOUCH            UP\r\n")
            .line("tail-without-newline");
        let closes = stream.close_counter();
        runner.push_stream(stream);
        let transport = AdbTransport::new(&runner, "adb");

        let summary = Recorder::new(&transport, POLL)
            .record("/dev/input/event8", &path, &CancellationToken::new())
            .expect("record");

        assert_eq!(summary.termination, RecordTermination::StreamEnded);
        assert_eq!(summary.lines_written, 3);
        assert_eq!(summary.touches, 1);
        assert!(!summary.is_partial());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            "/dev/input/event8: EV_KEY       BTN_TOUCH            DOWN\r\n\
             /dev/input/event8: EV_KEY       BTN_TOUCH            UP\r\n\
             tail-without-newline"
        );
    }

    #[test]
    fn cancellation_stops_before_next_line_and_flushes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.txt");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let runner = FakeProcessRunner::default();
        let stream = ScriptedLineStream::new()
            .line("first\n")
            .then(move || trigger.cancel())
            .idle()
            .line("never written\n");
        let closes = stream.close_counter();
        runner.push_stream(stream);
        let transport = AdbTransport::new(&runner, "adb");

        let summary = Recorder::new(&transport, POLL)
            .record("/dev/input/event8", &path, &cancel)
            .expect("record");

        assert_eq!(summary.termination, RecordTermination::Cancelled);
        assert_eq!(summary.lines_written, 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "first\n");
    }

    #[test]
    fn transport_loss_is_a_partial_recording() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.txt");
        let runner = FakeProcessRunner::default();
        runner.push_stream(
            ScriptedLineStream::from_lines(["a\n", "b\n"])
                .end(StreamEnd::Failed("error: device offline".to_string())),
        );
        let transport = AdbTransport::new(&runner, "adb");

        let summary = Recorder::new(&transport, POLL)
            .record("/dev/input/event8", &path, &CancellationToken::new())
            .expect("partial recording is not an error");

        assert!(summary.is_partial());
        assert_eq!(
            summary.termination,
            RecordTermination::TransportLost("error: device offline".to_string())
        );
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "a\nb\n");
    }

    #[test]
    fn unopenable_log_fails_before_opening_the_stream() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = FakeProcessRunner::default();
        runner.push_stream(ScriptedLineStream::from_lines(["a\n"]));
        let transport = AdbTransport::new(&runner, "adb");

        let err = Recorder::new(&transport, POLL)
            .record("/dev/input/event8", dir.path(), &CancellationToken::new())
            .expect_err("directory is not a log file");

        assert!(matches!(err, TouchReplayError::Storage(_)));
        assert!(runner.requests().is_empty());
    }

    #[test]
    fn bridge_that_cannot_start_is_a_transport_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = FakeProcessRunner::default();
        let transport = AdbTransport::new(&runner, "adb");

        let err = Recorder::new(&transport, POLL)
            .record(
                "/dev/input/event8",
                &dir.path().join("events.txt"),
                &CancellationToken::new(),
            )
            .expect_err("no stream queued");

        assert!(matches!(err, TouchReplayError::Transport(_)));
    }

    #[test]
    fn already_cancelled_token_records_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.txt");
        let runner = FakeProcessRunner::default();
        runner.push_stream(ScriptedLineStream::from_lines(["a\n"]));
        let transport = AdbTransport::new(&runner, "adb");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = Recorder::new(&transport, POLL)
            .record("/dev/input/event8", &path, &cancel)
            .expect("record");

        assert_eq!(summary.lines_written, 0);
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "");
    }

    #[test]
    fn fragment_cut_off_by_cancellation_is_dropped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.txt");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let runner = FakeProcessRunner::default();
        runner.push_stream(
            ScriptedLineStream::new()
                .line("EV_KEY BTN_TOUCH DOWN\n")
                .then(move || trigger.cancel())
                .line("/dev/input/event8: EV_ABS ABS_MT_POSI")
                .end(StreamEnd::Failed("killed by signal".to_string())),
        );
        let transport = AdbTransport::new(&runner, "adb");

        let summary = Recorder::new(&transport, POLL)
            .record("/dev/input/event8", &path, &cancel)
            .expect("record");

        assert_eq!(summary.termination, RecordTermination::Cancelled);
        assert_eq!(summary.lines_written, 1);
        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            "EV_KEY BTN_TOUCH DOWN\n"
        );
    }

    #[test]
    fn fragment_before_transport_loss_is_dropped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.txt");
        let runner = FakeProcessRunner::default();
        runner.push_stream(
            ScriptedLineStream::from_lines(["a\n", "EV_ABS ABS_MT_POSITION_X 000"])
                .end(StreamEnd::Failed("error: device offline".to_string())),
        );
        let transport = AdbTransport::new(&runner, "adb");

        let summary = Recorder::new(&transport, POLL)
            .record("/dev/input/event8", &path, &CancellationToken::new())
            .expect("record");

        assert!(summary.is_partial());
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "a\n");
    }
}
