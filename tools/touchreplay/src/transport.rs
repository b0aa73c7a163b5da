//! Device transport adapter: streams raw input events from, and sends
//! synthetic taps to, a device through an external bridge executable.

use crate::config::DeviceConfig;
use crate::errors::TouchReplayError;
use crate::logging::append_run_log;
use crate::runtime::{LineStream, ProcessRequest, ProcessRunner};
use serde_json::json;

pub use crate::runtime::{StreamEnd, StreamPoll};

/// Capabilities the recorder and replayer need from a device.
pub trait DeviceTransport {
    /// Open a fresh event stream for `device_path`.
    fn stream_lines(&self, device_path: &str) -> Result<Box<dyn LineStream>, TouchReplayError>;
    /// Send one tap. Never retried by callers.
    fn send_tap(&self, x: u32, y: u32) -> Result<(), TouchReplayError>;
}

/// `adb`-style bridge driven through a [`ProcessRunner`].
pub struct AdbTransport<'a> {
    runner: &'a dyn ProcessRunner,
    program: String,
    serial: Option<String>,
}

impl<'a> AdbTransport<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
            serial: None,
        }
    }

    pub fn from_config(runner: &'a dyn ProcessRunner, device: &DeviceConfig) -> Self {
        Self {
            runner,
            program: device.bridge_program.clone(),
            serial: device.serial.clone(),
        }
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    fn request<I, S>(&self, shell_args: I) -> ProcessRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = Vec::new();
        if let Some(serial) = &self.serial {
            args.push("-s".to_string());
            args.push(serial.clone());
        }
        args.push("shell".to_string());
        args.extend(shell_args.into_iter().map(Into::into));
        ProcessRequest {
            program: self.program.clone(),
            args,
            cwd: None,
        }
    }
}

impl DeviceTransport for AdbTransport<'_> {
    fn stream_lines(&self, device_path: &str) -> Result<Box<dyn LineStream>, TouchReplayError> {
        let request = self.request(["getevent", "-l", device_path]);
        append_run_log(
            "debug",
            "transport.stream.opening",
            json!({
                "program": request.program,
                "args": request.args,
            }),
        );
        self.runner.stream_lines(request)
    }

    fn send_tap(&self, x: u32, y: u32) -> Result<(), TouchReplayError> {
        let (x_arg, y_arg) = (x.to_string(), y.to_string());
        let output = self
            .runner
            .run(self.request(["input", "tap", x_arg.as_str(), y_arg.as_str()]))?;
        if output.exit_code == 0 {
            return Ok(());
        }
        let detail = if output.stderr.trim().is_empty() {
            output.stdout.trim()
        } else {
            output.stderr.trim()
        };
        append_run_log(
            "warn",
            "transport.tap.rejected",
            json!({
                "x": x,
                "y": y,
                "exit_code": output.exit_code,
                "detail": detail,
            }),
        );
        Err(TouchReplayError::Transport(format!(
            "{} input tap exited with {}: {detail}",
            self.program, output.exit_code
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{FakeProcessRunner, ProcessOutput, ScriptedLineStream};
    use std::time::Duration;

    fn output(exit_code: i32, stdout: &str, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn send_tap_shells_out_to_input_tap() {
        let runner = FakeProcessRunner::default();
        runner.push_response(Ok(output(0, "", "")));
        AdbTransport::new(&runner, "adb")
            .send_tap(100, 150)
            .expect("tap");
        let requests = runner.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].program, "adb");
        assert_eq!(requests[0].args, vec!["shell", "input", "tap", "100", "150"]);
    }

    #[test]
    fn serial_selects_the_device() {
        let runner = FakeProcessRunner::default();
        runner.push_response(Ok(output(0, "", "")));
        AdbTransport::new(&runner, "adb")
            .with_serial("emulator-5554")
            .send_tap(1, 2)
            .expect("tap");
        assert_eq!(
            runner.requests()[0].args,
            vec!["-s", "emulator-5554", "shell", "input", "tap", "1", "2"]
        );
    }

    #[test]
    fn non_zero_exit_is_a_transport_error_with_detail() {
        let runner = FakeProcessRunner::default();
        runner.push_response(Ok(output(1, "", "error: no devices/emulators found\n")));
        let err = AdbTransport::new(&runner, "adb")
            .send_tap(5, 6)
            .expect_err("rejected");
        match err {
            TouchReplayError::Transport(message) => {
                assert!(message.contains("no devices/emulators found"), "{message}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn stdout_is_used_when_stderr_is_empty() {
        let runner = FakeProcessRunner::default();
        runner.push_response(Ok(output(255, "Error: Unknown command\n", "")));
        let err = AdbTransport::new(&runner, "adb")
            .send_tap(5, 6)
            .expect_err("rejected");
        assert!(err.to_string().contains("Unknown command"));
    }

    #[test]
    fn stream_runs_getevent_for_the_device() {
        let runner = FakeProcessRunner::default();
        runner.push_stream(ScriptedLineStream::from_lines(["line\n"]));
        let mut stream = AdbTransport::new(&runner, "adb")
            .stream_lines("/dev/input/event3")
            .expect("stream");
        assert_eq!(
            stream.next_line(Duration::ZERO),
            StreamPoll::Line("line\n".to_string())
        );
        assert_eq!(
            runner.requests()[0].args,
            vec!["shell", "getevent", "-l", "/dev/input/event3"]
        );
    }
}
