use crate::errors::TouchReplayError;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// How a line stream finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    Eof,
    Failed(String),
}

/// Result of waiting on a [`LineStream`] for one slice of time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPoll {
    /// One line, terminator included when the source sent one.
    Line(String),
    /// Nothing arrived within the wait.
    Idle,
    Ended(StreamEnd),
}

/// A blocking, cancellable source of text lines.
pub trait LineStream: Send {
    fn next_line(&mut self, wait: Duration) -> StreamPoll;
    /// Stop the source and release it. Safe to call more than once.
    fn close(&mut self);
}

pub trait ProcessRunner: Send + Sync {
    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, TouchReplayError>;
    fn stream_lines(
        &self,
        request: ProcessRequest,
    ) -> Result<Box<dyn LineStream>, TouchReplayError>;
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, TouchReplayError>;
}

pub trait Terminal: Send + Sync {
    fn write_line(&self, line: &str) -> Result<(), TouchReplayError>;
    /// Show `prompt` and read one answer. `None` at end of input.
    fn prompt(&self, prompt: &str) -> Result<Option<String>, TouchReplayError>;
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, TouchReplayError> {
        std::fs::read_to_string(path)
            .map_err(|e| TouchReplayError::Io(format!("{}: {e}", path.display())))
    }
}

pub struct ProductionProcessRunner;

impl ProductionProcessRunner {
    fn command(request: &ProcessRequest) -> Command {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args);
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }
}

impl ProcessRunner for ProductionProcessRunner {
    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, TouchReplayError> {
        let output = Self::command(&request)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| TouchReplayError::Transport(format!("{}: {e}", request.program)))?;
        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn stream_lines(
        &self,
        request: ProcessRequest,
    ) -> Result<Box<dyn LineStream>, TouchReplayError> {
        let mut child = Self::command(&request)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TouchReplayError::Transport(format!("{}: {e}", request.program)))?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TouchReplayError::Transport(format!("{}: stdout not captured", request.program))
        })?;
        let stderr = child.stderr.take();

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            loop {
                let mut buf = Vec::new();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => {
                        let _ = tx.send(ReaderMessage::Eof);
                        break;
                    }
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf).into_owned();
                        if tx.send(ReaderMessage::Line(line)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(ReaderMessage::Failed(e.to_string()));
                        break;
                    }
                }
            }
        });
        let stderr_reader = stderr.map(|mut stderr| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text);
                text
            })
        });

        Ok(Box::new(ChildLineStream {
            program: request.program,
            child: Some(child),
            lines: rx,
            stderr_reader,
            ended: None,
        }))
    }
}

enum ReaderMessage {
    Line(String),
    Eof,
    Failed(String),
}

/// Line stream over a child's stdout, fed by a reader thread.
pub struct ChildLineStream {
    program: String,
    child: Option<Child>,
    lines: Receiver<ReaderMessage>,
    stderr_reader: Option<JoinHandle<String>>,
    ended: Option<StreamEnd>,
}

impl ChildLineStream {
    fn finish(&mut self, reader_error: Option<String>) -> StreamEnd {
        let status = self.child.take().map(|mut child| child.wait());
        let stderr = self
            .stderr_reader
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        let end = match (reader_error, status) {
            (Some(error), _) => StreamEnd::Failed(format!("{}: {error}", self.program)),
            (None, Some(Ok(status))) if status.success() => StreamEnd::Eof,
            (None, Some(Ok(status))) => StreamEnd::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                status.code().unwrap_or(-1),
                stderr.trim()
            )),
            (None, Some(Err(e))) => StreamEnd::Failed(format!("{}: {e}", self.program)),
            (None, None) => StreamEnd::Eof,
        };
        self.ended = Some(end.clone());
        end
    }
}

impl LineStream for ChildLineStream {
    fn next_line(&mut self, wait: Duration) -> StreamPoll {
        if let Some(end) = &self.ended {
            return StreamPoll::Ended(end.clone());
        }
        match self.lines.recv_timeout(wait) {
            Ok(ReaderMessage::Line(line)) => StreamPoll::Line(line),
            Ok(ReaderMessage::Eof) => StreamPoll::Ended(self.finish(None)),
            Ok(ReaderMessage::Failed(error)) => StreamPoll::Ended(self.finish(Some(error))),
            Err(RecvTimeoutError::Timeout) => StreamPoll::Idle,
            Err(RecvTimeoutError::Disconnected) => StreamPoll::Ended(
                self.finish(Some("line reader disconnected".to_string())),
            ),
        }
    }

    fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if self.ended.is_none() {
            self.ended = Some(StreamEnd::Eof);
        }
    }
}

impl Drop for ChildLineStream {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn write_line(&self, line: &str) -> Result<(), TouchReplayError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| TouchReplayError::Io(e.to_string()))
    }

    fn prompt(&self, prompt: &str) -> Result<Option<String>, TouchReplayError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        write!(out, "{prompt}").map_err(|e| TouchReplayError::Io(e.to_string()))?;
        out.flush().map_err(|e| TouchReplayError::Io(e.to_string()))?;
        let mut answer = String::new();
        let read = std::io::stdin()
            .read_line(&mut answer)
            .map_err(|e| TouchReplayError::Io(e.to_string()))?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(answer))
    }
}

pub struct ProductionRuntime {
    pub file_system: Arc<dyn FileSystem>,
    pub process_runner: Arc<dyn ProcessRunner>,
    pub terminal: Arc<dyn Terminal>,
}

impl ProductionRuntime {
    pub fn new() -> Self {
        Self {
            file_system: Arc::new(ProductionFileSystem),
            process_runner: Arc::new(ProductionProcessRunner),
            terminal: Arc::new(ProductionTerminal),
        }
    }
}

impl Default for ProductionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<std::collections::HashMap<PathBuf, String>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
        fs
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, TouchReplayError> {
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .cloned()
            .ok_or_else(|| TouchReplayError::Io(format!("missing file {}", path.display())))
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    answers: Arc<Mutex<VecDeque<String>>>,
    writes: Arc<Mutex<Vec<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl FakeTerminal {
    pub fn with_answers<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let terminal = Self::default();
        terminal
            .answers
            .lock()
            .expect("answers lock")
            .extend(answers.into_iter().map(Into::into));
        terminal
    }

    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().expect("writes lock").clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

impl Terminal for FakeTerminal {
    fn write_line(&self, line: &str) -> Result<(), TouchReplayError> {
        self.writes
            .lock()
            .expect("writes lock")
            .push(line.to_string());
        Ok(())
    }

    fn prompt(&self, prompt: &str) -> Result<Option<String>, TouchReplayError> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        Ok(self.answers.lock().expect("answers lock").pop_front())
    }
}

enum ScriptStep {
    Poll(StreamPoll),
    Run(Box<dyn FnOnce() + Send>),
}

/// Line stream that plays back a fixed script, then reports `Eof`.
pub struct ScriptedLineStream {
    steps: VecDeque<ScriptStep>,
    closes: Arc<AtomicUsize>,
}

impl Default for ScriptedLineStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLineStream {
    pub fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lines
            .into_iter()
            .fold(Self::new(), |stream, line| stream.line(line))
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.steps
            .push_back(ScriptStep::Poll(StreamPoll::Line(line.into())));
        self
    }

    pub fn idle(mut self) -> Self {
        self.steps.push_back(ScriptStep::Poll(StreamPoll::Idle));
        self
    }

    pub fn end(mut self, end: StreamEnd) -> Self {
        self.steps.push_back(ScriptStep::Poll(StreamPoll::Ended(end)));
        self
    }

    /// Run `hook` when the script reaches this point, before the next poll returns.
    pub fn then(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.steps.push_back(ScriptStep::Run(Box::new(hook)));
        self
    }

    /// Shared counter of `close` calls, readable after the stream is handed off.
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }
}

impl LineStream for ScriptedLineStream {
    fn next_line(&mut self, _wait: Duration) -> StreamPoll {
        loop {
            match self.steps.pop_front() {
                Some(ScriptStep::Run(hook)) => hook(),
                Some(ScriptStep::Poll(poll)) => return poll,
                None => return StreamPoll::Ended(StreamEnd::Eof),
            }
        }
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default, Clone)]
pub struct FakeProcessRunner {
    responses: Arc<Mutex<VecDeque<Result<ProcessOutput, TouchReplayError>>>>,
    streams: Arc<Mutex<VecDeque<ScriptedLineStream>>>,
    requests: Arc<Mutex<Vec<ProcessRequest>>>,
}

impl FakeProcessRunner {
    pub fn push_response(&self, output: Result<ProcessOutput, TouchReplayError>) {
        self.responses
            .lock()
            .expect("responses lock")
            .push_back(output);
    }

    pub fn push_stream(&self, stream: ScriptedLineStream) {
        self.streams.lock().expect("streams lock").push_back(stream);
    }

    pub fn requests(&self) -> Vec<ProcessRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl ProcessRunner for FakeProcessRunner {
    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, TouchReplayError> {
        self.requests.lock().expect("requests lock").push(request);
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| {
                Err(TouchReplayError::Transport(
                    "no fake response queued".to_string(),
                ))
            })
    }

    fn stream_lines(
        &self,
        request: ProcessRequest,
    ) -> Result<Box<dyn LineStream>, TouchReplayError> {
        self.requests.lock().expect("requests lock").push(request);
        let stream = self
            .streams
            .lock()
            .expect("streams lock")
            .pop_front()
            .ok_or_else(|| TouchReplayError::Transport("no fake stream queued".to_string()))?;
        Ok(Box::new(stream))
    }
}
