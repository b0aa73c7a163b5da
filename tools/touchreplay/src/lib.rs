pub mod cancel;
pub mod config;
pub mod errors;
pub mod logging;
pub mod menu;
pub mod replay;
pub mod runtime;
pub mod transport;

use cancel::{install_interrupt_handler, CancellationToken};
use clap::{error::ErrorKind, CommandFactory, Parser, ValueEnum};
use config::{load_config, AppConfig, CliOverrides};
use errors::TouchReplayError;
use logging::{init_run_logger, JsonlLogger};
use menu::{prompt_mode, Mode};
use replay::recorder::{RecordTermination, Recorder};
use replay::replayer::Replayer;
use runtime::ProductionRuntime;
use transport::AdbTransport;

/// Exit code for an unrecognised menu choice.
pub const EXIT_INVALID_OPTION: i32 = 2;

#[derive(Debug, Clone, Parser)]
#[command(name = "touchreplay")]
#[command(about = "Record touchscreen events from a device and replay them as taps")]
pub struct Cli {
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,
    /// Input device to record, e.g. /dev/input/event8
    #[arg(long)]
    pub device: Option<String>,
    /// Event log written by record and read by replay
    #[arg(long)]
    pub events: Option<std::path::PathBuf>,
    /// Bridge device serial, passed as `-s <serial>`
    #[arg(long)]
    pub serial: Option<String>,
    /// Skip the interactive menu
    #[arg(long, value_enum)]
    pub mode: Option<CliMode>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliMode {
    Record,
    Replay,
}

impl From<CliMode> for Mode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Record => Mode::Record,
            CliMode::Replay => Mode::Replay,
        }
    }
}

pub fn run() -> Result<i32, TouchReplayError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| TouchReplayError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    let cancel = CancellationToken::new();
    run_with_runtime(&args, &cwd, &runtime, &cancel, install_interrupt_handler)
}

/// Parse `args`, pick a mode and run it against `runtime`.
///
/// `on_record` is called with `cancel` just before recording starts; the
/// binary uses it to hook Ctrl-C to the token.
pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    cwd: &std::path::Path,
    runtime: &ProductionRuntime,
    cancel: &CancellationToken,
    on_record: impl FnOnce(CancellationToken) -> Result<(), TouchReplayError>,
) -> Result<i32, TouchReplayError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(TouchReplayError::Cli(error.to_string())),
        },
    };

    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        event_path: cli.device.clone(),
        log_path: cli.events.clone(),
        serial: cli.serial.clone(),
    };
    let cfg = load_config(&overrides, cwd, runtime.file_system.as_ref())?;

    if let Some(path) = &cfg.logging.run_log_path {
        let mut logger = JsonlLogger::new(path);
        logger.max_payload_bytes = cfg.logging.max_payload_bytes;
        init_run_logger(logger);
    }

    let mode = match cli.mode {
        Some(mode) => Some(mode.into()),
        None => prompt_mode(runtime.terminal.as_ref())?,
    };
    let Some(mode) = mode else {
        runtime.terminal.write_line("Invalid option")?;
        return Ok(EXIT_INVALID_OPTION);
    };

    match mode {
        Mode::Record => {
            on_record(cancel.clone())?;
            run_record(runtime, &cfg, cancel).map_err(|e| e.in_phase(mode.as_str()))
        }
        Mode::Replay => run_replay(runtime, &cfg).map_err(|e| e.in_phase(mode.as_str())),
    }
}

fn run_record(
    runtime: &ProductionRuntime,
    cfg: &AppConfig,
    cancel: &CancellationToken,
) -> Result<i32, TouchReplayError> {
    let terminal = runtime.terminal.as_ref();
    terminal.write_line("")?;
    terminal.write_line("[RECORD MODE]")?;
    terminal.write_line(&format!(
        "Recording touch events from {}...",
        cfg.device.event_path
    ))?;
    terminal.write_line("Press CTRL + C to stop")?;
    terminal.write_line("")?;

    let transport = AdbTransport::from_config(runtime.process_runner.as_ref(), &cfg.device);
    let recorder = Recorder::new(&transport, cfg.recording.poll_interval());
    let summary = recorder.record(&cfg.device.event_path, &cfg.recording.log_path, cancel)?;

    if let RecordTermination::TransportLost(reason) = &summary.termination {
        terminal.write_line(&format!(
            "Device stream lost, recording is partial: {reason}"
        ))?;
    }
    terminal.write_line(&format!(
        "Saved {} lines ({} touches) to {}",
        summary.lines_written,
        summary.touches,
        summary.log_path.display()
    ))?;
    Ok(0)
}

fn run_replay(runtime: &ProductionRuntime, cfg: &AppConfig) -> Result<i32, TouchReplayError> {
    let terminal = runtime.terminal.as_ref();
    terminal.write_line("")?;
    terminal.write_line("[REPLAY MODE]")?;
    terminal.write_line(&format!(
        "Replaying {} using {} input tap",
        cfg.recording.log_path.display(),
        cfg.device.bridge_program
    ))?;
    terminal.write_line("")?;

    let transport = AdbTransport::from_config(runtime.process_runner.as_ref(), &cfg.device);
    let summary = Replayer::new(&transport)
        .with_observer(|tap| terminal.write_line(&format!("Tap at ({}, {})", tap.x, tap.y)))
        .replay(&cfg.recording.log_path)?;

    for failure in &summary.failures {
        terminal.write_line(&format!("replay: {}", failure.to_error()))?;
    }
    terminal.write_line(&format!(
        "Replayed {} of {} taps from {} lines",
        summary.taps.len(),
        summary.taps_attempted(),
        summary.lines_read
    ))?;
    Ok(if summary.failures.is_empty() { 0 } else { 1 })
}

pub fn render_help() -> String {
    Cli::command().render_long_help().to_string()
}
