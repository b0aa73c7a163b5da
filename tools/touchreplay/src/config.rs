use crate::errors::TouchReplayError;
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub event_path: Option<String>,
    pub log_path: Option<PathBuf>,
    pub serial: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub recording: RecordingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceConfig {
    pub event_path: String,
    pub bridge_program: String,
    pub serial: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordingConfig {
    pub log_path: PathBuf,
    pub poll_interval_ms: u64,
}

impl RecordingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub run_log_path: Option<PathBuf>,
    pub max_payload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig {
                event_path: "/dev/input/event8".to_string(),
                bridge_program: "adb".to_string(),
                serial: None,
            },
            recording: RecordingConfig {
                log_path: PathBuf::from("events.txt"),
                poll_interval_ms: 100,
            },
            logging: LoggingConfig {
                run_log_path: None,
                max_payload_bytes: crate::logging::DEFAULT_MAX_PAYLOAD_BYTES,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialAppConfig {
    device: Option<PartialDeviceConfig>,
    recording: Option<PartialRecordingConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialDeviceConfig {
    event_path: Option<String>,
    bridge_program: Option<String>,
    serial: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialRecordingConfig {
    log_path: Option<PathBuf>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialLoggingConfig {
    run_log_path: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
}

/// Build the effective config: defaults, then the config file, then CLI flags.
///
/// Relative paths are resolved against `process_cwd`.
pub fn load_config(
    overrides: &CliOverrides,
    process_cwd: &Path,
    fs: &dyn FileSystem,
) -> Result<AppConfig, TouchReplayError> {
    let mut cfg = AppConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(&absolutize_path(process_cwd, path))?;
        let partial: PartialAppConfig = toml::from_str(&file_contents)
            .map_err(|e| TouchReplayError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;

    cfg.recording.log_path = absolutize_path(process_cwd, &cfg.recording.log_path);
    cfg.logging.run_log_path = cfg
        .logging
        .run_log_path
        .as_ref()
        .map(|path| absolutize_path(process_cwd, path));
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(device) = partial.device {
        if let Some(value) = device.event_path {
            cfg.device.event_path = value;
        }
        if let Some(value) = device.bridge_program {
            cfg.device.bridge_program = value;
        }
        if let Some(value) = device.serial {
            cfg.device.serial = Some(value);
        }
    }

    if let Some(recording) = partial.recording {
        if let Some(value) = recording.log_path {
            cfg.recording.log_path = value;
        }
        if let Some(value) = recording.poll_interval_ms {
            cfg.recording.poll_interval_ms = value;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(value) = logging.run_log_path {
            cfg.logging.run_log_path = Some(value);
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(event_path) = &overrides.event_path {
        cfg.device.event_path = event_path.clone();
    }
    if let Some(log_path) = &overrides.log_path {
        cfg.recording.log_path = log_path.clone();
    }
    if let Some(serial) = &overrides.serial {
        cfg.device.serial = Some(serial.clone());
    }
}

fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

fn validate_config(cfg: &AppConfig) -> Result<(), TouchReplayError> {
    if cfg.device.event_path.trim().is_empty() {
        return Err(TouchReplayError::InvalidConfig(
            "device.event_path must not be empty".to_string(),
        ));
    }
    if cfg.device.bridge_program.trim().is_empty() {
        return Err(TouchReplayError::InvalidConfig(
            "device.bridge_program must not be empty".to_string(),
        ));
    }
    if cfg.device.serial.as_deref().is_some_and(|s| s.trim().is_empty()) {
        return Err(TouchReplayError::InvalidConfig(
            "device.serial must not be blank when set".to_string(),
        ));
    }
    if cfg.recording.log_path.as_os_str().is_empty() {
        return Err(TouchReplayError::InvalidConfig(
            "recording.log_path must not be empty".to_string(),
        ));
    }
    if cfg.recording.poll_interval_ms == 0 {
        return Err(TouchReplayError::InvalidConfig(
            "recording.poll_interval_ms must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
