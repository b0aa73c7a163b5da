use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TouchReplayError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("parse error at line {line}: invalid coordinate token {token:?}")]
    Parse { line: usize, token: String },
    #[error("tap ({x}, {y}) from line {line} failed: {reason}")]
    TapFailed {
        line: usize,
        x: u32,
        y: u32,
        reason: String,
    },
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("{phase} failed: {source}")]
    Phase {
        phase: &'static str,
        source: Box<TouchReplayError>,
    },
}

impl TouchReplayError {
    /// Tag an error with the pass (`record` / `replay`) it came from.
    pub fn in_phase(self, phase: &'static str) -> Self {
        Self::Phase {
            phase,
            source: Box::new(self),
        }
    }
}
