use crate::errors::TouchReplayError;
use crate::runtime::Terminal;

pub const MENU_TITLE: &str = "==== TOUCH RECORD & REPLAY ====";
pub const MENU_PROMPT: &str = "Select (1/2): ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Record,
    Replay,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::Replay => "replay",
        }
    }

    pub fn parse(answer: &str) -> Option<Self> {
        match answer.trim().to_ascii_lowercase().as_str() {
            "1" | "record" => Some(Self::Record),
            "2" | "replay" => Some(Self::Replay),
            _ => None,
        }
    }
}

/// Show the mode menu and read one choice. `None` for an invalid or missing answer.
pub fn prompt_mode(terminal: &dyn Terminal) -> Result<Option<Mode>, TouchReplayError> {
    terminal.write_line(MENU_TITLE)?;
    terminal.write_line("1. Record touch events")?;
    terminal.write_line("2. Replay recorded touches")?;
    let answer = terminal.prompt(MENU_PROMPT)?;
    Ok(answer.as_deref().and_then(Mode::parse))
}
