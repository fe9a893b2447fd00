//! Semantic sign commands.
//!
//! The bridge in front of the sign owns the byte-level command syntax. We
//! only describe what should change: which script plays and what each
//! variable file contains.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignColor {
    White,
    Green,
    Amber,
    Red,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SignCommand {
    /// Stop the script currently playing
    Reset,
    /// Start a named script
    PlayScript { script: String },
    /// Replace a text variable file, one entry per line
    WriteText {
        variable: String,
        lines: Vec<String>,
        color: Option<SignColor>,
    },
    /// Replace a drum image with a stage label
    WriteStage {
        variable: String,
        label: String,
        color: SignColor,
    },
    /// Replace a drum image with a countdown
    WriteCountdown {
        variable: String,
        caption: String,
        seconds: u64,
    },
}

impl SignCommand {
    /// Short name used in logs and device errors.
    pub fn name(&self) -> &'static str {
        match self {
            SignCommand::Reset => "reset",
            SignCommand::PlayScript { .. } => "play_script",
            SignCommand::WriteText { .. } => "write_text",
            SignCommand::WriteStage { .. } => "write_stage",
            SignCommand::WriteCountdown { .. } => "write_countdown",
        }
    }
}
