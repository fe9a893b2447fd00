//! Display codes and the relational priority table.
//!
//! Priority between displays is not a total order. Whether a requested
//! display may replace the current one depends on the pair, see
//! [`has_priority`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::drum::{DrumState, DRUM_COUNT};

/// Everything the sign can be asked to show.
///
/// The numeric codes are shared with every client of the annunciator, so
/// they are part of the wire contract and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayCode {
    /// Default view: the six drum stage/timer images
    Drums,
    /// Custom message, danger styling
    MsgDanger,
    /// Custom message, warning styling
    MsgWarning,
    /// Custom message, informational styling
    MsgInfo,
    /// Short-lived upstream notification
    Notify,
    /// Active gas/fire alarm
    Alert,
    /// Upstream link down
    Error,
}

impl DisplayCode {
    /// All display codes in numeric order.
    pub const ALL: [DisplayCode; 7] = [
        DisplayCode::Drums,
        DisplayCode::MsgDanger,
        DisplayCode::MsgWarning,
        DisplayCode::MsgInfo,
        DisplayCode::Notify,
        DisplayCode::Alert,
        DisplayCode::Error,
    ];

    /// Numeric wire code.
    pub fn code(self) -> u8 {
        match self {
            DisplayCode::Drums => 0,
            DisplayCode::MsgDanger => 1,
            DisplayCode::MsgWarning => 2,
            DisplayCode::MsgInfo => 3,
            DisplayCode::Notify => 4,
            DisplayCode::Alert => 5,
            DisplayCode::Error => 6,
        }
    }

    /// Display name, also used as the sign script and variable file name.
    pub fn name(self) -> &'static str {
        match self {
            DisplayCode::Drums => "drums",
            DisplayCode::MsgDanger => "danger",
            DisplayCode::MsgWarning => "warning",
            DisplayCode::MsgInfo => "info",
            DisplayCode::Notify => "notify",
            DisplayCode::Alert => "alert",
            DisplayCode::Error => "error",
        }
    }

    /// Parse a numeric code, accepting either the integer or its ASCII digit.
    pub fn from_code(code: u8) -> Option<Self> {
        let value = if code.is_ascii_digit() {
            code - b'0'
        } else {
            code
        };
        Self::ALL.into_iter().find(|display| display.code() == value)
    }

    /// Parse a display name, or the decimal string of its code.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if let Ok(value) = name.parse::<u8>() {
            return Self::ALL.into_iter().find(|display| display.code() == value);
        }
        Self::ALL
            .into_iter()
            .find(|display| display.name().eq_ignore_ascii_case(name))
    }

    /// Custom messages requested by clients (danger, warning, info).
    pub fn is_custom_message(self) -> bool {
        matches!(
            self,
            DisplayCode::MsgDanger | DisplayCode::MsgWarning | DisplayCode::MsgInfo
        )
    }

    /// Custom messages plus notifications.
    pub fn is_message_family(self) -> bool {
        self.is_custom_message() || self == DisplayCode::Notify
    }
}

impl fmt::Display for DisplayCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether `requested` may replace `current` on the sign.
///
/// - `Drums` only replaces `Error`.
/// - `Error` replaces `Drums` or `Alert`.
/// - Message-family displays replace anything except `Alert`.
/// - `Alert` always wins.
pub fn has_priority(current: DisplayCode, requested: DisplayCode) -> bool {
    match requested {
        DisplayCode::Alert => true,
        DisplayCode::Drums => current == DisplayCode::Error,
        DisplayCode::Error => matches!(current, DisplayCode::Drums | DisplayCode::Alert),
        DisplayCode::MsgDanger
        | DisplayCode::MsgWarning
        | DisplayCode::MsgInfo
        | DisplayCode::Notify => current != DisplayCode::Alert,
    }
}

/// The only view of display state handed to query clients.
///
/// Published whole by the lease holder, so a reader never observes a
/// display code paired with another display's message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySnapshot {
    pub display: DisplayCode,
    pub message: String,
    pub drums: [DrumState; DRUM_COUNT],
}

impl DisplaySnapshot {
    /// Snapshot of a freshly started annunciator.
    pub fn initial() -> Self {
        Self {
            display: DisplayCode::Drums,
            message: String::new(),
            drums: DrumState::all_unset(),
        }
    }
}

impl Default for DisplaySnapshot {
    fn default() -> Self {
        Self::initial()
    }
}
