//! Process-wide display record.

use annunciator_core::{AlarmState, DisplayCode, DisplaySnapshot, DrumState, DRUM_COUNT};

/// What the sign and intercom currently show, as last confirmed by the
/// device. Only reachable through a [`crate::LeaseGuard`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    pub current_display: DisplayCode,
    /// Custom/notify text, the full alert line, or the link-down text
    pub current_message: String,
    pub drums: [DrumState; DRUM_COUNT],
    pub alarms: AlarmState,
    /// Cleared after the first drum batch; stage announcements are muted
    /// until then
    pub booting: bool,
}

impl DisplayState {
    pub fn new() -> Self {
        Self {
            current_display: DisplayCode::Drums,
            current_message: String::new(),
            drums: DrumState::all_unset(),
            alarms: AlarmState::default(),
            booting: true,
        }
    }

    pub fn snapshot(&self) -> DisplaySnapshot {
        DisplaySnapshot {
            display: self.current_display,
            message: self.current_message.clone(),
            drums: self.drums.clone(),
        }
    }
}

impl Default for DisplayState {
    fn default() -> Self {
        Self::new()
    }
}
