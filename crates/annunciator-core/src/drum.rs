//! Drum positions, cut-cycle stages and timers.

use std::fmt;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Number of tracked drum positions.
pub const DRUM_COUNT: usize = 6;

/// Timestamp format used by the upstream source for timer starts.
pub const TIMER_START_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One of the six fixed drum slots, `1A..3B`, with a stable index 0-5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DrumPosition {
    D1A,
    D1B,
    D2A,
    D2B,
    D3A,
    D3B,
}

impl DrumPosition {
    /// Every position in index order.
    pub const ALL: [DrumPosition; DRUM_COUNT] = [
        DrumPosition::D1A,
        DrumPosition::D1B,
        DrumPosition::D2A,
        DrumPosition::D2B,
        DrumPosition::D3A,
        DrumPosition::D3B,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Operator-facing label, e.g. `2B`.
    pub fn label(self) -> &'static str {
        match self {
            DrumPosition::D1A => "1A",
            DrumPosition::D1B => "1B",
            DrumPosition::D2A => "2A",
            DrumPosition::D2B => "2B",
            DrumPosition::D3A => "3A",
            DrumPosition::D3B => "3B",
        }
    }
}

impl fmt::Display for DrumPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Cut-cycle stage of a drum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageCode {
    Online,
    Switch,
    Steam,
    Quench,
    Vent,
    Drain,
    Cut,
    O2Free,
    PressTest,
    Prewarm,
    /// Stage not known (startup, link down)
    Unset,
}

impl StageCode {
    const ALL: [StageCode; 11] = [
        StageCode::Online,
        StageCode::Switch,
        StageCode::Steam,
        StageCode::Quench,
        StageCode::Vent,
        StageCode::Drain,
        StageCode::Cut,
        StageCode::O2Free,
        StageCode::PressTest,
        StageCode::Prewarm,
        StageCode::Unset,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Text rendered in the drum's stage image.
    pub fn label(self) -> &'static str {
        match self {
            StageCode::Online => "ONLINE",
            StageCode::Switch => "SWITCH",
            StageCode::Steam => "STEAM",
            StageCode::Quench => "QUENCH",
            StageCode::Vent => "VENT",
            StageCode::Drain => "DRAIN",
            StageCode::Cut => "CUTTING",
            StageCode::O2Free => "O2 FREE",
            StageCode::PressTest => "PRESS TEST",
            StageCode::Prewarm => "PREWARM",
            StageCode::Unset => "",
        }
    }

    /// Phrase used when announcing a stage change, e.g. `is now venting`.
    pub fn announcement(self) -> &'static str {
        match self {
            StageCode::Online => "is now online",
            StageCode::Switch => "is now switching",
            StageCode::Steam => "is now steaming",
            StageCode::Quench => "is now quenching",
            StageCode::Vent => "is now venting",
            StageCode::Drain => "is now draining",
            StageCode::Cut => "is now cutting",
            StageCode::O2Free => "is now oxygen freeing",
            StageCode::PressTest => "is now pressure testing",
            StageCode::Prewarm => "is now prewarming",
            StageCode::Unset => "stage is unknown",
        }
    }

    /// Cutting drums are flagged red on the intercom panel.
    pub fn is_cutting(self) -> bool {
        self == StageCode::Cut
    }
}

/// Kind of countdown attached to a drum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimerKind {
    #[default]
    None,
    /// Isolation valve closing countdown
    Iso,
}

impl TimerKind {
    pub fn code(self) -> u8 {
        match self {
            TimerKind::None => 0,
            TimerKind::Iso => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TimerKind::None),
            1 => Some(TimerKind::Iso),
            _ => None,
        }
    }

    pub fn is_active(self) -> bool {
        self != TimerKind::None
    }
}

/// Countdown record for one drum. Fields other than `kind` are meaningless
/// while `kind` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Timer {
    pub kind: TimerKind,
    pub start: Option<NaiveDateTime>,
    pub duration_minutes: u32,
    pub details: String,
}

impl Timer {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.kind.is_active()
    }

    /// Time left at `now`: `duration - (now - start)`, floored at zero.
    pub fn remaining(&self, now: NaiveDateTime) -> Duration {
        let Some(start) = self.start else {
            return Duration::ZERO;
        };
        let total = chrono::Duration::minutes(i64::from(self.duration_minutes));
        (total - (now - start)).to_std().unwrap_or(Duration::ZERO)
    }

    /// Start timestamp in the upstream format, empty when unknown.
    pub fn start_text(&self) -> String {
        self.start
            .map(|start| start.format(TIMER_START_FORMAT).to_string())
            .unwrap_or_default()
    }
}

/// Stage and timer for one position. While a timer is active it governs the
/// drum's image; the stage is only shown once the timer clears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrumState {
    pub position: DrumPosition,
    pub stage: StageCode,
    pub timer: Timer,
}

impl DrumState {
    pub fn unset(position: DrumPosition) -> Self {
        Self {
            position,
            stage: StageCode::Unset,
            timer: Timer::none(),
        }
    }

    pub fn all_unset() -> [DrumState; DRUM_COUNT] {
        DrumPosition::ALL.map(DrumState::unset)
    }
}
