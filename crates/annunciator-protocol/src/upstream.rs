//! Messages exchanged with the upstream process-data source.
//!
//! One cycle is: `DATA_REQUEST` -> [`UpstreamResponse`] -> `ACK`/`NAK`, each
//! carried in one frame. Responses are validated into core types before
//! anything is applied, so a malformed response never half-updates state.

use std::time::Duration;

use annunciator_core::drum::TIMER_START_FORMAT;
use annunciator_core::{
    AlarmState, AnnunciatorError, Deck, DrumPosition, DrumState, StageCode, Timer, TimerKind,
    DRUM_COUNT,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Notification code meaning "nothing to show".
pub const NO_NOTIFICATION: &str = "NNN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MsgType {
    DataRequest,
    Ack,
    Nak,
}

/// Message sent to the upstream source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMsg {
    pub msg: MsgType,
    /// Code of the notification shown during this cycle, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_notify: Option<String>,
}

impl ClientMsg {
    pub fn data_request() -> Self {
        Self {
            msg: MsgType::DataRequest,
            received_notify: None,
        }
    }

    pub fn ack(received_notify: Option<String>) -> Self {
        Self {
            msg: MsgType::Ack,
            received_notify,
        }
    }

    pub fn nak(received_notify: Option<String>) -> Self {
        Self {
            msg: MsgType::Nak,
            received_notify,
        }
    }
}

/// Alarm flags as sent upstream. Missing fields are a validation failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmsMsg {
    #[serde(default)]
    pub h2s: Option<bool>,
    #[serde(default)]
    pub lel: Option<bool>,
    #[serde(default)]
    pub fire: Option<bool>,
    #[serde(default)]
    pub deck: Option<u8>,
}

impl AlarmsMsg {
    pub fn validate(&self) -> Result<AlarmState, AnnunciatorError> {
        let missing = |field: &str| AnnunciatorError::validation(format!("alarm flag {field} missing"));
        let deck = self.deck.ok_or_else(|| missing("deck"))?;

        Ok(AlarmState {
            h2s: self.h2s.ok_or_else(|| missing("h2s"))?,
            lel: self.lel.ok_or_else(|| missing("lel"))?,
            fire: self.fire.ok_or_else(|| missing("fire"))?,
            deck: Deck::from_code(deck)
                .ok_or_else(|| AnnunciatorError::validation(format!("unknown deck code {deck}")))?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerMsg {
    #[serde(rename = "type", default)]
    pub kind: u8,
    #[serde(default)]
    pub start: String,
    /// Minutes
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub details: String,
}

impl TimerMsg {
    /// Fields other than the kind are ignored while no timer is active.
    pub fn validate(&self) -> Result<Timer, AnnunciatorError> {
        let kind = TimerKind::from_code(self.kind).ok_or_else(|| {
            AnnunciatorError::validation(format!("unknown timer type {}", self.kind))
        })?;
        if !kind.is_active() {
            return Ok(Timer::none());
        }

        let start = NaiveDateTime::parse_from_str(&self.start, TIMER_START_FORMAT).map_err(|e| {
            AnnunciatorError::validation(format!("bad timer start {:?}: {e}", self.start))
        })?;
        Ok(Timer {
            kind,
            start: Some(start),
            duration_minutes: self.duration,
            details: self.details.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrumMsg {
    pub stage: u8,
    #[serde(default)]
    pub timer: TimerMsg,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct DrumsMsg {
    pub d1a: DrumMsg,
    pub d1b: DrumMsg,
    pub d2a: DrumMsg,
    pub d2b: DrumMsg,
    pub d3a: DrumMsg,
    pub d3b: DrumMsg,
}

impl DrumsMsg {
    fn in_order(&self) -> [&DrumMsg; DRUM_COUNT] {
        [
            &self.d1a, &self.d1b, &self.d2a, &self.d2b, &self.d3a, &self.d3b,
        ]
    }

    /// Validate all six records. Fails as a whole on the first bad record.
    pub fn validate(&self) -> Result<[DrumState; DRUM_COUNT], AnnunciatorError> {
        let mut states = DrumState::all_unset();
        for (state, msg) in states.iter_mut().zip(self.in_order()) {
            state.stage = StageCode::from_code(msg.stage).ok_or_else(|| {
                AnnunciatorError::validation(format!(
                    "unknown stage code {} for drum {}",
                    msg.stage, state.position
                ))
            })?;
            state.timer = msg.timer.validate()?;
        }
        Ok(states)
    }

    /// Build the wire form of a set of drum states.
    pub fn from_states(states: &[DrumState; DRUM_COUNT]) -> Self {
        let msg = |position: DrumPosition| {
            let state = &states[position.index()];
            DrumMsg {
                stage: state.stage.code(),
                timer: TimerMsg {
                    kind: state.timer.kind.code(),
                    start: state.timer.start_text(),
                    duration: state.timer.duration_minutes,
                    details: state.timer.details.clone(),
                },
            }
        };
        Self {
            d1a: msg(DrumPosition::D1A),
            d1b: msg(DrumPosition::D1B),
            d2a: msg(DrumPosition::D2A),
            d2b: msg(DrumPosition::D2B),
            d3a: msg(DrumPosition::D3A),
            d3b: msg(DrumPosition::D3B),
        }
    }
}

/// Optional notification attached to a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyMsg {
    pub code: String,
    /// Text for the sign
    #[serde(default)]
    pub sign_msg: String,
    /// Text for the intercom speech host
    #[serde(default)]
    pub ts_msg: String,
    /// Seconds the notification stays on the sign
    #[serde(default)]
    pub display_time: u64,
}

impl NotifyMsg {
    pub fn none() -> Self {
        Self {
            code: NO_NOTIFICATION.to_string(),
            sign_msg: String::new(),
            ts_msg: String::new(),
            display_time: 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.code.is_empty() && self.code != NO_NOTIFICATION
    }

    pub fn display_duration(&self) -> Duration {
        Duration::from_secs(self.display_time)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamResponse {
    #[serde(default)]
    pub is_valid: bool,
    #[serde(default)]
    pub alarms: AlarmsMsg,
    #[serde(default)]
    pub drums: DrumsMsg,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify: Option<NotifyMsg>,
}

impl UpstreamResponse {
    /// Notification to show this cycle, if one is pending.
    pub fn pending_notification(&self) -> Option<&NotifyMsg> {
        self.notify.as_ref().filter(|notify| notify.is_pending())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "is_valid": true,
            "alarms": {"h2s": true, "lel": false, "fire": true, "deck": 1},
            "drums": {
                "D1A": {"stage": 6, "timer": {"type": 0}},
                "D1B": {"stage": 0},
                "D2A": {"stage": 4, "timer": {"type": 1, "start": "2024-03-01T10:00:00", "duration": 15, "details": "V-101"}},
                "D2B": {"stage": 10},
                "D3A": {"stage": 2},
                "D3B": {"stage": 9}
            },
            "notify": {"code": "N01", "sign_msg": "Shift change", "ts_msg": "Shift change", "display_time": 10}
        }"#
    }

    #[test]
    fn client_messages_use_upper_snake_tags() {
        let json = serde_json::to_string(&ClientMsg::data_request()).unwrap();
        assert_eq!(json, r#"{"msg":"DATA_REQUEST"}"#);

        let json = serde_json::to_string(&ClientMsg::ack(Some("N01".into()))).unwrap();
        assert_eq!(json, r#"{"msg":"ACK","received_notify":"N01"}"#);
    }

    #[test]
    fn validates_full_response() {
        let response: UpstreamResponse = serde_json::from_str(sample_json()).unwrap();
        assert!(response.is_valid);

        let alarms = response.alarms.validate().unwrap();
        assert!(alarms.fire && alarms.h2s && !alarms.lel);
        assert_eq!(alarms.deck, Deck::Switch);

        let drums = response.drums.validate().unwrap();
        assert_eq!(drums[0].stage, StageCode::Cut);
        assert_eq!(drums[3].stage, StageCode::Unset);
        assert_eq!(drums[2].timer.kind, TimerKind::Iso);
        assert_eq!(drums[2].timer.duration_minutes, 15);
        assert_eq!(drums[2].timer.start_text(), "2024-03-01T10:00:00");
        assert!(!drums[0].timer.is_active());

        let notify = response.pending_notification().unwrap();
        assert_eq!(notify.display_duration(), Duration::from_secs(10));
    }

    #[test]
    fn missing_alarm_flag_is_a_validation_error() {
        let alarms = AlarmsMsg {
            h2s: Some(false),
            lel: None,
            fire: Some(false),
            deck: Some(0),
        };
        assert!(matches!(
            alarms.validate(),
            Err(AnnunciatorError::Validation(_))
        ));
    }

    #[test]
    fn unknown_codes_are_rejected() {
        let mut drums = DrumsMsg::default();
        drums.d3b.stage = 42;
        assert!(drums.validate().is_err());

        let mut drums = DrumsMsg::default();
        drums.d1a.timer = TimerMsg {
            kind: 1,
            start: "yesterday".into(),
            duration: 5,
            details: String::new(),
        };
        assert!(drums.validate().is_err());
    }

    #[test]
    fn placeholder_notification_is_not_pending() {
        let response = UpstreamResponse {
            notify: Some(NotifyMsg::none()),
            ..Default::default()
        };
        assert!(response.pending_notification().is_none());
    }

    #[test]
    fn drum_states_survive_wire_form() {
        let response: UpstreamResponse = serde_json::from_str(sample_json()).unwrap();
        let states = response.drums.validate().unwrap();
        assert_eq!(DrumsMsg::from_states(&states).validate().unwrap(), states);
    }
}
