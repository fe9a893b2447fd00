//! Alarm flags and the text shown while an alert is active.

use serde::{Deserialize, Serialize};

/// Physical zone an active alarm was raised on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Deck {
    #[default]
    None,
    Switch,
    Cut,
    Both,
}

impl Deck {
    pub fn code(self) -> u8 {
        match self {
            Deck::None => 0,
            Deck::Switch => 1,
            Deck::Cut => 2,
            Deck::Both => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Deck::None),
            1 => Some(Deck::Switch),
            2 => Some(Deck::Cut),
            3 => Some(Deck::Both),
            _ => None,
        }
    }

    /// Text written to the sign's deck variable.
    pub fn label(self) -> &'static str {
        match self {
            Deck::None => "",
            Deck::Switch => "SWITCH",
            Deck::Cut => "CUT",
            Deck::Both => "SWITCH & CUT",
        }
    }
}

/// Latest alarm flags reported upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlarmState {
    pub h2s: bool,
    pub lel: bool,
    pub fire: bool,
    pub deck: Deck,
}

impl AlarmState {
    pub fn any_active(&self) -> bool {
        self.fire || self.h2s || self.lel
    }

    /// Human-readable list of active alarms, fire first.
    ///
    /// Items are joined with `, ` except the last pair which uses ` & `, and
    /// the text always ends in a single space: `"FIRE, H2S & LEL "`. An empty
    /// string means no alarm is active.
    pub fn active_list(&self) -> String {
        let active: Vec<&str> = [(self.fire, "FIRE"), (self.h2s, "H2S"), (self.lel, "LEL")]
            .into_iter()
            .filter_map(|(on, name)| on.then_some(name))
            .collect();

        match active.split_last() {
            None => String::new(),
            Some((only, [])) => format!("{only} "),
            Some((last, rest)) => format!("{} & {last} ", rest.join(", ")),
        }
    }

    /// Full alert line for an active-alarm list, e.g.
    /// `"FIRE & H2S detected on SWITCH deck"`.
    pub fn alert_message(&self, active_list: &str) -> String {
        match self.deck {
            Deck::None => format!("{active_list}detected"),
            deck => format!("{active_list}detected on {} deck", deck.label()),
        }
    }
}
