use serde::{Deserialize, Serialize};

use crate::storage::SettingsSnapshot;

pub const MS_PER_MINUTE: u64 = 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Focus,
    ShortBreak,
    LongBreak,
}

impl Phase {
    pub fn is_break(self) -> bool {
        !matches!(self, Phase::Focus)
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Focus => "Focus",
            Phase::ShortBreak => "Short Break",
            Phase::LongBreak => "Long Break",
        }
    }

    /// Storage key, also accepted by [`Phase::parse`].
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Focus => "focus",
            Phase::ShortBreak => "short_break",
            Phase::LongBreak => "long_break",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "focus" => Some(Phase::Focus),
            "short_break" => Some(Phase::ShortBreak),
            "long_break" => Some(Phase::LongBreak),
            _ => None,
        }
    }

    /// Configured length of this phase in minutes, never below 1.
    pub fn minutes(self, settings: &SettingsSnapshot) -> u32 {
        let min = match self {
            Phase::Focus => settings.focus_minutes,
            Phase::ShortBreak => settings.short_break_minutes,
            Phase::LongBreak => settings.long_break_minutes,
        };
        min.max(1)
    }

    pub fn duration_ms(self, settings: &SettingsSnapshot) -> u64 {
        minutes_to_ms(self.minutes(settings))
    }
}

/// Uses saturating arithmetic to prevent overflow with large values.
pub fn minutes_to_ms(minutes: u32) -> u64 {
    (minutes as u64).saturating_mul(MS_PER_MINUTE)
}

/// Decide what follows `current`.
///
/// `completed_focus` is the number of focus intervals finished since the last
/// long break. Returns the next phase and the updated counter.
pub fn next_phase(
    current: Phase,
    completed_focus: u32,
    settings: &SettingsSnapshot,
) -> (Phase, u32) {
    match current {
        Phase::Focus => {
            let every = settings.long_break_every.max(1);
            let done = completed_focus.saturating_add(1);
            if done % every == 0 {
                (Phase::LongBreak, 0)
            } else {
                (Phase::ShortBreak, done)
            }
        }
        Phase::ShortBreak | Phase::LongBreak => (Phase::Focus, completed_focus),
    }
}
