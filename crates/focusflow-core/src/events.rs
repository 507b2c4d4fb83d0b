use serde::{Deserialize, Serialize};

use crate::timer::Phase;

/// Transient notification attached to a timer snapshot.
///
/// The UI shows it once (a toast, or an offer to open the break view) and it
/// is cleared by the next user-initiated command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    /// An interval ran to zero and the next one was set up.
    PhaseComplete { from: Phase, to: Phase },
    /// The user stopped the timer and the countdown was reset.
    SessionStopped,
    /// A focus/break preset replaced the configured durations.
    PresetSelected {
        focus_minutes: u32,
        break_minutes: u32,
    },
    /// The timer was reset to the stored settings.
    UsingCustomSettings,
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::PhaseComplete { from, .. } if from.is_break() => "Break over".into(),
            Notice::PhaseComplete { .. } => "Session complete".into(),
            Notice::SessionStopped => "Session stopped".into(),
            Notice::PresetSelected {
                focus_minutes,
                break_minutes,
            } => format!("Preset set to {focus_minutes}/{break_minutes}"),
            Notice::UsingCustomSettings => "Using custom settings".into(),
        }
    }

    /// Whether the UI should offer the break coaching view.
    pub fn offers_break_view(&self) -> bool {
        matches!(self, Notice::PhaseComplete { to, .. } if to.is_break())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_messages_depend_on_direction() {
        let focus_done = Notice::PhaseComplete {
            from: Phase::Focus,
            to: Phase::ShortBreak,
        };
        let break_done = Notice::PhaseComplete {
            from: Phase::LongBreak,
            to: Phase::Focus,
        };
        assert_eq!(focus_done.message(), "Session complete");
        assert!(focus_done.offers_break_view());
        assert_eq!(break_done.message(), "Break over");
        assert!(!break_done.offers_break_view());
    }

    #[test]
    fn notice_serializes_with_type_tag() {
        let json = serde_json::to_value(Notice::PresetSelected {
            focus_minutes: 50,
            break_minutes: 10,
        })
        .unwrap();
        assert_eq!(json["type"], "preset_selected");
        assert_eq!(json["focus_minutes"], 50);
    }
}
