//! Timer engine implementation.
//!
//! The timer engine is a wall-clock-based state machine. It does not use
//! internal threads or read the clock itself - every command that can emit
//! a session record takes the current epoch time, and `tick()` takes the
//! elapsed delta measured by the caller.
//!
//! ## State Transitions
//!
//! ```text
//! Idle(phase) --start--> Running(phase) --pause/stop--> Idle(phase)
//! Running(phase) --tick to zero--> Running(next) | Idle(next)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = TimerEngine::new(SettingsSnapshot::default());
//! engine.start();
//! // In a loop:
//! if let Some(record) = engine.tick(delta_ms, now_ms) { /* persist */ }
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::phase::{minutes_to_ms, next_phase, Phase};
use crate::events::Notice;
use crate::storage::{SessionRecord, SettingsSnapshot};

/// Stopping with this much elapsed time or less records nothing.
pub const ABORT_THRESHOLD_MS: u64 = 5_000;

/// Immutable view of the timer handed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub phase: Phase,
    pub total_ms: u64,
    pub remaining_ms: u64,
    pub is_running: bool,
    pub auto_start_next: bool,
    pub completed_focus_since_long_break: u32,
    pub today_session_count: u32,
    pub today_minutes: u64,
    pub focus_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub long_break_every: u32,
    /// Bumped whenever a fresh interval begins. `remaining_ms` only ever
    /// grows across a change of this value.
    pub interval_seq: u64,
    pub notice: Option<Notice>,
}

impl TimerState {
    pub fn elapsed_ms(&self) -> u64 {
        self.total_ms - self.remaining_ms
    }

    /// 0.0 .. 1.0 progress within the current interval.
    pub fn progress(&self) -> f64 {
        if self.total_ms == 0 {
            return 0.0;
        }
        1.0 - (self.remaining_ms as f64 / self.total_ms as f64)
    }
}

/// Core timer engine.
///
/// Operates on wall-clock deltas -- no internal thread.
/// The caller is responsible for calling `tick()` periodically.
#[derive(Debug, Clone)]
pub struct TimerEngine {
    /// Last snapshot received from the settings store.
    applied: SettingsSnapshot,
    /// Durations and auto-start flag currently in effect. Differs from
    /// `applied` after a preset or an explicit auto-start toggle.
    active: SettingsSnapshot,
    phase: Phase,
    total_ms: u64,
    remaining_ms: u64,
    running: bool,
    completed_focus: u32,
    today_sessions: u32,
    today_minutes: u64,
    interval_seq: u64,
    notice: Option<Notice>,
    last_record_id: i64,
}

impl TimerEngine {
    /// Create an idle engine at the start of a focus interval.
    pub fn new(settings: SettingsSnapshot) -> Self {
        let settings = settings.clamped();
        let total_ms = Phase::Focus.duration_ms(&settings);
        Self {
            applied: settings.clone(),
            active: settings,
            phase: Phase::Focus,
            total_ms,
            remaining_ms: total_ms,
            running: false,
            completed_focus: 0,
            today_sessions: 0,
            today_minutes: 0,
            interval_seq: 0,
            notice: None,
            last_record_id: 0,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    pub fn total_ms(&self) -> u64 {
        self.total_ms
    }

    /// Settings currently in effect, including preset overrides.
    pub fn active_settings(&self) -> &SettingsSnapshot {
        &self.active
    }

    /// Build a full state snapshot.
    pub fn snapshot(&self) -> TimerState {
        TimerState {
            phase: self.phase,
            total_ms: self.total_ms,
            remaining_ms: self.remaining_ms,
            is_running: self.running,
            auto_start_next: self.active.auto_start_next,
            completed_focus_since_long_break: self.completed_focus,
            today_session_count: self.today_sessions,
            today_minutes: self.today_minutes,
            focus_minutes: self.active.focus_minutes,
            short_break_minutes: self.active.short_break_minutes,
            long_break_minutes: self.active.long_break_minutes,
            long_break_every: self.active.long_break_every,
            interval_seq: self.interval_seq,
            notice: self.notice,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Returns `false` when already running.
    pub fn start(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        self.notice = None;
        true
    }

    /// Returns `false` when not running. The remaining time is kept.
    pub fn pause(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        self.notice = None;
        true
    }

    /// Stop and rewind the current interval.
    ///
    /// Returns an aborted session record when more than
    /// [`ABORT_THRESHOLD_MS`] had elapsed.
    pub fn stop(&mut self, now_ms: i64) -> Option<SessionRecord> {
        self.running = false;
        let elapsed = self.total_ms - self.remaining_ms;
        let record = if elapsed > ABORT_THRESHOLD_MS {
            let minutes = (elapsed / 60_000).max(1);
            Some(SessionRecord {
                id: self.next_record_id(now_ms),
                start_time_ms: now_ms.saturating_sub(elapsed as i64),
                duration_minutes: minutes.min(u32::MAX as u64) as u32,
                phase: self.phase,
                completed: false,
            })
        } else {
            None
        };
        self.rewind_interval();
        self.notice = Some(Notice::SessionStopped);
        record
    }

    /// Switch to a fresh focus interval with local focus/break durations.
    /// The stored settings are left untouched.
    pub fn select_preset(&mut self, focus_minutes: u32, break_minutes: u32) {
        self.running = false;
        self.active.focus_minutes = focus_minutes.max(1);
        self.active.short_break_minutes = break_minutes.max(1);
        self.begin_interval(Phase::Focus);
        self.notice = Some(Notice::PresetSelected {
            focus_minutes: self.active.focus_minutes,
            break_minutes: self.active.short_break_minutes,
        });
    }

    pub fn set_auto_start(&mut self, enabled: bool) {
        self.active.auto_start_next = enabled;
        self.notice = None;
    }

    /// Apply a snapshot pushed by the settings store.
    ///
    /// The auto-start flag always follows the snapshot. Durations are only
    /// taken when they differ from the previous snapshot, so an echo of an
    /// auto-start toggle keeps any preset in place. A running countdown
    /// keeps its total and remaining time; when idle, new durations reset
    /// the timer to a fresh focus interval.
    ///
    /// An idle snapshot that changes nothing but the auto-start flag does
    /// not reset the countdown. This narrowing keeps a paused interval
    /// intact when the store echoes back a [`TimerEngine::set_auto_start`]
    /// toggle.
    pub fn apply_settings(&mut self, snapshot: SettingsSnapshot) {
        let snapshot = snapshot.clamped();
        let durations_changed = !self.applied.same_durations(&snapshot);
        self.applied = snapshot.clone();

        if !durations_changed {
            self.active.auto_start_next = snapshot.auto_start_next;
            return;
        }

        self.active = snapshot;
        if !self.running {
            debug!(
                focus_minutes = self.active.focus_minutes,
                "settings changed while idle, resetting to focus"
            );
            self.begin_interval(Phase::Focus);
        }
    }

    /// Drop any preset and restart from the stored settings.
    pub fn use_settings(&mut self) {
        self.running = false;
        self.active = self.applied.clone();
        self.begin_interval(Phase::Focus);
        self.notice = Some(Notice::UsingCustomSettings);
    }

    /// Advance the countdown by `delta_ms`.
    ///
    /// Returns the completed session record when the interval hits zero.
    /// Ticks arriving while idle are discarded.
    pub fn tick(&mut self, delta_ms: u64, now_ms: i64) -> Option<SessionRecord> {
        if !self.running {
            return None;
        }
        self.remaining_ms = self.remaining_ms.saturating_sub(delta_ms);
        if self.remaining_ms > 0 {
            return None;
        }
        Some(self.complete_interval(now_ms))
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn complete_interval(&mut self, now_ms: i64) -> SessionRecord {
        let finished = self.phase;
        let minutes = (self.total_ms / 60_000).max(1);
        let record = SessionRecord {
            id: self.next_record_id(now_ms),
            start_time_ms: now_ms.saturating_sub(self.total_ms as i64),
            duration_minutes: minutes.min(u32::MAX as u64) as u32,
            phase: finished,
            completed: true,
        };

        if finished == Phase::Focus {
            self.today_sessions = self.today_sessions.saturating_add(1);
            self.today_minutes = self.today_minutes.saturating_add(minutes);
        }
        let (next, count) = next_phase(finished, self.completed_focus, &self.active);
        self.completed_focus = count;
        self.begin_interval(next);
        self.running = self.active.auto_start_next;
        self.notice = Some(Notice::PhaseComplete {
            from: finished,
            to: next,
        });
        debug!(
            from = finished.as_str(),
            to = next.as_str(),
            auto_start = self.running,
            "interval complete"
        );
        record
    }

    /// Restart the current interval at its own length, which may differ from
    /// the durations now in effect.
    fn rewind_interval(&mut self) {
        self.remaining_ms = self.total_ms;
        self.interval_seq = self.interval_seq.wrapping_add(1);
    }

    fn begin_interval(&mut self, phase: Phase) {
        self.phase = phase;
        self.total_ms = minutes_to_ms(phase.minutes(&self.active));
        self.remaining_ms = self.total_ms;
        self.interval_seq = self.interval_seq.wrapping_add(1);
    }

    /// Time-derived, strictly increasing within this engine.
    fn next_record_id(&mut self, now_ms: i64) -> i64 {
        let id = now_ms.max(self.last_record_id.saturating_add(1));
        self.last_record_id = id;
        id
    }
}
