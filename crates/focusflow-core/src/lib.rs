//! # FocusFlow Core Library
//!
//! This library provides the core logic for the FocusFlow focus/break
//! interval timer. The `focusflow` CLI binary is a thin terminal layer over
//! the same library.
//!
//! ## Architecture
//!
//! - **Timer Engine**: A wall-clock-delta state machine with no threads or
//!   clock access of its own
//! - **Timer Coordinator**: A single tokio task that owns the engine, drives
//!   it with a periodic tick and publishes state snapshots
//! - **Storage**: TOML settings with a change stream, SQLite session log
//! - **Stats**: Weekly totals and streaks over the session log
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Core timer state machine
//! - [`Coordinator`]: Owner task and its [`CoordinatorHandle`]
//! - [`SettingsStore`]: Settings persistence and change notifications
//! - [`SessionStore`]: Session record persistence

pub mod clock;
pub mod error;
pub mod events;
pub mod stats;
pub mod storage;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, DatabaseError, Result};
pub use events::Notice;
pub use stats::WeeklyStats;
pub use storage::{
    spawn_recorder, AlertSettings, Config, SessionRecord, SessionStore, SettingsSnapshot,
    SettingsStore,
};
pub use timer::{Coordinator, CoordinatorHandle, Phase, TimerEngine, TimerState};
