//! Timer coordinator: the single owner of a [`TimerEngine`].
//!
//! One tokio task owns the engine. Commands, settings changes and ticks are
//! all handled inside that task one at a time, so no tick can interleave
//! with a command. The tick interval only exists while the engine is
//! running; it is dropped as soon as a command or a completion leaves the
//! engine idle, and the engine discards any tick that reaches it while idle.
//!
//! ```ignore
//! let (handle, sessions, _task) = Coordinator::new(SystemClock::new(), store.snapshot())
//!     .with_settings_store(store.clone())
//!     .spawn();
//! spawn_recorder(session_store, sessions);
//! handle.start()?;
//! let mut state = handle.subscribe();
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::engine::{TimerEngine, TimerState};
use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::storage::{SessionRecord, SettingsSnapshot, SettingsStore};

/// How often a running timer is advanced.
pub const TICK_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug)]
enum Command {
    Start,
    Pause,
    Stop,
    SelectPreset { focus_minutes: u32, break_minutes: u32 },
    SetAutoStart(bool),
    ApplySettings(SettingsSnapshot),
    UseSettings,
    Shutdown,
}

/// Cheap, cloneable front door to a running coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<TimerState>,
}

impl CoordinatorHandle {
    pub fn start(&self) -> Result<()> {
        self.send(Command::Start)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    pub fn select_preset(&self, focus_minutes: u32, break_minutes: u32) -> Result<()> {
        self.send(Command::SelectPreset {
            focus_minutes,
            break_minutes,
        })
    }

    pub fn set_auto_start(&self, enabled: bool) -> Result<()> {
        self.send(Command::SetAutoStart(enabled))
    }

    /// Push a settings snapshot by hand. Not needed when the coordinator
    /// was built with a [`SettingsStore`].
    pub fn apply_settings(&self, snapshot: SettingsSnapshot) -> Result<()> {
        self.send(Command::ApplySettings(snapshot))
    }

    pub fn use_settings(&self) -> Result<()> {
        self.send(Command::UseSettings)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    /// Latest published state.
    pub fn state(&self) -> TimerState {
        self.state.borrow().clone()
    }

    /// The current state immediately, then every later snapshot.
    pub fn subscribe(&self) -> watch::Receiver<TimerState> {
        let mut rx = self.state.clone();
        rx.mark_changed();
        rx
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.commands
            .send(cmd)
            .map_err(|_| CoreError::CoordinatorClosed)
    }
}

/// Builder for the owner task. Nothing runs until [`Coordinator::spawn`].
pub struct Coordinator<C: Clock> {
    engine: TimerEngine,
    clock: C,
    store: Option<SettingsStore>,
    settings: Option<watch::Receiver<SettingsSnapshot>>,
    state_tx: watch::Sender<TimerState>,
}

impl<C: Clock> Coordinator<C> {
    pub fn new(clock: C, settings: SettingsSnapshot) -> Self {
        let engine = TimerEngine::new(settings);
        let (state_tx, _) = watch::channel(engine.snapshot());
        Self {
            engine,
            clock,
            store: None,
            settings: None,
            state_tx,
        }
    }

    /// Follow `store` for settings changes and persist auto-start toggles
    /// through it.
    pub fn with_settings_store(mut self, store: SettingsStore) -> Self {
        let mut rx = store.subscribe();
        let current = rx.borrow_and_update().clone();
        self.engine.apply_settings(current);
        self.state_tx.send_replace(self.engine.snapshot());
        self.settings = Some(rx);
        self.store = Some(store);
        self
    }

    /// Start the owner task.
    ///
    /// Returns the command handle, the stream of session records, and the
    /// task handle. The task ends on [`CoordinatorHandle::shutdown`] or once
    /// every handle is dropped, after pending auto-start writes finish.
    pub fn spawn(
        self,
    ) -> (
        CoordinatorHandle,
        mpsc::UnboundedReceiver<SessionRecord>,
        JoinHandle<()>,
    ) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();
        let handle = CoordinatorHandle {
            commands: commands_tx,
            state: self.state_tx.subscribe(),
        };

        let (writes_tx, writer) = match self.store {
            Some(store) => {
                let (tx, rx) = mpsc::unbounded_channel();
                (Some(tx), Some(spawn_settings_writer(store, rx)))
            }
            None => (None, None),
        };

        let owner = Owner {
            engine: self.engine,
            clock: self.clock,
            settings: self.settings,
            state_tx: self.state_tx,
            sessions_tx,
            writes_tx,
            ticker: None,
            last_tick_ms: 0,
        };
        let task = tokio::spawn(owner.run(commands_rx, writer));
        (handle, sessions_rx, task)
    }
}

/// State of the running owner task.
struct Owner<C: Clock> {
    engine: TimerEngine,
    clock: C,
    settings: Option<watch::Receiver<SettingsSnapshot>>,
    state_tx: watch::Sender<TimerState>,
    sessions_tx: mpsc::UnboundedSender<SessionRecord>,
    /// Auto-start values waiting to be written to the settings store.
    writes_tx: Option<mpsc::UnboundedSender<bool>>,
    ticker: Option<Interval>,
    /// Clock reading at the previous tick, or at `start` for the first one.
    last_tick_ms: u64,
}

impl<C: Clock> Owner<C> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        writer: Option<JoinHandle<()>>,
    ) {
        debug!("timer coordinator started");
        loop {
            tokio::select! {
                biased;
                cmd = commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle(cmd),
                },
                changed = next_settings(&mut self.settings) => match changed {
                    Some(snapshot) => self.handle(Command::ApplySettings(snapshot)),
                    None => {
                        warn!("settings store closed, no longer following changes");
                        self.settings = None;
                    }
                },
                _ = next_tick(&mut self.ticker) => self.on_tick(),
            }
        }
        self.ticker = None;

        // Closing the queue lets the writer finish what is already queued.
        self.writes_tx = None;
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                warn!("settings writer ended abnormally: {e}");
            }
        }
        debug!("timer coordinator stopped");
    }

    fn handle(&mut self, cmd: Command) {
        debug!(?cmd, "timer command");
        match cmd {
            Command::Start => {
                self.engine.start();
            }
            Command::Pause => {
                self.halt_ticker();
                self.engine.pause();
            }
            Command::Stop => {
                self.halt_ticker();
                let now = self.clock.epoch_ms();
                if let Some(record) = self.engine.stop(now) {
                    self.emit(record);
                }
            }
            Command::SelectPreset {
                focus_minutes,
                break_minutes,
            } => {
                self.halt_ticker();
                self.engine.select_preset(focus_minutes, break_minutes);
            }
            Command::SetAutoStart(enabled) => {
                self.engine.set_auto_start(enabled);
                self.persist_auto_start(enabled);
            }
            Command::ApplySettings(snapshot) => self.engine.apply_settings(snapshot),
            Command::UseSettings => {
                self.halt_ticker();
                self.engine.use_settings();
            }
            Command::Shutdown => {}
        }
        self.sync_ticker();
        self.publish();
    }

    fn on_tick(&mut self) {
        let now = self.clock.elapsed_ms();
        let delta = now.saturating_sub(self.last_tick_ms);
        self.last_tick_ms = now;
        if let Some(record) = self.engine.tick(delta, self.clock.epoch_ms()) {
            self.emit(record);
        }
        self.sync_ticker();
        self.publish();
    }

    fn halt_ticker(&mut self) {
        self.ticker = None;
    }

    /// Make the tick interval exist exactly while the engine is running.
    fn sync_ticker(&mut self) {
        match (self.engine.is_running(), self.ticker.is_some()) {
            (true, false) => {
                let mut interval = time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.ticker = Some(interval);
                self.last_tick_ms = self.clock.elapsed_ms();
            }
            (false, true) => self.ticker = None,
            _ => {}
        }
    }

    fn publish(&self) {
        let next = self.engine.snapshot();
        self.state_tx.send_if_modified(|current| {
            if *current != next {
                *current = next;
                true
            } else {
                false
            }
        });
    }

    fn emit(&self, record: SessionRecord) {
        info!(
            phase = record.phase.as_str(),
            minutes = record.duration_minutes,
            completed = record.completed,
            "session finished"
        );
        if self.sessions_tx.send(record).is_err() {
            debug!("no session receiver, record dropped");
        }
    }

    /// Queue the write; the owner task never waits on the filesystem.
    fn persist_auto_start(&self, enabled: bool) {
        if let Some(writes) = &self.writes_tx {
            if writes.send(enabled).is_err() {
                warn!("settings writer gone, auto-start not persisted");
            }
        }
    }
}

/// Apply auto-start writes one at a time, in the order they were queued.
/// Each write runs on the blocking pool.
fn spawn_settings_writer(
    store: SettingsStore,
    mut writes: mpsc::UnboundedReceiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(enabled) = writes.recv().await {
            let store = store.clone();
            match tokio::task::spawn_blocking(move || store.update_auto_start(enabled)).await {
                Ok(Ok(())) => debug!(enabled, "auto-start persisted"),
                Ok(Err(e)) => warn!("failed to persist auto-start setting: {e}"),
                Err(e) => warn!("auto-start write did not complete: {e}"),
            }
        }
    })
}

async fn next_tick(ticker: &mut Option<Interval>) -> Instant {
    match ticker {
        Some(interval) => interval.tick().await,
        None => std::future::pending().await,
    }
}

async fn next_settings(
    settings: &mut Option<watch::Receiver<SettingsSnapshot>>,
) -> Option<SettingsSnapshot> {
    match settings {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(rx.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}
