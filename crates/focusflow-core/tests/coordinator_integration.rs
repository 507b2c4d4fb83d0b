//! Integration tests for the timer coordinator.
//!
//! Drives a real coordinator on tokio's paused clock, wired to an in-memory
//! settings store and session database, and checks what observers and the
//! session log see.

use std::time::Duration;

use focusflow_core::{
    spawn_recorder, Config, Coordinator, ManualClock, Notice, Phase, SessionStore,
    SettingsSnapshot, SettingsStore, SystemClock,
};

const MIN: u64 = 60_000;

#[tokio::test(start_paused = true)]
async fn test_preset_focus_interval_runs_to_short_break() {
    let db = SessionStore::open_memory().unwrap();
    let (handle, sessions, _task) =
        Coordinator::new(SystemClock::new(), SettingsSnapshot::default()).spawn();
    let recorder = spawn_recorder(db.clone(), sessions);

    handle.select_preset(25, 5).unwrap();
    handle.start().unwrap();

    let mut rx = handle.subscribe();
    let state = rx
        .wait_for(|s| s.phase == Phase::ShortBreak)
        .await
        .unwrap()
        .clone();
    assert_eq!(state.total_ms, 300_000);
    assert_eq!(state.remaining_ms, 300_000);
    assert!(!state.is_running);
    assert_eq!(state.today_session_count, 1);
    assert_eq!(state.today_minutes, 25);
    assert_eq!(
        state.notice,
        Some(Notice::PhaseComplete {
            from: Phase::Focus,
            to: Phase::ShortBreak
        })
    );

    handle.shutdown().unwrap();
    recorder.await.unwrap();

    let records = db.list().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].phase, Phase::Focus);
    assert!(records[0].completed);
    assert_eq!(records[0].duration_minutes, 25);
}

#[tokio::test(start_paused = true)]
async fn test_timer_stays_idle_after_completion_without_auto_start() {
    let (handle, _sessions, _task) = Coordinator::new(
        SystemClock::new(),
        SettingsSnapshot {
            focus_minutes: 1,
            ..SettingsSnapshot::default()
        },
    )
    .spawn();
    handle.start().unwrap();
    let mut rx = handle.subscribe();
    rx.wait_for(|s| s.phase == Phase::ShortBreak).await.unwrap();

    tokio::time::sleep(Duration::from_secs(120)).await;
    let state = handle.state();
    assert_eq!(state.phase, Phase::ShortBreak);
    assert!(!state.is_running);
    assert_eq!(state.remaining_ms, 5 * MIN);
}

#[tokio::test(start_paused = true)]
async fn test_auto_start_propagates_into_break() {
    let store = SettingsStore::in_memory(Config {
        timer: SettingsSnapshot {
            focus_minutes: 2,
            auto_start_next: true,
            ..SettingsSnapshot::default()
        },
        ..Config::default()
    });
    let (handle, mut sessions, _task) = Coordinator::new(SystemClock::new(), store.snapshot())
        .with_settings_store(store.clone())
        .spawn();

    handle.start().unwrap();
    let mut rx = handle.subscribe();
    let state = rx
        .wait_for(|s| s.phase == Phase::ShortBreak && s.remaining_ms < 5 * MIN)
        .await
        .unwrap()
        .clone();
    assert!(state.is_running);

    let record = sessions.recv().await.unwrap();
    assert_eq!(record.phase, Phase::Focus);
    assert_eq!(record.duration_minutes, 2);
}

#[tokio::test(start_paused = true)]
async fn test_long_break_cadence_through_coordinator() {
    let (handle, mut sessions, _task) = Coordinator::new(
        SystemClock::new(),
        SettingsSnapshot {
            focus_minutes: 1,
            short_break_minutes: 1,
            long_break_minutes: 2,
            long_break_every: 4,
            auto_start_next: true,
        },
    )
    .spawn();
    handle.start().unwrap();

    let mut phases = Vec::new();
    while phases.len() < 10 {
        phases.push(sessions.recv().await.unwrap().phase);
    }
    use Phase::*;
    assert_eq!(
        phases,
        vec![
            Focus, ShortBreak, Focus, ShortBreak, Focus, ShortBreak, Focus, LongBreak, Focus,
            ShortBreak
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_settings_change_does_not_move_running_countdown() {
    let store = SettingsStore::in_memory(Config::default());
    let (handle, _sessions, _task) = Coordinator::new(SystemClock::new(), store.snapshot())
        .with_settings_store(store.clone())
        .spawn();
    handle.start().unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    store.update_focus_minutes(50).unwrap();

    let mut rx = handle.subscribe();
    let state = rx.wait_for(|s| s.focus_minutes == 50).await.unwrap().clone();
    assert!(state.is_running);
    assert_eq!(state.total_ms, 25 * MIN);
    assert!(state.remaining_ms <= 25 * MIN - 9_900);

    handle.pause().unwrap();
    let paused = rx.wait_for(|s| !s.is_running).await.unwrap().clone();
    assert_eq!(paused.total_ms, 25 * MIN);

    store.update_focus_minutes(45).unwrap();
    let reset = rx.wait_for(|s| s.focus_minutes == 45).await.unwrap().clone();
    assert_eq!(reset.phase, Phase::Focus);
    assert_eq!(reset.total_ms, 45 * MIN);
    assert_eq!(reset.remaining_ms, 45 * MIN);
}

#[tokio::test(start_paused = true)]
async fn test_set_auto_start_persists_without_clobbering_countdown() {
    let store = SettingsStore::in_memory(Config::default());
    let (handle, _sessions, _task) = Coordinator::new(SystemClock::new(), store.snapshot())
        .with_settings_store(store.clone())
        .spawn();
    handle.select_preset(50, 10).unwrap();
    handle.start().unwrap();
    let mut rx = handle.subscribe();
    rx.wait_for(|s| s.remaining_ms < 50 * MIN - 3_000).await.unwrap();
    handle.pause().unwrap();
    let paused = rx.wait_for(|s| !s.is_running).await.unwrap().remaining_ms;

    handle.set_auto_start(true).unwrap();
    assert!(rx.wait_for(|s| s.auto_start_next).await.is_ok());

    let mut settings = store.subscribe();
    settings.wait_for(|s| s.auto_start_next).await.unwrap();
    assert!(store.config().timer.auto_start_next);

    // Let the coordinator see the store's echo.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let state = handle.state();
    assert!(state.auto_start_next);
    assert_eq!(state.total_ms, 50 * MIN);
    assert_eq!(state.remaining_ms, paused);
}

#[tokio::test(start_paused = true)]
async fn test_stop_thresholds() {
    let clock = ManualClock::new(1_700_000_000_000);
    let (handle, mut sessions, _task) =
        Coordinator::new(clock.clone(), SettingsSnapshot::default()).spawn();
    let mut rx = handle.subscribe();

    handle.start().unwrap();
    rx.wait_for(|s| s.is_running).await.unwrap();
    clock.advance(4_000);
    rx.wait_for(|s| s.remaining_ms == 25 * MIN - 4_000).await.unwrap();
    handle.stop().unwrap();
    rx.wait_for(|s| s.notice == Some(Notice::SessionStopped)).await.unwrap();
    assert!(sessions.try_recv().is_err());

    handle.start().unwrap();
    rx.wait_for(|s| s.is_running).await.unwrap();
    clock.advance(5_001);
    rx.wait_for(|s| s.remaining_ms == 25 * MIN - 5_001).await.unwrap();
    handle.stop().unwrap();

    let record = sessions.recv().await.unwrap();
    assert!(!record.completed);
    assert_eq!(record.duration_minutes, 1);
    assert_eq!(record.phase, Phase::Focus);
    assert_eq!(record.start_time_ms, 1_700_000_004_000);
    rx.wait_for(|s| !s.is_running).await.unwrap();
    assert!(sessions.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_remaining_never_increases_within_interval() {
    let (handle, _sessions, _task) = Coordinator::new(
        SystemClock::new(),
        SettingsSnapshot {
            focus_minutes: 1,
            short_break_minutes: 1,
            auto_start_next: true,
            ..SettingsSnapshot::default()
        },
    )
    .spawn();
    let mut rx = handle.subscribe();
    let mut last = rx.borrow_and_update().clone();
    handle.start().unwrap();

    let mut rollovers = 0;
    while rollovers < 3 {
        rx.changed().await.unwrap();
        let next = rx.borrow_and_update().clone();
        assert!(next.remaining_ms <= next.total_ms);
        if next.interval_seq == last.interval_seq && last.is_running && next.is_running {
            assert!(next.remaining_ms <= last.remaining_ms);
        }
        if next.interval_seq != last.interval_seq {
            rollovers += 1;
        }
        last = next;
    }
}

#[tokio::test(start_paused = true)]
async fn test_use_settings_drops_preset() {
    let store = SettingsStore::in_memory(Config::default());
    let (handle, _sessions, _task) = Coordinator::new(SystemClock::new(), store.snapshot())
        .with_settings_store(store.clone())
        .spawn();
    handle.select_preset(90, 20).unwrap();
    handle.use_settings().unwrap();

    let mut rx = handle.subscribe();
    let state = rx
        .wait_for(|s| s.notice == Some(Notice::UsingCustomSettings))
        .await
        .unwrap()
        .clone();
    assert_eq!(state.total_ms, 25 * MIN);
    assert_eq!(state.short_break_minutes, 5);
}
