//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Interval lengths and long-break cadence
//! - Whether the next interval starts automatically
//! - Alert preferences (vibration, movement nudges)
//!
//! Configuration is stored at `<data dir>/config.toml`. The [`SettingsStore`]
//! wraps it with a change stream the timer coordinator subscribes to.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::data_dir;
use crate::error::{ConfigError, Result};

/// Timer settings as consumed by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    #[serde(default = "default_focus_minutes")]
    pub focus_minutes: u32,
    #[serde(default = "default_short_break_minutes")]
    pub short_break_minutes: u32,
    #[serde(default = "default_long_break_minutes")]
    pub long_break_minutes: u32,
    #[serde(default = "default_long_break_every")]
    pub long_break_every: u32,
    #[serde(default)]
    pub auto_start_next: bool,
}

/// Alert preferences. The timer never reads these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSettings {
    #[serde(default = "default_true")]
    pub vibrations: bool,
    #[serde(default = "default_true")]
    pub movement_nudge: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data dir>/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub timer: SettingsSnapshot,
    #[serde(default)]
    pub alerts: AlertSettings,
}

// Default functions
fn default_focus_minutes() -> u32 {
    25
}
fn default_short_break_minutes() -> u32 {
    5
}
fn default_long_break_minutes() -> u32 {
    15
}
fn default_long_break_every() -> u32 {
    4
}
fn default_true() -> bool {
    true
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            focus_minutes: default_focus_minutes(),
            short_break_minutes: default_short_break_minutes(),
            long_break_minutes: default_long_break_minutes(),
            long_break_every: default_long_break_every(),
            auto_start_next: false,
        }
    }
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            vibrations: true,
            movement_nudge: true,
        }
    }
}

impl SettingsSnapshot {
    /// Copy with every count raised to at least 1.
    pub fn clamped(&self) -> Self {
        Self {
            focus_minutes: self.focus_minutes.max(1),
            short_break_minutes: self.short_break_minutes.max(1),
            long_break_minutes: self.long_break_minutes.max(1),
            long_break_every: self.long_break_every.max(1),
            auto_start_next: self.auto_start_next,
        }
    }

    /// Compare everything except the auto-start flag.
    pub fn same_durations(&self, other: &Self) -> bool {
        self.focus_minutes == other.focus_minutes
            && self.short_break_minutes == other.short_break_minutes
            && self.long_break_minutes == other.long_break_minutes
            && self.long_break_every == other.long_break_every
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let (parent, leaf) = match key.rsplit_once('.') {
            Some((parent, leaf)) => (Some(parent), leaf),
            None => (None, key),
        };
        if leaf.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        if let Some(parent) = parent {
            for part in parent.split('.') {
                current = current.get_mut(part).ok_or_else(unknown)?;
            }
        }
        let obj = current.as_object_mut().ok_or_else(unknown)?;
        let existing = obj.get(leaf).ok_or_else(unknown)?;

        let new_value = match existing {
            serde_json::Value::Bool(_) => serde_json::Value::Bool(
                parse_bool(value).ok_or_else(|| invalid(format!("'{value}' is not a boolean")))?,
            ),
            serde_json::Value::Number(_) => {
                let n = value
                    .parse::<u32>()
                    .map_err(|_| invalid(format!("'{value}' is not a whole number")))?;
                serde_json::Value::Number(n.into())
            }
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                return Err(invalid("cannot overwrite a whole section".into()));
            }
            _ => serde_json::Value::String(value.into()),
        };

        obj.insert(leaf.to_string(), new_value);
        Ok(())
    }

    /// Reject values the timer would have to clamp.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("timer.focus_minutes", self.timer.focus_minutes),
            ("timer.short_break_minutes", self.timer.short_break_minutes),
            ("timer.long_break_minutes", self.timer.long_break_minutes),
            ("timer.long_break_every", self.timer.long_break_every),
        ];
        for (key, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    message: "must be at least 1".into(),
                });
            }
        }
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Return a copy with one dot-separated key replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// into the key's type.
    pub fn with_value(&self, key: &str, value: &str) -> Result<Self, ConfigError> {
        let mut json = serde_json::to_value(self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        Ok(updated)
    }

    /// Every leaf key with its current value, sorted by key.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Ok(serde_json::Value::Object(sections)) = serde_json::to_value(self) {
            for (section, body) in sections {
                if let serde_json::Value::Object(fields) = body {
                    for (field, value) in fields {
                        out.push((format!("{section}.{field}"), value.to_string()));
                    }
                }
            }
        }
        out
    }

    /// Read a config file, or `None` if it does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .map(Some)
                .map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk via a temporary file and rename.
    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, content).map_err(|e| save_failed(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Durable settings with a change stream.
///
/// Every update is written to disk before it becomes visible. Subscribers
/// only hear about changes to the timer section.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    path: Option<PathBuf>,
    config: Mutex<Config>,
    snapshot_tx: watch::Sender<SettingsSnapshot>,
}

impl SettingsStore {
    /// Open the store at `<data dir>/config.toml`.
    pub fn open_default() -> Result<Self> {
        Self::open(data_dir()?.join("config.toml"))
    }

    /// Load from `path`, writing defaults there if the file is missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = match Config::read(&path)? {
            Some(config) => config,
            None => {
                info!(path = %path.display(), "writing default settings");
                let config = Config::default();
                config.write(&path)?;
                config
            }
        };
        Ok(Self::build(Some(path), config))
    }

    /// A store that never touches the filesystem.
    pub fn in_memory(config: Config) -> Self {
        Self::build(None, config)
    }

    fn build(path: Option<PathBuf>, config: Config) -> Self {
        let (snapshot_tx, _) = watch::channel(config.timer.clone());
        Self {
            inner: Arc::new(StoreInner {
                path,
                config: Mutex::new(config),
                snapshot_tx,
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    pub fn config(&self) -> Config {
        self.lock().clone()
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    /// Current timer settings plus every later change.
    pub fn subscribe(&self) -> watch::Receiver<SettingsSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn update_focus_minutes(&self, minutes: u32) -> Result<()> {
        self.update(|c| c.timer.focus_minutes = minutes)
    }

    pub fn update_short_break_minutes(&self, minutes: u32) -> Result<()> {
        self.update(|c| c.timer.short_break_minutes = minutes)
    }

    pub fn update_long_break_minutes(&self, minutes: u32) -> Result<()> {
        self.update(|c| c.timer.long_break_minutes = minutes)
    }

    pub fn update_long_break_every(&self, count: u32) -> Result<()> {
        self.update(|c| c.timer.long_break_every = count)
    }

    pub fn update_auto_start(&self, enabled: bool) -> Result<()> {
        self.update(|c| c.timer.auto_start_next = enabled)
    }

    pub fn update_vibrations(&self, enabled: bool) -> Result<()> {
        self.update(|c| c.alerts.vibrations = enabled)
    }

    pub fn update_movement_nudge(&self, enabled: bool) -> Result<()> {
        self.update(|c| c.alerts.movement_nudge = enabled)
    }

    /// Alert preferences as currently stored on disk.
    ///
    /// Picks up edits made by another process and keeps them in memory.
    /// Falls back to the cached value when the file is missing or
    /// unreadable.
    pub fn reload_alerts(&self) -> AlertSettings {
        let mut guard = self.lock();
        if let Some(path) = &self.inner.path {
            match Config::read(path) {
                Ok(Some(on_disk)) => guard.alerts = on_disk.alerts,
                Ok(None) => {}
                Err(e) => warn!("keeping cached alert settings: {e}"),
            }
        }
        guard.alerts.clone()
    }

    /// Set one dot-separated key, e.g. `timer.focus_minutes`.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = self.lock();
        let updated = guard.with_value(key, value)?;
        self.commit(&mut guard, updated)
    }

    pub fn reset(&self) -> Result<()> {
        let mut guard = self.lock();
        self.commit(&mut guard, Config::default())
    }

    fn update(&self, f: impl FnOnce(&mut Config)) -> Result<()> {
        let mut guard = self.lock();
        let mut updated = guard.clone();
        f(&mut updated);
        updated.validate()?;
        self.commit(&mut guard, updated)
    }

    fn commit(&self, guard: &mut MutexGuard<'_, Config>, updated: Config) -> Result<()> {
        if let Some(path) = &self.inner.path {
            updated.write(path)?;
        }
        let timer = updated.timer.clone();
        **guard = updated;
        let changed = self.inner.snapshot_tx.send_if_modified(|current| {
            if *current != timer {
                *current = timer;
                true
            } else {
                false
            }
        });
        debug!(changed, "settings committed");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Config> {
        // A panic while holding the lock cannot leave a half-written Config.
        self.inner
            .config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let parsed: Config = toml::from_str("[timer]\nfocus_minutes = 50\n").unwrap();
        assert_eq!(parsed.timer.focus_minutes, 50);
        assert_eq!(parsed.timer.short_break_minutes, 5);
        assert_eq!(parsed.timer.long_break_every, 4);
        assert!(parsed.alerts.vibrations);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("timer.focus_minutes").as_deref(), Some("25"));
        assert_eq!(cfg.get("timer.auto_start_next").as_deref(), Some("false"));
        assert!(cfg.get("timer.missing_key").is_none());
        assert!(cfg.get("").is_none());
    }

    #[test]
    fn with_value_updates_number_and_bool() {
        let cfg = Config::default()
            .with_value("timer.focus_minutes", "45")
            .unwrap()
            .with_value("alerts.vibrations", "off")
            .unwrap();
        assert_eq!(cfg.timer.focus_minutes, 45);
        assert!(!cfg.alerts.vibrations);
    }

    #[test]
    fn with_value_rejects_unknown_key() {
        let err = Config::default().with_value("timer.nope", "1").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(_)));
        assert!(Config::default().with_value("timer", "1").is_err());
    }

    #[test]
    fn with_value_rejects_invalid_type() {
        assert!(Config::default()
            .with_value("alerts.vibrations", "sometimes")
            .is_err());
        assert!(Config::default()
            .with_value("timer.focus_minutes", "-3")
            .is_err());
    }

    #[test]
    fn with_value_rejects_zero_minutes() {
        let err = Config::default()
            .with_value("timer.long_break_every", "0")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn entries_lists_every_leaf() {
        let keys: Vec<String> = Config::default().entries().into_iter().map(|(k, _)| k).collect();
        assert!(keys.contains(&"timer.focus_minutes".to_string()));
        assert!(keys.contains(&"alerts.movement_nudge".to_string()));
        assert_eq!(keys.len(), 7);
    }

    #[test]
    fn clamped_raises_zero_values() {
        let s = SettingsSnapshot {
            focus_minutes: 0,
            long_break_every: 0,
            ..SettingsSnapshot::default()
        }
        .clamped();
        assert_eq!(s.focus_minutes, 1);
        assert_eq!(s.long_break_every, 1);
    }

    #[test]
    fn store_publishes_only_timer_changes() {
        let store = SettingsStore::in_memory(Config::default());
        let mut rx = store.subscribe();
        store.update_vibrations(false).unwrap();
        assert!(!rx.has_changed().unwrap());
        store.update_focus_minutes(30).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().focus_minutes, 30);
        assert!(!store.config().alerts.vibrations);
    }

    #[test]
    fn store_rejects_zero_without_changing_state() {
        let store = SettingsStore::in_memory(Config::default());
        assert!(store.update_short_break_minutes(0).is_err());
        assert_eq!(store.snapshot().short_break_minutes, 5);
    }

    #[test]
    fn store_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let store = SettingsStore::open(&path).unwrap();
        assert!(path.exists());
        store.set("timer.auto_start_next", "true").unwrap();
        store.update_long_break_minutes(20).unwrap();

        let reopened = SettingsStore::open(&path).unwrap();
        assert!(reopened.snapshot().auto_start_next);
        assert_eq!(reopened.snapshot().long_break_minutes, 20);
        assert!(!dir.path().join("config.toml.tmp").exists());
    }

    #[test]
    fn reload_alerts_sees_edits_from_another_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let running = SettingsStore::open(&path).unwrap();
        assert!(running.config().alerts.vibrations);

        let other = SettingsStore::open(&path).unwrap();
        other.update_vibrations(false).unwrap();
        assert!(running.config().alerts.vibrations);

        let alerts = running.reload_alerts();
        assert!(!alerts.vibrations);
        assert!(alerts.movement_nudge);
        assert!(!running.config().alerts.vibrations);
    }

    #[test]
    fn reload_alerts_in_memory_uses_cache() {
        let store = SettingsStore::in_memory(Config::default());
        store.update_movement_nudge(false).unwrap();
        assert!(!store.reload_alerts().movement_nudge);
    }

    #[test]
    fn store_reset_restores_defaults() {
        let store = SettingsStore::in_memory(Config::default());
        store.update_long_break_every(2).unwrap();
        store.reset().unwrap();
        assert_eq!(store.config(), Config::default());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "timer = 12 [[[").unwrap();
        assert!(SettingsStore::open(&path).is_err());
    }
}
