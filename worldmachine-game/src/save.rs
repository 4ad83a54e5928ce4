//! Save serialization, structural validation, backup rotation, and recovery.
//!
//! The persisted copy is exclusively owned here. Writes are backup-before-
//! overwrite; loads fall back through the backup ring and finally to a fresh
//! default state, so a corrupted save can never crash the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::resources::ResourceId;
use crate::state::GameState;

/// Storage key for the primary snapshot.
pub const SAVE_KEY: &str = "machine_of_worlds_save";
/// Storage key for the backup ring.
pub const BACKUP_KEY: &str = "machine_of_worlds_backups";
/// Newest backups kept; older slots are dropped on rotation.
pub const MAX_BACKUPS: usize = 3;

/// Abstract key-value persistence backend.
pub trait SaveStorage {
    type Error: std::error::Error + Send + Sync + 'static;

    fn read(&self, key: &str) -> Result<Option<String>, Self::Error>;
    fn write(&mut self, key: &str, value: &str) -> Result<(), Self::Error>;
    fn remove(&mut self, key: &str) -> Result<(), Self::Error>;
}

/// Errors surfaced by the save manager.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("storage backend failure")]
    Storage(#[source] anyhow::Error),
    #[error("save data failed validation")]
    Invalid,
    #[error("serialization failure")]
    Serialize(#[from] serde_json::Error),
}

/// One retained backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSlot {
    pub timestamp_ms: u64,
    pub payload: String,
}

/// Fixed-size ring of recent snapshots, newest first. The "keep newest 3"
/// rule is structural: pushing always truncates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct BackupRing {
    slots: Vec<BackupSlot>,
}

impl BackupRing {
    /// Insert a snapshot at the front and drop anything beyond the limit.
    pub fn push(&mut self, timestamp_ms: u64, payload: String) {
        self.slots.insert(
            0,
            BackupSlot {
                timestamp_ms,
                payload,
            },
        );
        self.slots.truncate(MAX_BACKUPS);
    }

    /// Backups newest first.
    pub fn iter(&self) -> impl Iterator<Item = &BackupSlot> {
        self.slots.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Where a successful load actually came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Primary,
    Backup,
    Fresh,
}

/// Structural validation of a raw snapshot.
///
/// Checks shape only, not game semantics: required top-level fields exist,
/// counters are finite and non-negative, resource keys are known, upgrade
/// levels are integer-like, and the history (if present) is an array.
#[must_use]
pub fn validate(raw: &Value) -> bool {
    let Some(object) = raw.as_object() else {
        return false;
    };
    let Some(worlds_created) = object.get("worldsCreated").and_then(Value::as_f64) else {
        return false;
    };
    if !worlds_created.is_finite() || worlds_created < 0.0 {
        return false;
    }

    let Some(resources) = object.get("resources").and_then(Value::as_object) else {
        return false;
    };
    for (key, value) in resources {
        if ResourceId::from_key(key).is_none() {
            return false;
        }
        let Some(amount) = value.as_f64() else {
            return false;
        };
        if !amount.is_finite() || amount < 0.0 {
            return false;
        }
    }

    let Some(upgrades) = object.get("upgrades").and_then(Value::as_object) else {
        return false;
    };
    if let Some(levels) = upgrades.get("levels") {
        let Some(levels) = levels.as_object() else {
            return false;
        };
        for value in levels.values() {
            let Some(level) = value.as_f64() else {
                return false;
            };
            if !level.is_finite() || level < 0.0 || level.fract() != 0.0 {
                return false;
            }
        }
    }

    if let Some(history) = object.get("worldHistory")
        && !history.is_array()
    {
        return false;
    }
    true
}

/// Owns the persisted snapshot and its backup ring.
#[derive(Debug)]
pub struct SaveStateManager<S: SaveStorage> {
    storage: S,
}

impl<S: SaveStorage> SaveStateManager<S> {
    pub const fn new(storage: S) -> Self {
        Self { storage }
    }

    fn read_ring(&self) -> BackupRing {
        match self.storage.read(BACKUP_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
            Ok(None) => BackupRing::default(),
            Err(err) => {
                log::warn!("backup ring unreadable: {err}");
                BackupRing::default()
            }
        }
    }

    fn write_ring(&mut self, ring: &BackupRing) -> Result<(), SaveError> {
        let raw = serde_json::to_string(ring)?;
        self.storage
            .write(BACKUP_KEY, &raw)
            .map_err(|err| SaveError::Storage(anyhow::Error::new(err)))
    }

    /// Persist a snapshot: back up the currently stored copy first, write
    /// the new one, then prune the ring.
    ///
    /// # Errors
    ///
    /// Returns [`SaveError::Storage`] when the backend write fails. The
    /// in-memory state is untouched either way; a previously stored
    /// snapshot is re-written on a best-effort basis before the error
    /// propagates so the caller can notify the user.
    pub fn save(&mut self, state: &GameState, now_ms: u64) -> Result<(), SaveError> {
        let payload = serde_json::to_string(state)?;

        let previous = self
            .storage
            .read(SAVE_KEY)
            .map_err(|err| SaveError::Storage(anyhow::Error::new(err)))?;
        if let Some(previous) = &previous {
            let mut ring = self.read_ring();
            ring.push(now_ms, previous.clone());
            self.write_ring(&ring)?;
        }

        if let Err(err) = self.storage.write(SAVE_KEY, &payload) {
            if let Some(previous) = previous
                && let Err(restore_err) = self.storage.write(SAVE_KEY, &previous)
            {
                log::error!("restore after failed save also failed: {restore_err}");
            }
            return Err(SaveError::Storage(anyhow::Error::new(err)));
        }
        log::debug!("saved snapshot ({} bytes)", payload.len());
        Ok(())
    }

    fn parse_snapshot(raw: &str) -> Option<GameState> {
        let value: Value = serde_json::from_str(raw).ok()?;
        if !validate(&value) {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    /// Load the freshest valid snapshot: primary first, then the backup
    /// ring newest first, then a fresh default. Never fails.
    pub fn load(&self) -> (GameState, LoadSource) {
        match self.storage.read(SAVE_KEY) {
            Ok(Some(raw)) => {
                if let Some(mut state) = Self::parse_snapshot(&raw) {
                    state.normalize();
                    return (state, LoadSource::Primary);
                }
                log::warn!("primary save failed validation, trying backups");
            }
            Ok(None) => return (GameState::default(), LoadSource::Fresh),
            Err(err) => log::warn!("primary save unreadable: {err}"),
        }

        for slot in self.read_ring().iter() {
            if let Some(mut state) = Self::parse_snapshot(&slot.payload) {
                log::info!("recovered from backup taken at {}", slot.timestamp_ms);
                state.normalize();
                return (state, LoadSource::Backup);
            }
        }
        log::warn!("no valid backup found, starting fresh");
        (GameState::default(), LoadSource::Fresh)
    }

    /// Pretty-printed snapshot for a user-triggered export.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization fails.
    pub fn export(state: &GameState) -> Result<String, SaveError> {
        Ok(serde_json::to_string_pretty(state)?)
    }

    /// Apply a user-supplied snapshot. The current session is backed up
    /// first so a bad import never destroys a good save.
    ///
    /// # Errors
    ///
    /// Returns [`SaveError::Invalid`] when the payload fails validation,
    /// or a storage error from the pre-import backup.
    pub fn import(
        &mut self,
        raw: &str,
        current: &GameState,
        now_ms: u64,
    ) -> Result<GameState, SaveError> {
        let value: Value = serde_json::from_str(raw).map_err(|_| SaveError::Invalid)?;
        if !validate(&value) {
            return Err(SaveError::Invalid);
        }
        let mut imported: GameState = serde_json::from_value(value)?;

        let backup = serde_json::to_string(current)?;
        let mut ring = self.read_ring();
        ring.push(now_ms, backup);
        self.write_ring(&ring)?;

        imported.normalize();
        Ok(imported)
    }

    /// Wipe the stored snapshot and backups (full reset).
    ///
    /// # Errors
    ///
    /// Returns a storage error if removal fails.
    pub fn clear(&mut self) -> Result<(), SaveError> {
        self.storage
            .remove(SAVE_KEY)
            .map_err(|err| SaveError::Storage(anyhow::Error::new(err)))?;
        self.storage
            .remove(BACKUP_KEY)
            .map_err(|err| SaveError::Storage(anyhow::Error::new(err)))
    }

    /// Direct access to the backing storage, mainly for tests.
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }
}

/// In-memory backend for tests and headless runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: std::collections::BTreeMap<String, String>,
}

impl SaveStorage for MemoryStorage {
    type Error = std::convert::Infallible;

    fn read(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.entries.insert(String::from(key), String::from(value));
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), Self::Error> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager() -> SaveStateManager<MemoryStorage> {
        SaveStateManager::new(MemoryStorage::default())
    }

    #[test]
    fn validate_rejects_structural_corruption() {
        assert!(!validate(&json!(null)));
        assert!(!validate(&json!({"resources": {}, "upgrades": {}})));
        assert!(!validate(&json!({
            "worldsCreated": -1, "resources": {}, "upgrades": {}
        })));
        assert!(!validate(&json!({
            "worldsCreated": 1,
            "resources": {"heat": -5.0},
            "upgrades": {}
        })));
        assert!(!validate(&json!({
            "worldsCreated": 1,
            "resources": {"plutonium": 3.0},
            "upgrades": {}
        })));
        assert!(!validate(&json!({
            "worldsCreated": 1,
            "resources": {"heat": 3.0},
            "upgrades": {"levels": {"heatGenerator": 1.5}}
        })));
        assert!(!validate(&json!({
            "worldsCreated": 1,
            "resources": {},
            "upgrades": {},
            "worldHistory": "not an array"
        })));
    }

    #[test]
    fn validate_accepts_real_state() {
        let state = GameState::default();
        let value = serde_json::to_value(&state).unwrap();
        assert!(validate(&value));
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut manager = manager();
        let mut state = GameState::new_with_seed(17);
        state.worlds_created = 2;
        state.achievements.insert(6);

        manager.save(&state, 1000).unwrap();
        let (loaded, source) = manager.load();
        assert_eq!(source, LoadSource::Primary);
        assert_eq!(loaded, state);
    }

    #[test]
    fn corrupted_primary_recovers_from_backup() {
        let mut manager = manager();
        let good = GameState::new_with_seed(3);
        manager.save(&good, 1000).unwrap();

        // Second save pushes the good snapshot into the ring; then the
        // primary gets clobbered.
        let mut newer = good.clone();
        newer.worlds_created = 1;
        manager.save(&newer, 2000).unwrap();
        manager
            .storage_mut()
            .write(SAVE_KEY, "{\"worldsCreated\": -9}")
            .unwrap();

        let (loaded, source) = manager.load();
        assert_eq!(source, LoadSource::Backup);
        assert_eq!(loaded, good);
    }

    #[test]
    fn everything_corrupt_falls_back_to_default() {
        let mut manager = manager();
        manager.storage_mut().write(SAVE_KEY, "garbage").unwrap();
        manager.storage_mut().write(BACKUP_KEY, "more garbage").unwrap();

        let (loaded, source) = manager.load();
        assert_eq!(source, LoadSource::Fresh);
        assert_eq!(loaded, GameState::default());
    }

    #[test]
    fn ring_keeps_only_newest_three() {
        let mut ring = BackupRing::default();
        for stamp in 1..=5_u64 {
            ring.push(stamp, format!("payload {stamp}"));
        }
        assert_eq!(ring.len(), MAX_BACKUPS);
        let stamps: Vec<u64> = ring.iter().map(|slot| slot.timestamp_ms).collect();
        assert_eq!(stamps, vec![5, 4, 3]);
    }

    #[test]
    fn import_validates_and_backs_up_session() {
        let mut manager = manager();
        let current = GameState::new_with_seed(1);

        assert!(matches!(
            manager.import("{\"bogus\": true}", &current, 500),
            Err(SaveError::Invalid)
        ));

        let mut incoming = GameState::new_with_seed(2);
        incoming.worlds_created = 4;
        let raw = SaveStateManager::<MemoryStorage>::export(&incoming).unwrap();
        let imported = manager.import(&raw, &current, 600).unwrap();
        assert_eq!(imported.worlds_created, 4);

        // The pre-import backup holds the old session.
        let ring = manager.read_ring();
        assert_eq!(ring.len(), 1);
        let backed: GameState = serde_json::from_str(&ring.iter().next().unwrap().payload).unwrap();
        assert_eq!(backed.seed, 1);
    }
}
