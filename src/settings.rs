//! Settings snapshot and persistence seam
//!
//! The whole adjustable state serializes into one [`Settings`] value; where
//! it is stored is an external concern behind the [`SettingsStore`] trait.
//! An in-memory implementation ships for tests and offline runs.

use crate::config::{ConfigDefaults, ConfigStore};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

/// Serializable snapshot of every adjustable setting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default playbook time/cost
    pub playbook_defaults: ConfigDefaults,
    /// Default action time/cost
    pub action_defaults: ConfigDefaults,
    /// Default prompt-assistant time/cost
    pub prompt_defaults: ConfigDefaults,
    /// Lookback window in days
    pub lookback_days: u32,
    /// Annual license cost allocated across action runs in reports
    pub annual_license_cost: f64,
    /// Row ids excluded from totals
    pub excluded_rows: Vec<String>,
    /// Overrides, category assignments, provenance flags, category set
    pub config: ConfigStore,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            playbook_defaults: ConfigDefaults::playbook(),
            action_defaults: ConfigDefaults::action(),
            prompt_defaults: ConfigDefaults::prompt(),
            lookback_days: 30,
            annual_license_cost: 0.0,
            excluded_rows: Vec::new(),
            config: ConfigStore::new(),
        }
    }
}

/// Opaque settings persistence
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load the stored snapshot, `None` when nothing was saved yet
    async fn load(&self) -> Result<Option<Settings>>;

    /// Persist a snapshot, replacing any previous one
    async fn save(&self, settings: &Settings) -> Result<()>;
}

/// Keeps the snapshot in memory only
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    slot: Mutex<Option<Settings>>,
}

impl MemorySettingsStore {
    /// An empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self) -> Result<Option<Settings>> {
        match self.slot.lock() {
            Ok(slot) => Ok(slot.clone()),
            Err(poisoned) => Ok(poisoned.into_inner().clone()),
        }
    }

    async fn save(&self, settings: &Settings) -> Result<()> {
        match self.slot.lock() {
            Ok(mut slot) => *slot = Some(settings.clone()),
            Err(mut poisoned) => **poisoned.get_mut() = Some(settings.clone()),
        }
        Ok(())
    }
}

/// Stores the snapshot as pretty JSON in a single file
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    /// Create a store backed by `path`; the file is created on first save
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn load(&self) -> Result<Option<Settings>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no settings file yet");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, settings: &Settings) -> Result<()> {
        let json = serde_json::to_vec_pretty(settings)?;
        tokio::fs::write(&self.path, json).await?;
        debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        tokio_test::block_on(async {
            let store = MemorySettingsStore::new();
            assert!(store.load().await.unwrap().is_none());

            let mut settings = Settings::default();
            settings.lookback_days = 90;
            store.save(&settings).await.unwrap();

            let loaded = store.load().await.unwrap().unwrap();
            assert_eq!(loaded.lookback_days, 90);
            assert_eq!(loaded.playbook_defaults, ConfigDefaults::playbook());
        });
    }

    #[test]
    fn test_file_store_round_trip() {
        tokio_test::block_on(async {
            let path = std::env::temp_dir()
                .join(format!("roistat-settings-test-{}.json", std::process::id()));
            let store = FileSettingsStore::new(&path);
            assert!(store.load().await.unwrap().is_none());

            let mut settings = Settings::default();
            settings.config.set_time_from_ai(
                crate::types::ItemKind::Playbook,
                crate::types::ItemId::new("pb-1"),
                2.5,
                50.0,
            );
            store.save(&settings).await.unwrap();

            let loaded = store.load().await.unwrap().unwrap();
            assert!(loaded.config.has_custom_config(
                crate::types::ItemKind::Playbook,
                &crate::types::ItemId::new("pb-1"),
            ));
            let _ = std::fs::remove_file(&path);
        });
    }

    #[test]
    fn test_snapshot_survives_serialization() {
        let mut settings = Settings::default();
        settings.config.add_category("ops".to_string(), "Ops".to_string()).unwrap();
        settings.excluded_rows.push("pb-1".to_string());

        let json = serde_json::to_string(&settings).unwrap();
        let restored: Settings = serde_json::from_str(&json).unwrap();
        assert!(restored.config.category_exists("ops"));
        assert_eq!(restored.excluded_rows, vec!["pb-1"]);

        // Older snapshots missing fields fall back to defaults
        let sparse: Settings = serde_json::from_str(r#"{"lookback_days": 7}"#).unwrap();
        assert_eq!(sparse.lookback_days, 7);
        assert_eq!(sparse.action_defaults, ConfigDefaults::action());
    }
}
