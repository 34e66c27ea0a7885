use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::{replace_file, StorageError};

/// Persisted browser settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Colour theme identifier: `dark`, `light`, or anything else for the
    /// system preference.
    pub theme: String,
    /// URLs of the tabs open at the last shutdown, in display order.
    pub last_session: Vec<String>,
    /// Reserved; always empty for now.
    pub extensions: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: "dark".to_string(),
            last_session: Vec::new(),
            extensions: Vec::new(),
        }
    }
}

/// Interface for loading and saving settings as a whole.
pub trait SettingsStore {
    /// Loads settings. Never fails: problems are logged and defaults returned.
    fn load(&self) -> Settings;

    /// Replaces the stored settings.
    fn save(&self, settings: &Settings) -> Result<(), StorageError>;
}

/// Settings kept as pretty-printed JSON in a single file.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Strict load used by [`SettingsStore::load`]; `Ok(None)` when the file
    /// does not exist yet.
    pub fn try_load(&self) -> Result<Option<Settings>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StorageError::json(&self.path, e))
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Settings {
        match self.try_load() {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                info!("No settings at {}, using defaults", self.path.display());
                Settings::default()
            }
            Err(e) => {
                error!("Error loading settings: {e}");
                Settings::default()
            }
        }
    }

    fn save(&self, settings: &Settings) -> Result<(), StorageError> {
        let json =
            serde_json::to_vec_pretty(settings).map_err(|e| StorageError::json(&self.path, e))?;
        replace_file(&self.path, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSettingsStore::new(dir.path().join("settings.json"));
        let settings = Settings {
            theme: "light".into(),
            last_session: vec!["https://example.com".into()],
            extensions: Vec::new(),
        };
        store.save(&settings).unwrap();
        assert_eq!(store.load(), settings);
        assert_eq!(store.load().theme, "light");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSettingsStore::new(dir.path().join("settings.json"));
        assert!(store.try_load().unwrap().is_none());
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        let store = JsonSettingsStore::new(&path);
        assert!(matches!(store.try_load(), Err(StorageError::Json { .. })));
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"theme": "light"}"#).unwrap();
        let settings = JsonSettingsStore::new(&path).load();
        assert_eq!(settings.theme, "light");
        assert!(settings.last_session.is_empty());
    }

    #[test]
    fn file_uses_documented_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        JsonSettingsStore::new(&path)
            .save(&Settings::default())
            .unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["theme"], "dark");
        assert!(value["last_session"].is_array());
        assert!(value["extensions"].is_array());
    }

    #[test]
    fn save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSettingsStore::new(dir.path().join("nope").join("settings.json"));
        assert!(matches!(
            store.save(&Settings::default()),
            Err(StorageError::Io { .. })
        ));
    }
}
