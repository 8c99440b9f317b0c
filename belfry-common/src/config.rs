//! Daemon configuration document
//!
//! Volumes, radio, holiday and TTS settings live in one TOML file under the
//! data root. Loading never fails hard: a missing or malformed file falls
//! back to defaults (and the defaults are written back on first save).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Per-lane volume levels, 0..=100.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Volumes {
    pub bell: u8,
    pub announcement: u8,
    pub music: u8,
    pub manual: u8,
}

impl Default for Volumes {
    fn default() -> Self {
        Self {
            bell: 100,
            announcement: 80,
            music: 60,
            manual: 70,
        }
    }
}

/// Internet-radio settings for break music.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RadioConfig {
    pub enabled: bool,
    pub url: String,
    pub stations: Vec<String>,
}

/// Holiday-calendar settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HolidayConfig {
    pub enabled: bool,
    pub country: String,
    pub skip_on_holidays: bool,
    /// "DD.MM.YYYY" dates on which the holiday silence is overridden.
    pub muted_dates: Vec<String>,
}

impl Default for HolidayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            country: "TR".to_string(),
            skip_on_holidays: true,
            muted_dates: Vec::new(),
        }
    }
}

/// Text-to-speech settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsConfig {
    pub language: String,
    /// "male" or "female"
    pub gender: String,
    /// Speech-rate adjustment, e.g. "+0%", "-20%"
    pub rate: String,
    /// External synthesis command; `{text}`, `{voice}`, `{rate}` and `{out}`
    /// placeholders are substituted. Empty disables synthesis.
    pub command: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            language: "tr".to_string(),
            gender: "female".to_string(),
            rate: "+0%".to_string(),
            command: String::new(),
        }
    }
}

/// Startup behavior flags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StartupConfig {
    pub play_startup_sound: bool,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            play_startup_sound: true,
        }
    }
}

/// The full configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub volumes: Volumes,
    pub radio: RadioConfig,
    pub holidays: HolidayConfig,
    pub tts: TtsConfig,
    pub startup: StartupConfig,
}

impl Config {
    /// Load from a TOML file, falling back to defaults on any failure.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    warn!("config file {} is malformed: {}", path.display(), e);
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }

    /// Persist to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("serialize: {}", e)))?;
        std::fs::write(path, toml)?;
        Ok(())
    }
}

/// Shared, persistent configuration handle.
///
/// Mutations go through [`ConfigStore::update`], which writes the document
/// back after applying the change. A failed write keeps the in-memory state
/// (last-known-good) and logs the failure.
pub struct ConfigStore {
    path: PathBuf,
    inner: Mutex<Config>,
}

impl ConfigStore {
    pub fn open(path: PathBuf) -> Self {
        let config = Config::load(&path);
        Self {
            path,
            inner: Mutex::new(config),
        }
    }

    /// Snapshot of the current configuration.
    pub fn get(&self) -> Config {
        self.inner.lock().unwrap().clone()
    }

    /// Apply a mutation and persist the result.
    pub fn update<F: FnOnce(&mut Config)>(&self, f: F) {
        let mut guard = self.inner.lock().unwrap();
        f(&mut guard);
        if let Err(e) = guard.save(&self.path) {
            warn!("failed to persist config to {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_volumes() {
        let config = Config::default();
        assert_eq!(config.volumes.bell, 100);
        assert_eq!(config.volumes.announcement, 80);
        assert_eq!(config.volumes.music, 60);
        assert_eq!(config.volumes.manual, 70);
        assert!(config.holidays.enabled);
        assert!(config.holidays.skip_on_holidays);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.volumes.music = 42;
        config.radio.enabled = true;
        config.radio.url = "http://radio.example/stream".to_string();
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path), config);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "volumes = \"loud\"").unwrap();
        assert_eq!(Config::load(&path), Config::default());
    }

    #[test]
    fn store_update_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let store = ConfigStore::open(path.clone());
        store.update(|c| c.volumes.bell = 55);
        assert_eq!(store.get().volumes.bell, 55);

        let reloaded = Config::load(&path);
        assert_eq!(reloaded.volumes.bell, 55);
    }
}
