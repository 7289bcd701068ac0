use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{EffectCatalog, RecordingSettings, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub playback: PlaybackConfig,
    pub recording: RecordingSettings,
    /// JSON file with effect definitions overriding the built-in ones.
    pub catalog: Option<PathBuf>,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&text)?;
        tracing::debug!(path = %path.as_ref().display(), "loaded configuration");
        Ok(config)
    }

    /// The built-in catalog, with overrides from `catalog` if configured.
    pub fn load_catalog(&self) -> Result<EffectCatalog> {
        match &self.catalog {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                EffectCatalog::from_json(&text)
            }
            None => Ok(EffectCatalog::builtin()),
        }
    }
}

/// Configuration specific to driving the effect scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// How often the driver loop advances the scheduler.
    pub tick_interval_ms: u64,
    /// Seed for random modulation; entropy is used when absent.
    pub random_seed: Option<u64>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10,
            random_seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EffectName;

    #[test]
    fn missing_fields_use_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "playback": { "random_seed": 7 } }"#).unwrap();

        assert_eq!(config.playback.tick_interval_ms, 10);
        assert_eq!(config.playback.random_seed, Some(7));
        assert_eq!(config.recording, RecordingSettings::default());
        assert!(config.catalog.is_none());
    }

    #[test]
    fn loads_config_and_catalog_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("effects.json");
        std::fs::write(
            &catalog_path,
            r#"[{
                "name": "ghost",
                "layers": [{ "delay_ms": 0, "volume": { "left": 0.5, "right": 0.5 }, "speed": 0.9, "pitch": 0.8 }]
            }]"#,
        )
        .unwrap();

        let config_path = dir.path().join("config.json");
        let config = AppConfig {
            catalog: Some(catalog_path),
            ..AppConfig::default()
        };
        std::fs::write(&config_path, serde_json::to_string(&config).unwrap()).unwrap();

        let loaded = AppConfig::load(&config_path).unwrap();
        assert_eq!(loaded, config);

        let catalog = loaded.load_catalog().unwrap();
        let ghost = catalog.definition_for(EffectName::Ghost).unwrap();
        assert_eq!(ghost.layers.len(), 1);
        assert_eq!(ghost.layers[0].speed, 0.9);
    }

    #[test]
    fn missing_config_file_is_an_io_error() {
        let err = AppConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, crate::EffectError::Io(_)));
    }
}
