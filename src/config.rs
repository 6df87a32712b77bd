use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::errors::{AppError, Result};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Root under which every request gets its private output directory.
    pub temp_dir: PathBuf,
    pub max_concurrent_downloads: usize,
    pub max_playlist_items: usize,
    pub max_artifact_size_bytes: u64,
    pub progress_step_percent: u32,
    pub max_duration_minutes: u64,
    pub socket_timeout_secs: u64,
    pub retries: u32,
    pub fragment_retries: u32,
    pub audio_codec: String,
    pub audio_bitrate_kbps: u32,
    pub ytdlp_path: String,
    pub cookie_file: Option<PathBuf>,
    /// Always suffix request ids, even when no identical request is in flight.
    pub unique_request_ids: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir().join("tubefetch"),
            max_concurrent_downloads: 3,
            max_playlist_items: 5,
            max_artifact_size_bytes: 2_000_000_000,
            progress_step_percent: 10,
            max_duration_minutes: 120,
            socket_timeout_secs: 30,
            retries: 3,
            fragment_retries: 3,
            audio_codec: "mp3".to_string(),
            audio_bitrate_kbps: 192,
            ytdlp_path: "yt-dlp".to_string(),
            cookie_file: None,
            unique_request_ids: false,
        }
    }
}

impl AppConfig {
    /// Loads defaults, then the user config file, then `TUBEFETCH_*` environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix("TUBEFETCH").try_parsing(true))
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        log::info!("Configuration loaded from {:?}", path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(config_dir) = config_path.parent() {
            if !config_dir.exists() {
                std::fs::create_dir_all(config_dir)?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AppError::Config(config::ConfigError::Message("Could not find config directory".to_string())))?;

        Ok(config_dir.join("tubefetch").join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_downloads == 0 {
            return Err(AppError::Validation("max_concurrent_downloads must be at least 1".to_string()));
        }
        if self.max_playlist_items == 0 {
            return Err(AppError::Validation("max_playlist_items must be at least 1".to_string()));
        }
        if self.max_artifact_size_bytes == 0 {
            return Err(AppError::Validation("max_artifact_size_bytes must be positive".to_string()));
        }
        if self.progress_step_percent == 0 || self.progress_step_percent > 100 {
            return Err(AppError::Validation(format!(
                "progress_step_percent must be within 1..=100, got {}",
                self.progress_step_percent
            )));
        }
        Ok(())
    }

    pub fn max_duration_seconds(&self) -> u64 {
        self.max_duration_minutes * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.max_concurrent_downloads, 3);
        assert_eq!(config.max_playlist_items, 5);
        assert_eq!(config.max_artifact_size_bytes, 2_000_000_000);
        assert_eq!(config.progress_step_percent, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "max_playlist_items": 12, "audio_codec": "m4a" }"#).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.max_playlist_items, 12);
        assert_eq!(config.audio_codec, "m4a");
        assert_eq!(config.max_concurrent_downloads, 3);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.retries, 3);
    }

    #[test]
    fn save_then_load_preserves_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = AppConfig::default();
        config.max_duration_minutes = 45;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.max_duration_minutes, 45);
    }

    #[test]
    fn rejects_out_of_range_step() {
        let mut config = AppConfig::default();
        config.progress_step_percent = 0;
        assert!(matches!(config.validate(), Err(AppError::Validation(_))));
        config.progress_step_percent = 101;
        assert!(config.validate().is_err());
    }
}
