use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

use crate::model::Location;
use crate::storage::BUCKET_VAR;

/// Errors that stop a run before any location is processed.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(
        "Object storage selected but no bucket configured.\n\
         Hint: set `storage.bucket` in the config file or the {} environment variable.",
        BUCKET_VAR
    )]
    MissingBucket,

    #[error("Failed to initialise object storage: {0}")]
    ObjectStore(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Upstream API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub delay_between_locations_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: "https://archive-api.open-meteo.com/v1/archive".to_string(),
            timeout_secs: 10,
            max_retries: 3,
            delay_between_locations_secs: 1,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn delay_between_locations(&self) -> Duration {
        Duration::from_secs(self.delay_between_locations_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Days before yesterday to include in the window.
    pub history_days: i64,
    pub hourly_metrics: Vec<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            history_days: 30,
            hourly_metrics: [
                "temperature_2m",
                "relative_humidity_2m",
                "weather_code",
                "wind_speed_10m",
                "precipitation",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Object storage when the deployment marker is present, local otherwise.
    #[default]
    Auto,
    Local,
    Object,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub kind: StorageKind,
    pub raw_data_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { kind: StorageKind::Auto, raw_data_path: PathBuf::from("data/raw"), bucket: None }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [api]
/// max_retries = 5
///
/// [[locations]]
/// name = "Tokyo"
/// latitude = 35.6815
/// longitude = 139.7671
/// country = "Japan"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub data: DataConfig,
    pub storage: StorageConfig,
    pub locations: Vec<Location>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            data: DataConfig::default(),
            storage: StorageConfig::default(),
            locations: vec![
                Location::new("New York", 40.7128, -74.0060, "USA"),
                Location::new("Singapore", 1.3048, 103.8312, "Singapore"),
                Location::new("Tokyo", 35.6815, 139.7671, "Japan"),
            ],
        }
    }
}

impl Config {
    /// Load from `path`, or from the platform config file when `None`.
    /// A missing file yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_file_path()?,
        };

        if !path.exists() {
            // First run: no config file, use defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-ingest", "weather-ingest")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), SetupError> {
        let invalid = |msg: String| -> Result<(), SetupError> { Err(SetupError::Invalid(msg)) };

        if self.api.max_retries == 0 {
            return invalid("api.max_retries must be at least 1".into());
        }
        if self.api.timeout_secs == 0 {
            return invalid("api.timeout_secs must be at least 1".into());
        }
        if self.data.history_days < 0 {
            return invalid(format!(
                "data.history_days must be non-negative, got {}",
                self.data.history_days
            ));
        }
        if self.data.hourly_metrics.is_empty() {
            return invalid("data.hourly_metrics must not be empty".into());
        }
        if self.locations.is_empty() {
            return invalid("at least one location is required".into());
        }

        let mut seen = HashSet::new();
        for loc in &self.locations {
            if !seen.insert(loc.name.as_str()) {
                return invalid(format!("duplicate location name '{}'", loc.name));
            }
            if !(-90.0..=90.0).contains(&loc.latitude) {
                return invalid(format!("latitude {} of '{}' outside -90..90", loc.latitude, loc.name));
            }
            if !(-180.0..=180.0).contains(&loc.longitude) {
                return invalid(format!(
                    "longitude {} of '{}' outside -180..180",
                    loc.longitude, loc.name
                ));
            }
        }

        Ok(())
    }

    pub fn location_names(&self) -> Vec<String> {
        self.locations.iter().map(|l| l.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        cfg.validate().expect("defaults must validate");
        assert_eq!(cfg.location_names(), vec!["New York", "Singapore", "Tokyo"]);
        assert_eq!(cfg.api.timeout(), Duration::from_secs(10));
        assert_eq!(cfg.data.hourly_metrics.len(), 5);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = Config::from_toml(
            r#"
            [api]
            max_retries = 5

            [[locations]]
            name = "Berlin"
            latitude = 52.52
            longitude = 13.41
            country = "Germany"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.api.max_retries, 5);
        assert_eq!(cfg.api.timeout_secs, 10);
        assert_eq!(cfg.data.history_days, 30);
        assert_eq!(cfg.storage.kind, StorageKind::Auto);
        assert_eq!(cfg.location_names(), vec!["Berlin"]);
    }

    #[test]
    fn storage_kind_parses_lowercase() {
        let cfg = Config::from_toml(
            r#"
            [storage]
            kind = "object"
            bucket = "weather-raw"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.storage.kind, StorageKind::Object);
        assert_eq!(cfg.storage.bucket.as_deref(), Some("weather-raw"));
    }

    #[test]
    fn rejects_out_of_range_location() {
        let mut cfg = Config::default();
        cfg.locations.push(Location::new("Nowhere", 95.0, 0.0, "-"));
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("latitude 95"));
    }

    #[test]
    fn rejects_duplicate_names_and_zero_retries() {
        let mut cfg = Config::default();
        cfg.locations.push(Location::new("Tokyo", 35.0, 139.0, "Japan"));
        assert!(cfg.validate().unwrap_err().to_string().contains("duplicate location"));

        let mut cfg = Config::default();
        cfg.api.max_retries = 0;
        assert!(cfg.validate().unwrap_err().to_string().contains("max_retries"));
    }

    #[test]
    fn rejects_negative_history() {
        let err = Config::from_toml("[data]\nhistory_days = -3\n").unwrap_err();
        assert!(format!("{err:#}").contains("history_days"));
    }

    #[test]
    fn save_then_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let mut cfg = Config::default();
        cfg.api.delay_between_locations_secs = 0;
        cfg.save(&path).unwrap();

        let loaded = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert_eq!(cfg, Config::default());
    }
}
