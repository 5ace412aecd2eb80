use crate::error::{GeolabelError, Result};
use crate::ports::DateRange;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Sentinel-2 L2A bands requested for every tile
pub const DEFAULT_BANDS: [&str; 10] =
    ["B2", "B3", "B4", "B5", "B6", "B7", "B8", "B8A", "B11", "B12"];

/// Configuration source for tracking where values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default value
    Default,
    /// Loaded from config file
    File,
    /// Loaded from environment variable
    Environment,
    /// Provided via CLI argument
    Cli,
}

impl ConfigSource {
    /// Returns the precedence level (higher = higher priority)
    pub fn precedence(&self) -> u8 {
        match self {
            ConfigSource::Default => 0,
            ConfigSource::File => 1,
            ConfigSource::Environment => 2,
            ConfigSource::Cli => 3,
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    /// Update the value if the new source has higher precedence
    pub fn update(&mut self, value: T, source: ConfigSource) {
        if source.precedence() > self.source.precedence() {
            self.value = value;
            self.source = source;
        }
    }
}

/// Layered configuration for GeoLabel
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub data_dir: ConfigValue<PathBuf>,
    pub tile_size: ConfigValue<u32>,
    pub resolution_m: ConfigValue<f64>,
    pub overlap: ConfigValue<f64>,
    pub max_tiles: ConfigValue<usize>,
    pub min_success_ratio: ConfigValue<f64>,
    pub cloud_cover_max: ConfigValue<u8>,
    pub date_start: ConfigValue<NaiveDate>,
    pub date_end: ConfigValue<NaiveDate>,
    pub bands: ConfigValue<Vec<String>>,
    pub poll_interval_ms: ConfigValue<u64>,
    pub store_retry_attempts: ConfigValue<u32>,
}

impl LayeredConfig {
    /// Create a new configuration with default values
    pub fn with_defaults() -> Self {
        let default_date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default();

        Self {
            data_dir: ConfigValue::new(PathBuf::from("data"), ConfigSource::Default),
            tile_size: ConfigValue::new(256, ConfigSource::Default),
            resolution_m: ConfigValue::new(10.0, ConfigSource::Default),
            overlap: ConfigValue::new(0.5, ConfigSource::Default),
            max_tiles: ConfigValue::new(2500, ConfigSource::Default),
            min_success_ratio: ConfigValue::new(0.0, ConfigSource::Default),
            cloud_cover_max: ConfigValue::new(30, ConfigSource::Default),
            date_start: ConfigValue::new(default_date(2025, 1, 1), ConfigSource::Default),
            date_end: ConfigValue::new(default_date(2025, 12, 31), ConfigSource::Default),
            bands: ConfigValue::new(
                DEFAULT_BANDS.iter().map(|b| b.to_string()).collect(),
                ConfigSource::Default,
            ),
            poll_interval_ms: ConfigValue::new(5000, ConfigSource::Default),
            store_retry_attempts: ConfigValue::new(3, ConfigSource::Default),
        }
    }

    /// Defaults, then the file at `path` if it exists, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::with_defaults();
        if let Some(path) = path {
            if path.exists() {
                config = config.load_from_file(path)?;
            } else {
                tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            }
        }
        Ok(config.load_from_env())
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| GeolabelError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to read config file: {}", e),
            })?;

        let file_config: FileConfig =
            toml::from_str(&content).map_err(|e| GeolabelError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to parse TOML: {}", e),
            })?;

        let src = ConfigSource::File;
        if let Some(v) = file_config.data_dir {
            self.data_dir.update(v, src);
        }
        if let Some(v) = file_config.tile_size {
            self.tile_size.update(v, src);
        }
        if let Some(v) = file_config.resolution_m {
            self.resolution_m.update(v, src);
        }
        if let Some(v) = file_config.overlap {
            self.overlap.update(v, src);
        }
        if let Some(v) = file_config.max_tiles {
            self.max_tiles.update(v, src);
        }
        if let Some(v) = file_config.min_success_ratio {
            self.min_success_ratio.update(v, src);
        }
        if let Some(v) = file_config.cloud_cover_max {
            self.cloud_cover_max.update(v, src);
        }
        if let Some(v) = file_config.date_start {
            self.date_start.update(v, src);
        }
        if let Some(v) = file_config.date_end {
            self.date_end.update(v, src);
        }
        if let Some(v) = file_config.bands {
            self.bands.update(v, src);
        }
        if let Some(v) = file_config.poll_interval_ms {
            self.poll_interval_ms.update(v, src);
        }
        if let Some(v) = file_config.store_retry_attempts {
            self.store_retry_attempts.update(v, src);
        }

        self.validate()?;
        Ok(self)
    }

    /// Load configuration from environment variables
    pub fn load_from_env(mut self) -> Self {
        let src = ConfigSource::Environment;

        // GEOLABEL_DATA_DIR
        if let Ok(dir) = env::var("GEOLABEL_DATA_DIR") {
            self.data_dir.update(PathBuf::from(dir), src);
        }

        if let Some(v) = env_parse::<u32>("GEOLABEL_TILE_SIZE", "positive integer") {
            self.tile_size.update(v, src);
        }
        if let Some(v) = env_parse::<f64>("GEOLABEL_RESOLUTION_M", "meters per pixel") {
            self.resolution_m.update(v, src);
        }
        if let Some(v) = env_parse::<f64>("GEOLABEL_OVERLAP", "fraction in [0, 1)") {
            self.overlap.update(v, src);
        }
        if let Some(v) = env_parse::<usize>("GEOLABEL_MAX_TILES", "positive integer") {
            self.max_tiles.update(v, src);
        }
        if let Some(v) = env_parse::<f64>("GEOLABEL_MIN_SUCCESS_RATIO", "fraction in [0, 1]") {
            self.min_success_ratio.update(v, src);
        }
        if let Some(v) = env_parse::<u8>("GEOLABEL_CLOUD_COVER_MAX", "percentage 0-100") {
            self.cloud_cover_max.update(v, src);
        }
        if let Some(v) = env_parse::<NaiveDate>("GEOLABEL_DATE_START", "YYYY-MM-DD date") {
            self.date_start.update(v, src);
        }
        if let Some(v) = env_parse::<NaiveDate>("GEOLABEL_DATE_END", "YYYY-MM-DD date") {
            self.date_end.update(v, src);
        }

        // GEOLABEL_BANDS is a comma-separated list
        if let Ok(bands) = env::var("GEOLABEL_BANDS") {
            let bands: Vec<String> = bands
                .split(',')
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect();
            if bands.is_empty() {
                tracing::warn!("Ignoring empty GEOLABEL_BANDS");
            } else {
                self.bands.update(bands, src);
            }
        }

        if let Some(v) = env_parse::<u64>("GEOLABEL_POLL_INTERVAL_MS", "milliseconds") {
            self.poll_interval_ms.update(v, src);
        }
        if let Some(v) = env_parse::<u32>("GEOLABEL_STORE_RETRY_ATTEMPTS", "integer") {
            self.store_retry_attempts.update(v, src);
        }

        self
    }

    /// Update configuration from CLI arguments
    pub fn update_from_cli(&mut self, overrides: CliConfigOverrides) {
        let src = ConfigSource::Cli;
        if let Some(v) = overrides.data_dir {
            self.data_dir.update(v, src);
        }
        if let Some(v) = overrides.tile_size {
            self.tile_size.update(v, src);
        }
        if let Some(v) = overrides.resolution_m {
            self.resolution_m.update(v, src);
        }
        if let Some(v) = overrides.overlap {
            self.overlap.update(v, src);
        }
    }

    /// Check value ranges that the type system cannot express
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, reason: String| GeolabelError::ConfigInvalid {
            key: key.to_string(),
            reason,
        };

        if self.tile_size.value == 0 {
            return Err(invalid("tile_size", "must be positive".to_string()));
        }
        if !(self.resolution_m.value.is_finite() && self.resolution_m.value > 0.0) {
            return Err(invalid(
                "resolution_m",
                format!("must be positive, got {}", self.resolution_m.value),
            ));
        }
        if !(0.0..1.0).contains(&self.overlap.value) {
            return Err(invalid("overlap", format!("must be in [0, 1), got {}", self.overlap.value)));
        }
        if !(0.0..=1.0).contains(&self.min_success_ratio.value) {
            return Err(invalid(
                "min_success_ratio",
                format!("must be in [0, 1], got {}", self.min_success_ratio.value),
            ));
        }
        if self.cloud_cover_max.value > 100 {
            return Err(invalid(
                "cloud_cover_max",
                format!("must be at most 100, got {}", self.cloud_cover_max.value),
            ));
        }
        if self.date_start.value > self.date_end.value {
            return Err(invalid(
                "date_start",
                format!("{} is after date_end {}", self.date_start.value, self.date_end.value),
            ));
        }
        if self.bands.value.is_empty() {
            return Err(invalid("bands", "at least one band is required".to_string()));
        }
        Ok(())
    }

    pub fn date_range(&self) -> DateRange {
        DateRange {
            start: self.date_start.value,
            end: self.date_end.value,
        }
    }

    /// Get all configuration values as a map for inspection
    pub fn to_inspection_map(&self) -> HashMap<String, (String, ConfigSource)> {
        let mut map = HashMap::new();

        map.insert(
            "data_dir".to_string(),
            (self.data_dir.value.display().to_string(), self.data_dir.source),
        );
        map.insert(
            "tile_size".to_string(),
            (format!("{} px", self.tile_size.value), self.tile_size.source),
        );
        map.insert(
            "resolution_m".to_string(),
            (format!("{} m", self.resolution_m.value), self.resolution_m.source),
        );
        map.insert("overlap".to_string(), (self.overlap.value.to_string(), self.overlap.source));
        map.insert(
            "max_tiles".to_string(),
            (self.max_tiles.value.to_string(), self.max_tiles.source),
        );
        map.insert(
            "min_success_ratio".to_string(),
            (self.min_success_ratio.value.to_string(), self.min_success_ratio.source),
        );
        map.insert(
            "cloud_cover_max".to_string(),
            (format!("{}%", self.cloud_cover_max.value), self.cloud_cover_max.source),
        );
        map.insert(
            "date_start".to_string(),
            (self.date_start.value.to_string(), self.date_start.source),
        );
        map.insert("date_end".to_string(), (self.date_end.value.to_string(), self.date_end.source));
        map.insert("bands".to_string(), (self.bands.value.join(","), self.bands.source));
        map.insert(
            "poll_interval_ms".to_string(),
            (self.poll_interval_ms.value.to_string(), self.poll_interval_ms.source),
        );
        map.insert(
            "store_retry_attempts".to_string(),
            (self.store_retry_attempts.value.to_string(), self.store_retry_attempts.source),
        );

        map
    }
}

/// Read and parse an environment variable, warning when it is malformed
fn env_parse<T: FromStr>(name: &str, expected: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid {} value '{}': expected {}", name, raw, expected);
            None
        }
    }
}

/// Configuration loaded from TOML file
#[derive(Debug, Deserialize, Serialize)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    tile_size: Option<u32>,
    resolution_m: Option<f64>,
    overlap: Option<f64>,
    max_tiles: Option<usize>,
    min_success_ratio: Option<f64>,
    cloud_cover_max: Option<u8>,
    date_start: Option<NaiveDate>,
    date_end: Option<NaiveDate>,
    bands: Option<Vec<String>>,
    poll_interval_ms: Option<u64>,
    store_retry_attempts: Option<u32>,
}

/// CLI configuration overrides
#[derive(Debug, Default)]
pub struct CliConfigOverrides {
    pub data_dir: Option<PathBuf>,
    pub tile_size: Option<u32>,
    pub resolution_m: Option<f64>,
    pub overlap: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = LayeredConfig::with_defaults();
        assert_eq!(config.tile_size.value, 256);
        assert_eq!(config.tile_size.source, ConfigSource::Default);
        assert_eq!(config.resolution_m.value, 10.0);
        assert_eq!(config.overlap.value, 0.5);
        assert_eq!(config.cloud_cover_max.value, 30);
        assert_eq!(config.bands.value.len(), 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_precedence() {
        let mut value = ConfigValue::new(100, ConfigSource::Default);

        value.update(200, ConfigSource::File);
        assert_eq!(value.value, 200);

        value.update(300, ConfigSource::Environment);
        assert_eq!(value.value, 300);

        value.update(400, ConfigSource::Cli);
        assert_eq!(value.value, 400);

        // Lower precedence should not override
        value.update(500, ConfigSource::File);
        assert_eq!(value.value, 400);
        assert_eq!(value.source, ConfigSource::Cli);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
tile_size = 512
overlap = 0.25
date_start = "2024-03-01"
bands = ["B4", "B3", "B2"]
"#
        )
        .unwrap();

        let config = LayeredConfig::with_defaults().load_from_file(file.path()).unwrap();

        assert_eq!(config.tile_size.value, 512);
        assert_eq!(config.tile_size.source, ConfigSource::File);
        assert_eq!(config.overlap.value, 0.25);
        assert_eq!(config.date_start.value, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(config.bands.value, vec!["B4", "B3", "B2"]);
        assert_eq!(config.resolution_m.source, ConfigSource::Default);
    }

    #[test]
    fn test_file_with_invalid_overlap_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "overlap = 1.0").unwrap();

        let result = LayeredConfig::with_defaults().load_from_file(file.path());
        assert!(matches!(result, Err(GeolabelError::ConfigInvalid { ref key, .. }) if key == "overlap"));
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = LayeredConfig::with_defaults();

        config.update_from_cli(CliConfigOverrides {
            tile_size: Some(128),
            resolution_m: Some(20.0),
            ..Default::default()
        });

        assert_eq!(config.tile_size.value, 128);
        assert_eq!(config.tile_size.source, ConfigSource::Cli);
        assert_eq!(config.resolution_m.value, 20.0);
        assert_eq!(config.overlap.source, ConfigSource::Default);
    }

    #[test]
    fn test_inspection_map() {
        let config = LayeredConfig::with_defaults();
        let map = config.to_inspection_map();

        let (tile_size, source) = &map["tile_size"];
        assert_eq!(tile_size, "256 px");
        assert_eq!(*source, ConfigSource::Default);
        assert_eq!(map["bands"].0, DEFAULT_BANDS.join(","));
    }
}
