//! # Configuration Management
//!
//! Loads runtime settings from `tide-watch.toml`: the default NOAA station,
//! the directory cache location and staleness TTL, and the chart window.
//! A missing or invalid file falls back to defaults so the binary always
//! starts.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Application configuration loaded from tide-watch.toml.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default NOAA station used when no selection has been persisted.
    pub station: StationConfig,
    /// Station directory cache and freshness settings.
    pub directory: DirectoryConfig,
    /// Chart window around "now".
    pub chart: ChartConfig,
}

/// Default NOAA tide station.
#[derive(Debug, Deserialize, Serialize)]
pub struct StationConfig {
    /// NOAA station id (e.g., "8418150" for Portland, ME).
    pub id: String,
    /// Human-readable station name for display.
    pub name: String,
}

/// Station directory settings.
#[derive(Debug, Deserialize, Serialize)]
pub struct DirectoryConfig {
    /// Directory for the on-disk catalog and selection cache.
    pub cache_dir: String,
    /// Catalog staleness TTL in days.
    pub staleness_ttl_days: i64,
}

/// Chart window settings for snapshot derivation.
#[derive(Debug, Deserialize, Serialize)]
pub struct ChartConfig {
    /// Hours of history included in the chart series.
    pub window_back_hours: i64,
    /// Hours of future predictions included in the chart series.
    pub window_forward_hours: i64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            station: StationConfig {
                id: "8418150".to_string(),
                name: "Portland, ME".to_string(),
            },
            directory: DirectoryConfig {
                cache_dir: "/tmp/tide-watch".to_string(),
                staleness_ttl_days: crate::directory::STALENESS_TTL_DAYS,
            },
            chart: ChartConfig {
                window_back_hours: crate::engine::CHART_WINDOW_BACK_HOURS,
                window_forward_hours: crate::engine::CHART_WINDOW_FORWARD_HOURS,
            },
        }
    }
}

impl Config {
    /// Load configuration from tide-watch.toml in the working directory.
    /// Falls back to the default configuration if the file is missing or
    /// does not parse.
    pub fn load() -> Self {
        Self::load_from_path("tide-watch.toml")
    }

    /// Load configuration from the given path, with the same fallback.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    tracing::info!(station = %config.station.name, "loaded configuration");
                    config
                }
                Err(e) => {
                    tracing::warn!(error = %e, "invalid config file; using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("no config file found; using defaults (Portland, ME)");
                Self::default()
            }
        }
    }

    /// Save the current configuration to tide-watch.toml.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        fs::write("tide-watch.toml", contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.station.id, "8418150");
        assert_eq!(config.station.name, "Portland, ME");
        assert_eq!(config.directory.staleness_ttl_days, 7);
        assert_eq!(config.chart.window_back_hours, 12);
        assert_eq!(config.chart.window_forward_hours, 24);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.station.id, parsed.station.id);
        assert_eq!(config.directory.cache_dir, parsed.directory.cache_dir);
        assert_eq!(
            config.chart.window_forward_hours,
            parsed.chart.window_forward_hours
        );
    }

    #[test]
    fn test_load_nonexistent_file() {
        let config = Config::load_from_path("/nonexistent/path");
        // Should fall back to default
        assert_eq!(config.station.id, "8418150");
    }

    #[test]
    fn test_invalid_file_falls_back_to_default() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tide-watch.toml");
        fs::write(&path, "station = \"not a table\"").unwrap();
        let config = Config::load_from_path(&path);
        assert_eq!(config.station.id, "8418150");
    }
}
