//! Store configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! TOML file, then `VOXELSTORE__*` environment variables, e.g.
//! `VOXELSTORE__CACHE_CAPACITY=64` or `VOXELSTORE__LOGGING__LEVEL=debug`.

use crate::cache::DEFAULT_HOT_RATIO;
use crate::error::{Error, Result};
use crate::region::compression::DEFAULT_LEVEL;
use crate::region::{CompressionMethod, RegionOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "VOXELSTORE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the `r.{x}.{z}.mca` files
    pub region_dir: PathBuf,
    /// Most region files kept open at once
    pub cache_capacity: usize,
    /// Share of the cache reserved for hot regions
    pub hot_ratio: f64,
    pub compression: CompressionMethod,
    pub compression_level: u32,
    /// fsync after every put
    pub sync_on_write: bool,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    pub ansi: bool,
    pub json: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            region_dir: PathBuf::from("region"),
            cache_capacity: 256,
            hot_ratio: DEFAULT_HOT_RATIO,
            compression: CompressionMethod::Zlib,
            compression_level: DEFAULT_LEVEL,
            sync_on_write: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
            json: false,
        }
    }
}

impl StoreConfig {
    /// Store rooted at `region_dir` with default settings
    pub fn with_region_dir<P: Into<PathBuf>>(region_dir: P) -> Self {
        Self {
            region_dir: region_dir.into(),
            ..Self::default()
        }
    }

    /// Load defaults, then `path` (TOML) if given, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default()).map_err(config_err)?;
        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_err)?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let parsed: Self = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Invalid TOML configuration: {}", e)))?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(Error::Config("cache_capacity must be at least 1".to_string()));
        }
        if !self.hot_ratio.is_finite() {
            return Err(Error::Config(format!(
                "hot_ratio must be a number, got {}",
                self.hot_ratio
            )));
        }
        Ok(())
    }

    /// Hot ratio clamped to (0, 1]
    pub fn effective_hot_ratio(&self) -> f64 {
        if self.hot_ratio <= 0.0 {
            f64::MIN_POSITIVE
        } else {
            self.hot_ratio.min(1.0)
        }
    }

    pub fn region_options(&self) -> RegionOptions {
        RegionOptions {
            compression: self.compression,
            compression_level: self.compression_level.min(9),
            sync_on_write: self.sync_on_write,
        }
    }
}

impl From<&StoreConfig> for RegionOptions {
    fn from(config: &StoreConfig) -> Self {
        config.region_options()
    }
}

fn config_err(e: config::ConfigError) -> Error {
    Error::Config(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.region_dir, PathBuf::from("region"));
        assert_eq!(config.cache_capacity, 256);
        assert_eq!(config.hot_ratio, 0.99);
        assert_eq!(config.compression, CompressionMethod::Zlib);
        assert_eq!(config.compression_level, 6);
        assert!(!config.sync_on_write);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() -> Result<()> {
        let config = StoreConfig::from_toml_str(
            r#"
            region_dir = "/srv/world/region"
            compression = "gzip"

            [logging]
            json = true
            "#,
        )?;
        assert_eq!(config.region_dir, PathBuf::from("/srv/world/region"));
        assert_eq!(config.compression, CompressionMethod::Gzip);
        assert_eq!(config.cache_capacity, 256);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
        Ok(())
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = StoreConfig::from_toml_str("cache_capacity = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_compression() {
        assert!(StoreConfig::from_toml_str("compression = \"lz4\"").is_err());
    }

    #[test]
    fn test_toml_round_trip() -> Result<()> {
        let config = StoreConfig {
            cache_capacity: 12,
            sync_on_write: true,
            ..StoreConfig::with_region_dir("world/region")
        };
        let text = config.to_toml_string()?;
        assert_eq!(StoreConfig::from_toml_str(&text)?, config);
        Ok(())
    }

    #[test]
    fn test_effective_hot_ratio() {
        let mut config = StoreConfig::default();
        config.hot_ratio = 1.5;
        assert_eq!(config.effective_hot_ratio(), 1.0);
        config.hot_ratio = -1.0;
        assert!(config.effective_hot_ratio() > 0.0);
    }

    #[test]
    fn test_region_options() {
        let config = StoreConfig {
            compression: CompressionMethod::Gzip,
            compression_level: 42,
            ..StoreConfig::default()
        };
        let options = RegionOptions::from(&config);
        assert_eq!(options.compression, CompressionMethod::Gzip);
        assert_eq!(options.compression_level, 9);
    }

    // File and environment layering share one test: the environment is process-wide.
    #[test]
    fn test_load_layers_file_and_environment() -> Result<()> {
        let dir = std::env::temp_dir().join(format!("voxelstore_config_{}", std::process::id()));
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("store.toml");
        std::fs::write(&path, "cache_capacity = 32\nhot_ratio = 0.5\n")?;

        let config = StoreConfig::load(Some(&path))?;
        assert_eq!(config.cache_capacity, 32);
        assert_eq!(config.hot_ratio, 0.5);
        assert_eq!(config.compression, CompressionMethod::Zlib);

        std::env::set_var("VOXELSTORE__CACHE_CAPACITY", "7");
        std::env::set_var("VOXELSTORE__LOGGING__LEVEL", "debug");
        let config = StoreConfig::load(Some(&path));
        std::env::remove_var("VOXELSTORE__CACHE_CAPACITY");
        std::env::remove_var("VOXELSTORE__LOGGING__LEVEL");
        let config = config?;
        assert_eq!(config.cache_capacity, 7);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.hot_ratio, 0.5);

        assert!(StoreConfig::load(Some(&dir.join("missing.toml"))).is_err());

        std::fs::remove_dir_all(dir).ok();
        Ok(())
    }
}
