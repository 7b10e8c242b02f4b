//! healthd.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use healthgrid_health::EngineConfig;
use healthgrid_state::duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub engine: EngineSection,
    pub probe: ProbeConfig,
    pub metrics: MetricsConfig,
    pub inventory: InventoryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    #[serde(with = "duration::text")]
    pub refresh_interval: Duration,
    /// How often the inventory is re-read and reconciled.
    #[serde(with = "duration::text")]
    pub reconcile_interval: Duration,
    pub buffer_capacity: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            refresh_interval: engine.refresh_interval,
            reconcile_interval: Duration::from_secs(30),
            buffer_capacity: engine.buffer_capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    #[serde(with = "duration::text")]
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    #[serde(with = "duration::text")]
    pub pilot_light_interval: Duration,
    #[serde(with = "duration::text")]
    pub feed_interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            pilot_light_interval: Duration::from_secs(60),
            feed_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub path: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content)?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: DaemonConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("engine.refresh_interval", self.engine.refresh_interval),
            ("engine.reconcile_interval", self.engine.reconcile_interval),
            ("probe.timeout", self.probe.timeout),
            ("metrics.pilot_light_interval", self.metrics.pilot_light_interval),
            ("metrics.feed_interval", self.metrics.feed_interval),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
        }
        if self.engine.buffer_capacity == 0 {
            return Err(ConfigError::Invalid(
                "engine.buffer_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            refresh_interval: self.engine.refresh_interval,
            buffer_capacity: self.engine.buffer_capacity,
        }
    }

    /// The inventory file: the CLI flag wins over the config file.
    pub fn inventory_path(&self, cli: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
        cli.or_else(|| self.inventory.path.clone()).ok_or_else(|| {
            ConfigError::Invalid(
                "no inventory file: pass --inventory or set inventory.path".to_string(),
            )
        })
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
