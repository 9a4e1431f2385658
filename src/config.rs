//! Engine configuration, loaded from TOML and validated once at startup.
//!
//! ```toml
//! pool_capacity = 1048576
//! pool_max_capacity = 4194304   # omit for a fixed-size pool
//! channel_capacity = 65536      # power of two
//! batch_size = 256
//! snapshot_depth = 10
//! pin_to_core = true
//! warm_up = true
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;
use crate::pool::{PoolConfig, NULL_INDEX};

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Order slots committed at startup
    pub pool_capacity: u32,
    /// Growth ceiling for the pool; `None` keeps it fixed
    pub pool_max_capacity: Option<u32>,
    /// Ingestion channel slots (power of two)
    pub channel_capacity: usize,
    /// Intents drained per driver batch
    pub batch_size: usize,
    /// Levels per side in published snapshots
    pub snapshot_depth: usize,
    /// Pin the driver thread to the last CPU core
    pub pin_to_core: bool,
    /// Commit pool growth before the driver loop starts
    pub warm_up: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 1 << 20,
            pool_max_capacity: None,
            channel_capacity: 1 << 16,
            batch_size: 256,
            snapshot_depth: 10,
            pin_to_core: false,
            warm_up: true,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = Self::from_toml_str(&std::fs::read_to_string(path)?)?;
        info!(path = %path.display(), ?config, "loaded engine config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let max_slots = NULL_INDEX - 1;

        if self.pool_capacity == 0 || self.pool_capacity > max_slots {
            return Err(ConfigError::PoolCapacity {
                got: self.pool_capacity,
                max: max_slots,
            });
        }
        if let Some(max) = self.pool_max_capacity {
            if max < self.pool_capacity || max > max_slots {
                return Err(ConfigError::PoolGrowth {
                    initial: self.pool_capacity,
                    max,
                });
            }
        }
        if !self.channel_capacity.is_power_of_two() {
            return Err(ConfigError::ChannelCapacity(self.channel_capacity));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::BatchSize);
        }
        Ok(())
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::growable(
            self.pool_capacity,
            self.pool_max_capacity.unwrap_or(self.pool_capacity),
        )
    }
}
