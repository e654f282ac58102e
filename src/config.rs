//! Shard configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Epoch, ShardId};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for field '{field}': {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration for a locally hosted shard replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardConfig {
    pub shard: ShardId,
    /// Initial membership epoch; epoch 0 is reserved as "no view yet".
    pub epoch: Epoch,
    /// Whether this replica starts in the primary role.
    #[serde(default = "default_primary")]
    pub primary: bool,
    /// Latency between an effect being sequenced and it becoming durable.
    #[serde(default)]
    pub durability_delay_ms: u64,
}

fn default_primary() -> bool {
    true
}

impl ShardConfig {
    pub fn new(shard: ShardId, epoch: Epoch) -> Self {
        Self {
            shard,
            epoch,
            primary: true,
            durability_delay_ms: 0,
        }
    }

    pub fn durability_delay(&self) -> Duration {
        Duration::from_millis(self.durability_delay_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.epoch == Epoch(0) {
            return Err(ConfigError::InvalidValue {
                field: "epoch".to_string(),
                value: self.epoch.to_string(),
                reason: "epoch 0 is reserved, initial views start at 1".to_string(),
            });
        }
        Ok(())
    }
}
