/**
 * config.rs
 * Pool configuration (environment variables or YAML file)
 *
 * Environment:
 * - FREEPORT_BLOCK_SIZE  ports handed out per block (default 128)
 * - FREEPORT_BLOCK_COUNT blocks addressable below the ephemeral range (default 150)
 * - CL_RESERVE_PORTS     alias for FREEPORT_BLOCK_SIZE
 *
 * File format:
 * ```yaml
 * blockSize: 128
 * blockCount: 150
 * lowPort: 10000
 * attempts: 10
 * protocol: tcp
 * waitIntervalMs: 1000
 * ```
 */

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::errors::{FreeportError, Result};
use crate::port::probe::Protocol;

pub const DEFAULT_BLOCK_SIZE: u16 = 128;
pub const DEFAULT_BLOCK_COUNT: u16 = 150;
pub const DEFAULT_LOW_PORT: u16 = 10000;
pub const DEFAULT_ATTEMPTS: u32 = 10;
pub const DEFAULT_WAIT_INTERVAL_MS: u64 = 1000;

pub const BLOCK_SIZE_ENV: &str = "FREEPORT_BLOCK_SIZE";
pub const BLOCK_COUNT_ENV: &str = "FREEPORT_BLOCK_COUNT";
/// Older name for the block size, read when FREEPORT_BLOCK_SIZE is unset
pub const RESERVE_PORTS_ENV: &str = "CL_RESERVE_PORTS";

/// Settings a pool is built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolConfig {
    /// Ports per block
    pub block_size: u16,
    /// Upper bound on slots searched below the ephemeral range
    pub block_count: u16,
    /// First port of the first slot
    pub low_port: u16,
    /// Random placements tried per search space
    pub attempts: u32,
    pub protocol: Protocol,
    /// How often a waiting Take re-checks whether it can still succeed
    pub wait_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            block_size: DEFAULT_BLOCK_SIZE,
            block_count: DEFAULT_BLOCK_COUNT,
            low_port: DEFAULT_LOW_PORT,
            attempts: DEFAULT_ATTEMPTS,
            protocol: Protocol::Tcp,
            wait_interval_ms: DEFAULT_WAIT_INTERVAL_MS,
        }
    }
}

impl PoolConfig {
    /// Build from FREEPORT_* environment variables
    ///
    /// Missing values use the defaults. Empty, non-numeric, zero or negative
    /// values fall back to the defaults with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let (size_key, size_value) = match lookup(BLOCK_SIZE_ENV) {
            Some(value) => (BLOCK_SIZE_ENV, Some(value)),
            None => (RESERVE_PORTS_ENV, lookup(RESERVE_PORTS_ENV)),
        };

        let config = PoolConfig {
            block_size: positive_or_default(size_key, size_value, DEFAULT_BLOCK_SIZE),
            block_count: positive_or_default(
                BLOCK_COUNT_ENV,
                lookup(BLOCK_COUNT_ENV),
                DEFAULT_BLOCK_COUNT,
            ),
            ..PoolConfig::default()
        };

        match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!(error = %e, "falling back to default pool configuration");
                PoolConfig::default()
            }
        }
    }

    /// Load a YAML configuration file
    ///
    /// # Example
    /// ```no_run
    /// let config = freeport::PoolConfig::load("freeport.yaml")?;
    /// # Ok::<(), freeport::FreeportError>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(FreeportError::InvalidConfig(format!(
                "{} not found",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)?;
        let config: PoolConfig = serde_yaml::from_str(&content)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate field ranges
    ///
    /// Ensures:
    /// - blockSize, blockCount, attempts and waitIntervalMs are positive
    /// - lowPort is outside the privileged range
    /// - one slot (guard port + block) fits below 65535
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(FreeportError::InvalidConfig(
                "blockSize must be positive".to_string(),
            ));
        }

        if self.block_count == 0 {
            return Err(FreeportError::InvalidConfig(
                "blockCount must be positive".to_string(),
            ));
        }

        if self.low_port < 1024 {
            return Err(FreeportError::InvalidConfig(format!(
                "lowPort must be at least 1024, got {}",
                self.low_port
            )));
        }

        if self.attempts == 0 {
            return Err(FreeportError::InvalidConfig(
                "attempts must be positive".to_string(),
            ));
        }

        if self.wait_interval_ms == 0 {
            return Err(FreeportError::InvalidConfig(
                "waitIntervalMs must be positive".to_string(),
            ));
        }

        let slot_end = u32::from(self.low_port) + u32::from(self.block_size);
        if slot_end > u32::from(u16::MAX) {
            return Err(FreeportError::InvalidConfig(format!(
                "a block of {} ports starting at {} does not fit below {}",
                self.block_size,
                self.low_port,
                u16::MAX
            )));
        }

        Ok(())
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }
}

fn positive_or_default(key: &str, raw: Option<String>, default: u16) -> u16 {
    let Some(raw) = raw else {
        return default;
    };

    let value = raw.trim();
    match value.parse::<u16>() {
        Ok(parsed) if parsed > 0 => parsed,
        _ => {
            warn!(key, value, default, "ignoring invalid value");
            default
        }
    }
}
