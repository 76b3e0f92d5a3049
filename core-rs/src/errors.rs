//! Error types for freeport
//!
//! Display strings of the allocation errors are stable: callers match on
//! the exact text.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FreeportError {
    #[error("freeport: cannot take {0} ports")]
    InvalidCount(i64),

    #[error("freeport: block size too small")]
    BlockSizeTooSmall,

    #[error("freeport: impossible to satisfy request; there are no actual free ports in the block anymore")]
    NoFreePorts,

    #[error("freeport: timed out waiting for {requested} free ports")]
    Timeout { requested: usize },

    #[error("cannot allocate port block")]
    BlockAllocation,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, FreeportError>;
