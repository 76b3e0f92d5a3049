//! # freeport - port leasing for concurrent tests
//!
//! Hands out ports to test code running in parallel on one host. Two
//! callers never receive the same port, and every port is checked against
//! the OS socket layer before it leaves the pool.
//!
//! ## Usage
//!
//! ```no_run
//! let ports = freeport::take(3)?;
//! // ... bind servers on 127.0.0.1:<port> ...
//! freeport::return_ports(&ports);
//! # Ok::<(), freeport::FreeportError>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ BlockSelector: random slot, guard port      │
//! └───────────────┬─────────────────────────────┘
//!                 │ BlockClaim
//! ┌───────────────▼─────────────────────────────┐
//! │ PortPool:  free ──► pending ──► taken       │
//! │              ▲          │          │        │
//! │              │          ▼ excised  │        │
//! │              └─────────────────────┘ Return │
//! └───────────────┬─────────────────────────────┘
//!                 │ probe (outside the lock)
//!           ┌─────▼──────┐
//!           │ LeakProbe  │  bind/listen/close
//!           └────────────┘
//! ```
//!
//! The free functions use one process-wide pool configured from the
//! environment (see [`PoolConfig::from_env`]). Tests that need isolation
//! build their own [`PortPool`].

pub mod config;
pub mod errors;
pub mod port;

pub use config::PoolConfig;
pub use errors::{FreeportError, Result};
pub use port::{overlaps, Block, BlockSelector, LeakProbe, PortPool, Protocol, Stats};

use once_cell::sync::Lazy;

static DEFAULT_POOL: Lazy<PortPool> = Lazy::new(|| PortPool::new(PoolConfig::from_env()));

/// The process-wide pool behind the free functions
pub fn default_pool() -> &'static PortPool {
    &DEFAULT_POOL
}

/// Lease `n` ports from the process-wide pool
pub fn take(n: i64) -> Result<Vec<u16>> {
    DEFAULT_POOL.take(n)
}

/// Return ports leased with [`take`]
pub fn return_ports(ports: &[u16]) {
    DEFAULT_POOL.return_ports(ports)
}

/// Counters of the process-wide pool
pub fn stats() -> Result<Stats> {
    DEFAULT_POOL.stats()
}

/// Reset the process-wide pool (test harness teardown only)
pub fn reset() {
    DEFAULT_POOL.reset()
}
