/**
 * pool.rs
 * Port pool - free/pending/taken state machine and the Take/Return protocol
 *
 * Port lifecycle:
 * - Free -> Pending: reserved by a Take, about to be probed
 * - Pending -> Taken: probe succeeded, port belongs to the caller
 * - Pending -> excised: probe failed, port leaves the pool for good (total -= 1)
 * - Taken -> Free: returned by the caller
 *
 * Take holds the lock only to move ports between sets. Probes run
 * unlocked; a port is already pending when it is probed, so no two
 * callers ever probe the same port.
 *
 * Waiting:
 * - n > total: can never succeed, fails at once
 * - n <= total but not enough free: blocks until ports are returned
 *   (re-checking n <= total on every wake, total shrinks as leaks are found)
 */

use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::interval::Block;
use super::probe::LeakProbe;
use super::selector::{BlockClaim, BlockSelector};
use crate::config::PoolConfig;
use crate::errors::{FreeportError, Result};

/// Snapshot of pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total: usize,
    pub pending: usize,
    pub free: usize,
    pub taken: usize,
}

impl Stats {
    /// No Take in flight and every port returned
    pub fn is_quiescent(&self) -> bool {
        self.total == self.free && self.pending == 0
    }
}

#[derive(Default)]
struct PoolState {
    claim: Option<BlockClaim>,
    total: usize,
    free: VecDeque<u16>,
    pending: HashSet<u16>,
    taken: HashSet<u16>,
}

impl PoolState {
    fn initialize(&mut self, claim: BlockClaim) {
        let block = claim.block();
        self.free = block.ports().collect();
        self.pending.clear();
        self.taken.clear();
        self.total = block.size();
        self.claim = Some(claim);
    }

    fn accounted(&self) -> usize {
        self.free.len() + self.pending.len() + self.taken.len()
    }

    fn stats(&self) -> Stats {
        Stats {
            total: self.total,
            pending: self.pending.len(),
            free: self.free.len(),
            taken: self.taken.len(),
        }
    }
}

/// Shared pool of ports leased to concurrent callers
///
/// The block is claimed lazily on first use and released on `reset` or drop.
pub struct PortPool {
    config: PoolConfig,
    selector: BlockSelector,
    probe: Arc<dyn LeakProbe>,
    state: Mutex<PoolState>,
    capacity: Condvar,
}

impl PortPool {
    /// Create a pool probing with the configured protocol
    pub fn new(config: PoolConfig) -> Self {
        let selector = BlockSelector::new(&config);
        let probe = config.protocol.probe();

        PortPool {
            config,
            selector,
            probe,
            state: Mutex::new(PoolState::default()),
            capacity: Condvar::new(),
        }
    }

    /// Replace the leak probe
    pub fn with_probe<P: LeakProbe + 'static>(mut self, probe: P) -> Self {
        self.probe = Arc::new(probe);
        self
    }

    /// Replace the block selector
    pub fn with_selector(mut self, selector: BlockSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_initialized(&self, state: &mut PoolState) -> Result<()> {
        if state.claim.is_none() {
            let claim = self.selector.select()?;
            debug!(block = %claim.block(), "initialized port pool");
            state.initialize(claim);
        }
        Ok(())
    }

    /// Block this pool hands ports out of
    pub fn block(&self) -> Result<Block> {
        let mut state = self.lock();
        self.ensure_initialized(&mut state)?;
        // ensure_initialized leaves a claim behind
        state
            .claim
            .as_ref()
            .map(BlockClaim::block)
            .ok_or(FreeportError::BlockAllocation)
    }

    /// Lease `n` verified-free ports
    ///
    /// Blocks while the request could still be satisfied but other callers
    /// hold too many ports.
    ///
    /// # Errors
    /// - `InvalidCount` if n <= 0
    /// - `BlockSizeTooSmall` if n exceeds the ports the pool tracks
    /// - `NoFreePorts` if leaked ports shrink the pool below the request
    /// - `BlockAllocation` if no block could be claimed
    pub fn take(&self, n: i64) -> Result<Vec<u16>> {
        self.take_until(n, None)
    }

    /// Like `take`, but gives up with `Timeout` once `timeout` has elapsed
    pub fn take_timeout(&self, n: i64, timeout: Duration) -> Result<Vec<u16>> {
        self.take_until(n, Some(Instant::now() + timeout))
    }

    fn take_until(&self, n: i64, deadline: Option<Instant>) -> Result<Vec<u16>> {
        if n <= 0 {
            return Err(FreeportError::InvalidCount(n));
        }
        let wanted = usize::try_from(n).map_err(|_| FreeportError::BlockSizeTooSmall)?;

        let mut lease = Vec::new();
        let mut retrying = false;

        while lease.len() < wanted {
            let remaining = wanted - lease.len();
            let candidates = match self.reserve(remaining, wanted, retrying, deadline) {
                Ok(candidates) => candidates,
                Err(e) => {
                    self.return_ports(&lease);
                    return Err(e);
                }
            };

            let (confirmed, excised): (Vec<u16>, Vec<u16>) = candidates
                .into_iter()
                .partition(|&port| self.probe.is_free(port));

            for port in &excised {
                warn!(port, "leaked port due to theft; removing from circulation");
            }

            lease.extend(self.commit(confirmed, &excised));
            retrying = true;
        }

        debug!(ports = ?lease, "took ports");
        Ok(lease)
    }

    /// Move `n` ports from free to pending, waiting for capacity if needed
    ///
    /// `wanted` is the size of the whole request; ports this Take already
    /// holds count towards `total` and never come back while it waits.
    fn reserve(
        &self,
        n: usize,
        wanted: usize,
        retrying: bool,
        deadline: Option<Instant>,
    ) -> Result<Vec<u16>> {
        let mut state = self.lock();
        self.ensure_initialized(&mut state)?;
        let mut waited = false;

        loop {
            if wanted > state.total {
                // Only the first look at the pool reports the request as too big;
                // afterwards the pool shrank underneath us
                return Err(if retrying || waited {
                    FreeportError::NoFreePorts
                } else {
                    FreeportError::BlockSizeTooSmall
                });
            }

            if n <= state.free.len() {
                let ports: Vec<u16> = state.free.drain(..n).collect();
                state.pending.extend(ports.iter().copied());
                return Ok(ports);
            }

            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(FreeportError::Timeout { requested: n });
                    }
                    (deadline - now).min(self.config.wait_interval())
                }
                None => self.config.wait_interval(),
            };

            debug!(
                requested = n,
                free = state.free.len(),
                total = state.total,
                "waiting for ports to be returned"
            );
            let (guard, _) = self
                .capacity
                .wait_timeout(state, wait)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
            waited = true;

            // A reset while we slept drops the block
            self.ensure_initialized(&mut state)?;
        }
    }

    /// Record probe results for reserved ports
    ///
    /// Returns the confirmed ports that moved to taken. Ports reserved from
    /// a block dropped by `reset` are no longer pending and are left out.
    fn commit(&self, confirmed: Vec<u16>, excised: &[u16]) -> Vec<u16> {
        let mut state = self.lock();

        let mut committed = Vec::with_capacity(confirmed.len());
        for port in confirmed {
            if state.pending.remove(&port) {
                state.taken.insert(port);
                committed.push(port);
            }
        }

        let mut shrunk = false;
        for port in excised {
            if state.pending.remove(port) {
                state.total -= 1;
                shrunk = true;
            }
        }

        debug_assert_eq!(state.accounted(), state.total);
        drop(state);

        // Waiters re-check whether their request is still satisfiable
        if shrunk {
            self.capacity.notify_all();
        }

        committed
    }

    /// Give leased ports back to the pool
    ///
    /// Unknown, already returned and excised ports are ignored.
    pub fn return_ports(&self, ports: &[u16]) {
        if ports.is_empty() {
            return;
        }

        let mut state = self.lock();
        let mut released = 0;
        for port in ports {
            if state.taken.remove(port) {
                state.free.push_back(*port);
                released += 1;
            }
        }

        debug_assert_eq!(state.accounted(), state.total);
        drop(state);

        if released > 0 {
            debug!(released, "returned ports");
            self.capacity.notify_all();
        }
    }

    /// Current counters; claims the block if this is the first use
    pub fn stats(&self) -> Result<Stats> {
        let mut state = self.lock();
        self.ensure_initialized(&mut state)?;
        Ok(state.stats())
    }

    /// Next port a Take would reserve
    pub fn peek_free(&self) -> Result<Option<u16>> {
        let mut state = self.lock();
        self.ensure_initialized(&mut state)?;
        Ok(state.free.front().copied())
    }

    /// Every port currently free
    pub fn peek_all_free(&self) -> Result<Vec<u16>> {
        let mut state = self.lock();
        self.ensure_initialized(&mut state)?;
        Ok(state.free.iter().copied().collect())
    }

    /// Drop all bookkeeping and release the block
    ///
    /// The next use claims a fresh block. Test harness teardown only.
    pub fn reset(&self) {
        let mut state = self.lock();
        *state = PoolState::default();
        drop(state);

        debug!("reset port pool");
        self.capacity.notify_all();
    }
}
