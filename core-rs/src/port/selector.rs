/**
 * selector.rs
 * Block selection - claims a disjoint block of candidate ports
 *
 * Port space layout:
 * - Slots start at lowPort with stride blockSize + 1
 * - Slot offset 0: guard port, bound for the lifetime of the claim
 * - Slot offset 1..=blockSize: the block handed to the pool
 *
 * Example (lowPort=10000, blockSize=128):
 * - Slot 0: guard 10000, block 10001-10128
 * - Slot 1: guard 10129, block 10130-10257
 *
 * Selection strategy:
 * - Pick a random slot below the OS ephemeral range (at most blockCount slots)
 * - Reject slots overlapping a block already claimed in this process
 * - Reject slots whose guard port cannot be bound (claimed by a sibling process)
 * - After `attempts` misses, widen to every slot outside the ephemeral range
 * - After `attempts` more misses, fail with BlockAllocation
 */

use once_cell::sync::Lazy;
use rand::Rng;
use std::fs;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

use super::interval::{overlaps, Block};
use crate::config::PoolConfig;
use crate::errors::{FreeportError, Result};

/// Blocks claimed by live pools in this process
static CLAIMED_BLOCKS: Lazy<Mutex<Vec<Block>>> = Lazy::new(|| Mutex::new(Vec::new()));

const EPHEMERAL_RANGE_PATH: &str = "/proc/sys/net/ipv4/ip_local_port_range";

/// IANA dynamic port range, used when the OS range cannot be read
pub const DEFAULT_EPHEMERAL_RANGE: Block = Block {
    min: 49152,
    max: 65535,
};

/// Read the OS ephemeral port range
pub fn ephemeral_port_range() -> Block {
    fs::read_to_string(EPHEMERAL_RANGE_PATH)
        .ok()
        .and_then(|content| parse_port_range(&content))
        .unwrap_or(DEFAULT_EPHEMERAL_RANGE)
}

/// Parse "<min> <max>" as found in ip_local_port_range
fn parse_port_range(content: &str) -> Option<Block> {
    let mut fields = content.split_whitespace();
    let min = fields.next()?.parse().ok()?;
    let max = fields.next()?.parse().ok()?;
    Block::new(min, max)
}

/// A block owned by one pool
///
/// Holds the guard listener; dropping the claim closes it and removes the
/// block from the process-wide registry.
#[derive(Debug)]
pub struct BlockClaim {
    block: Block,
    _guard: TcpListener,
}

impl BlockClaim {
    pub fn block(&self) -> Block {
        self.block
    }

    pub fn guard_port(&self) -> u16 {
        self.block.min - 1
    }
}

impl Drop for BlockClaim {
    fn drop(&mut self) {
        let mut claimed = CLAIMED_BLOCKS.lock().unwrap_or_else(PoisonError::into_inner);
        claimed.retain(|b| *b != self.block);
        debug!(block = %self.block, "released port block");
    }
}

/// Chooses slots for new pools
#[derive(Debug, Clone)]
pub struct BlockSelector {
    block_size: u16,
    block_count: u16,
    low_port: u16,
    attempts: u32,
    ephemeral: Block,
}

impl BlockSelector {
    /// Create a selector for the given configuration using the OS ephemeral range
    pub fn new(config: &PoolConfig) -> Self {
        BlockSelector {
            block_size: config.block_size,
            block_count: config.block_count,
            low_port: config.low_port,
            attempts: config.attempts,
            ephemeral: ephemeral_port_range(),
        }
    }

    /// Override the reserved ephemeral range
    pub fn with_ephemeral_range(mut self, ephemeral: Block) -> Self {
        self.ephemeral = ephemeral;
        self
    }

    pub fn ephemeral_range(&self) -> Block {
        self.ephemeral
    }

    fn stride(&self) -> u32 {
        u32::from(self.block_size) + 1
    }

    /// Guard port and block of a slot, or None past the end of the port space
    fn slot(&self, index: u32) -> Option<(u16, Block)> {
        let guard = u32::from(self.low_port) + index * self.stride();
        let max = guard + u32::from(self.block_size);
        if max > u32::from(u16::MAX) {
            return None;
        }
        // Both values fit in u16 after the bound check above
        let block = Block::new(guard as u16 + 1, max as u16)?;
        Some((guard as u16, block))
    }

    /// Slots lying entirely below the ephemeral range, capped at blockCount
    pub fn normal_slots(&self) -> Vec<u32> {
        (0..u32::from(self.block_count))
            .map_while(|index| self.slot(index).map(|slot| (index, slot)))
            .filter(|(_, (_, block))| block.max < self.ephemeral.min)
            .map(|(index, _)| index)
            .collect()
    }

    /// Every slot that stays clear of the ephemeral range
    pub fn widened_slots(&self) -> Vec<u32> {
        (0..)
            .map_while(|index| self.slot(index).map(|slot| (index, slot)))
            .filter(|(_, (guard, block))| {
                !overlaps(*guard, block.max, self.ephemeral.min, self.ephemeral.max)
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Claim a block for a new pool
    ///
    /// # Errors
    /// Returns `BlockAllocation` if neither the normal nor the widened search
    /// space yields a usable slot within `attempts` random placements each.
    pub fn select(&self) -> Result<BlockClaim> {
        let mut rng = rand::thread_rng();

        for (space, slots) in [
            ("normal", self.normal_slots()),
            ("widened", self.widened_slots()),
        ] {
            if slots.is_empty() {
                debug!(space, "no slots in search space");
                continue;
            }

            for attempt in 0..self.attempts {
                let index = slots[rng.gen_range(0..slots.len())];
                let Some((guard, block)) = self.slot(index) else {
                    continue;
                };

                if let Some(claim) = try_claim(guard, block) {
                    info!(block = %block, guard, space, attempt, "allocated port block");
                    return Ok(claim);
                }
            }

            warn!(
                space,
                attempts = self.attempts,
                "no usable port block found"
            );
        }

        Err(FreeportError::BlockAllocation)
    }
}

/// Register the block and bind its guard port
fn try_claim(guard: u16, block: Block) -> Option<BlockClaim> {
    let mut claimed = CLAIMED_BLOCKS.lock().unwrap_or_else(PoisonError::into_inner);

    // The guard port is part of the claimed footprint
    if claimed
        .iter()
        .any(|other| overlaps(other.min - 1, other.max, guard, block.max))
    {
        debug!(block = %block, "slot overlaps a block claimed in this process");
        return None;
    }

    let listener = match TcpListener::bind((Ipv4Addr::LOCALHOST, guard)) {
        Ok(listener) => listener,
        Err(e) => {
            debug!(block = %block, guard, error = %e, "guard port unavailable");
            return None;
        }
    };

    claimed.push(block);
    Some(BlockClaim {
        block,
        _guard: listener,
    })
}
