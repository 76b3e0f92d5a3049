/**
 * interval.rs
 * Closed port intervals and overlap detection
 *
 * A block is the inclusive range [min, max]. Two blocks conflict when
 * they share at least one port, including single-port blocks and
 * blocks nested inside each other.
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Returns true if the closed intervals [min1, max1] and [min2, max2] intersect.
pub fn overlaps<T: PartialOrd>(min1: T, max1: T, min2: T, max2: T) -> bool {
    min1 <= max2 && min2 <= max1
}

/// Contiguous, inclusive range of candidate ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    pub min: u16,
    pub max: u16,
}

impl Block {
    /// Create a block, or `None` when `min > max`
    pub fn new(min: u16, max: u16) -> Option<Self> {
        (min <= max).then_some(Block { min, max })
    }

    /// Number of ports in the block
    pub fn size(&self) -> usize {
        usize::from(self.max - self.min) + 1
    }

    /// Check if port is within this block
    pub fn contains(&self, port: u16) -> bool {
        port >= self.min && port <= self.max
    }

    /// Check if two blocks share at least one port
    pub fn overlaps(&self, other: &Block) -> bool {
        overlaps(self.min, self.max, other.min, other.max)
    }

    /// Iterate every port of the block in ascending order
    pub fn ports(&self) -> RangeInclusive<u16> {
        self.min..=self.max
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}
