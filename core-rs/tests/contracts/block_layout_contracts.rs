// Block Layout Contract Tests
//
// Sibling processes only avoid each other if they agree on where slots
// start. The layout is: slot i = guard port at lowPort + i * (blockSize + 1),
// block right after it.

use freeport::{overlaps, Block, BlockSelector, PoolConfig};

fn selector() -> BlockSelector {
    BlockSelector::new(&PoolConfig::default()).with_ephemeral_range(Block {
        min: 32768,
        max: 60999,
    })
}

/// WHY: Default block size is 128 with 150 addressable slots
/// REASON: Many small blocks keep collisions between parallel test binaries rare
/// BREAKS: Large blocks cap the number of disjoint blocks and allocation fails
/// SACRIFICES: If this fails, document WHY the defaults moved
#[test]
fn default_block_geometry() {
    let config = PoolConfig::default();
    assert_eq!(config.block_size, 128);
    assert_eq!(config.block_count, 150);
    assert_eq!(config.low_port, 10000);
}

/// WHY: Slots never reach into the ephemeral range
/// REASON: The OS hands ephemeral ports to outgoing connections at random
/// BREAKS: Leased ports get stolen constantly by unrelated sockets
/// SACRIFICES: If this fails, leak excision shrinks every pool
#[test]
fn normal_slots_stay_below_ephemeral_range() {
    let selector = selector();
    assert!(!selector.normal_slots().is_empty());

    for index in selector.normal_slots() {
        let guard = 10000 + index * 129;
        let max = guard + 128;
        assert!(max < 32768, "slot {} ends at {}", index, max);
    }
}

/// WHY: Widened slots never overlap the ephemeral range either
/// REASON: Widening trades block count for safety, never safety for count
/// BREAKS: Same as above, but only under heavy contention
/// SACRIFICES: If this fails, crowded hosts get unreliable ports
#[test]
fn widened_slots_avoid_ephemeral_range() {
    let selector = selector();

    for index in selector.widened_slots() {
        let guard = 10000 + index * 129;
        let max = guard + 128;
        assert!(max <= 65535);
        assert!(!overlaps(guard, max, 32768, 60999), "slot {} overlaps", index);
    }
}

/// WHY: Neighbouring slots never overlap
/// REASON: The stride includes the guard port
/// BREAKS: Two processes lease the boundary port of adjacent blocks
/// SACRIFICES: If this fails, cross-process isolation is broken
#[test]
fn slots_never_overlap() {
    let slots = selector().normal_slots();

    for (i, a) in slots.iter().enumerate() {
        for b in &slots[i + 1..] {
            let (a_min, a_max) = (10000 + a * 129, 10000 + a * 129 + 128);
            let (b_min, b_max) = (10000 + b * 129, 10000 + b * 129 + 128);
            assert!(!overlaps(a_min, a_max, b_min, b_max));
        }
    }
}
