// Pool Contract Tests
//
// Error strings and the free/pending/taken bookkeeping are observed by
// callers directly. Harnesses match on the exact text.

use freeport::{FreeportError, LeakProbe, PoolConfig, PortPool};

struct AlwaysFree;

impl LeakProbe for AlwaysFree {
    fn is_free(&self, _port: u16) -> bool {
        true
    }
}

struct NeverFree;

impl LeakProbe for NeverFree {
    fn is_free(&self, _port: u16) -> bool {
        false
    }
}

fn pool_with<P: LeakProbe + 'static>(probe: P) -> PortPool {
    PortPool::new(PoolConfig {
        block_size: 8,
        wait_interval_ms: 20,
        ..PoolConfig::default()
    })
    .with_probe(probe)
}

/// WHY: Error text is part of the public contract
/// REASON: Callers assert on err.to_string()
/// BREAKS: Every harness matching these messages
/// SACRIFICES: If this fails, you changed an observable message
#[test]
fn error_strings_are_stable() {
    assert_eq!(
        FreeportError::InvalidCount(-1).to_string(),
        "freeport: cannot take -1 ports"
    );
    assert_eq!(
        FreeportError::InvalidCount(0).to_string(),
        "freeport: cannot take 0 ports"
    );
    assert_eq!(
        FreeportError::BlockSizeTooSmall.to_string(),
        "freeport: block size too small"
    );
    assert_eq!(
        FreeportError::NoFreePorts.to_string(),
        "freeport: impossible to satisfy request; there are no actual free ports in the block anymore"
    );
    assert_eq!(
        FreeportError::BlockAllocation.to_string(),
        "cannot allocate port block"
    );
}

/// WHY: total == free + pending + taken
/// REASON: Every port is in exactly one state
/// BREAKS: Ports vanish or get leased twice
/// SACRIFICES: If this fails, the pool leaks or double-books ports
#[test]
fn counters_always_add_up() {
    let pool = pool_with(AlwaysFree);

    let a = pool.take(3).unwrap();
    let b = pool.take(2).unwrap();
    let stats = pool.stats().unwrap();
    assert_eq!(stats.total, stats.free + stats.pending + stats.taken);
    assert_eq!(stats.taken, 5);

    pool.return_ports(&a);
    pool.return_ports(&b);
    let stats = pool.stats().unwrap();
    assert!(stats.is_quiescent());
    assert_eq!(stats.total, 8);
}

/// WHY: Requests larger than the pool fail immediately
/// REASON: total only ever shrinks, so waiting can never help
/// BREAKS: Take(total + 1) hangs forever
/// SACRIFICES: If this fails, oversized requests deadlock test suites
#[test]
fn oversized_request_never_waits() {
    let pool = pool_with(AlwaysFree);

    let started = std::time::Instant::now();
    assert!(matches!(pool.take(9), Err(FreeportError::BlockSizeTooSmall)));
    assert!(started.elapsed() < std::time::Duration::from_secs(1));
}

/// WHY: total never grows without a reset
/// REASON: Excised ports are owned by someone outside the pool
/// BREAKS: A stolen port is handed out again after Return
/// SACRIFICES: If this fails, callers get ports that are already bound
#[test]
fn excised_ports_never_return() {
    let pool = pool_with(NeverFree);

    assert!(matches!(pool.take(1), Err(FreeportError::NoFreePorts)));
    let stats = pool.stats().unwrap();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.free, 0);

    pool.return_ports(&[10001, 10002]);
    assert_eq!(pool.stats().unwrap().total, 0);
}

/// WHY: Invalid counts are rejected before the pool is touched
/// REASON: n <= 0 is a caller bug, not a capacity problem
/// BREAKS: Zero-length leases that look like success
/// SACRIFICES: If this fails, invalid input is silently accepted
#[test]
fn non_positive_counts_rejected() {
    let pool = pool_with(AlwaysFree);

    for n in [0, -1, -100] {
        let err = pool.take(n).unwrap_err();
        assert_eq!(err.to_string(), format!("freeport: cannot take {} ports", n));
    }
}
