/**
 * port module
 * Block selection, leak probing and the shared port pool
 */

pub mod interval;
pub mod pool;
pub mod probe;
pub mod selector;

pub use interval::{overlaps, Block};
pub use pool::{PortPool, Stats};
pub use probe::{LeakProbe, Protocol, TcpProbe, UdpProbe};
pub use selector::{ephemeral_port_range, BlockClaim, BlockSelector};
