//! DroneCAN transport layer: CAN frame representations, 29-bit identifier
//! management, transfer fragmentation/reassembly, and bus abstraction traits.
//!
//! ## Timing and sizing defaults
//!
//! The constants below seed [`NodeConfig`](crate::protocol::node::config::NodeConfig)
//! and size the queues of a node.

pub mod can_frame;
pub mod can_id;
pub mod traits;
pub mod transfer;

/// Priority used when none is configured (mid-range on the 0..=31 scale).
pub const DEFAULT_PRIORITY: u8 = 16;

/// Maximum time between the first and the last frame of an inbound transfer (ms).
///
/// Sessions older than this are discarded, so a sender that stopped halfway
/// never pins a reassembly buffer.
pub const TRANSFER_TIMEOUT_MS: u64 = 2_000;

/// Default deadline for a service call to receive its response (ms).
pub const REQUEST_TIMEOUT_MS: u64 = 1_000;

/// Number of complete outbound transfers that can wait for the dispatch loop.
///
/// Producers suspend when the queue is full, which throttles them to the bus rate.
pub const OUTBOUND_QUEUE_DEPTH: usize = 8;
