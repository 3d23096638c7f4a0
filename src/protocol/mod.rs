//! High-level components of the DroneCAN protocol: standard message schemas,
//! the node engine, and CAN transfer transport.
pub mod messages;
pub mod node;
pub mod transport;
