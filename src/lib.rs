//! `dronecan-node` library: a DroneCAN (UAVCAN v0) node for `no_std` targets
//! with an allocator. The crate exposes the infrastructure modules (checksums,
//! bit-level codec), the transport layer (identifiers, frames, transfers) and
//! the node engine driving broadcasts and service calls over one CAN bus.
#![no_std]
extern crate alloc;
//==================================================================================
/// Data contract between applications and the codec: schemas and values.
pub mod core;
/// Error taxonomy: per-call protocol errors, dropped transfers, node and
/// transport failures.
pub mod error;
/// Checksums and the schema-driven bit-level codec.
pub mod infra;
/// DroneCAN protocol implementation: CAN transport, transfers, node engine and
/// standard messages.
pub mod protocol;
//==================================================================================
