//! DroneCAN transfers: the unit exchanged between nodes, carried by one or
//! more CAN frames.
//!
//! A payload of up to seven bytes fits in a single frame. Longer payloads are
//! prefixed with a CRC16 seeded by the data-type signature and split in
//! seven-byte chunks, each followed by a tail byte.
use alloc::vec::Vec;

use crate::error::ProtocolError;
use crate::protocol::transport::can_id::{CanId, CanIdFields};

pub use crate::protocol::transport::can_id::TransferKind;

pub mod assembler;
pub mod builder;
pub mod manager;

/// Largest payload accepted on either side of the transfer layer.
pub const MAX_TRANSFER_PAYLOAD: usize = 4096;
/// Payload bytes carried by one frame next to its tail byte.
pub const FRAME_PAYLOAD_CAPACITY: usize = 7;

//==================================================================================TRANSFER_ID
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Five-bit cyclic transfer counter.
pub struct TransferId(u8);

impl TransferId {
    pub const MAX: u8 = 31;

    /// Keeps the five low-order bits of `value`.
    pub const fn new(value: u8) -> Self {
        Self(value & Self::MAX)
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    /// Following id, wrapping from 31 to 0.
    pub const fn next(self) -> Self {
        Self((self.0 + 1) & Self::MAX)
    }
}

//==================================================================================TRANSFER
#[derive(Clone, Debug, PartialEq, Eq)]
/// A complete transfer, outbound before fragmentation or inbound after reassembly.
pub struct Transfer {
    pub priority: u8,
    pub kind: TransferKind,
    /// Message type id, or service id for requests and responses.
    pub data_type_id: u16,
    pub source: u8,
    /// Present for service transfers only.
    pub destination: Option<u8>,
    pub transfer_id: TransferId,
    pub payload: Vec<u8>,
}

impl Transfer {
    pub fn id_fields(&self) -> CanIdFields {
        CanIdFields {
            priority: self.priority,
            kind: self.kind,
            data_type_id: self.data_type_id,
            source: self.source,
            destination: self.destination,
        }
    }

    pub fn can_id(&self) -> Result<CanId, ProtocolError> {
        self.id_fields().pack()
    }

    /// Whether the payload needs more than one frame.
    pub fn is_multi_frame(&self) -> bool {
        self.payload.len() > FRAME_PAYLOAD_CAPACITY
    }
}
