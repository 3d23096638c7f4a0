//! Creation and extraction of the 29-bit CAN identifiers used by DroneCAN.
//!
//! ```text
//! message: | priority:5 | type id:16                              | 0 | source:7 |
//! service: | priority:5 | service id:8 | request:1 | destination:7 | 1 | source:7 |
//! ```
use crate::error::ProtocolError;
use crate::protocol::transport::DEFAULT_PRIORITY;

/// Highest node id on a DroneCAN bus.
pub const MAX_NODE_ID: u8 = 127;
/// Largest priority value (lowest urgency).
pub const MAX_PRIORITY: u8 = 31;
const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;

//==================================================================================TRANSFER_KIND
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Broadcast message, or one side of a service exchange.
pub enum TransferKind {
    Message,
    Request,
    Response,
}

impl TransferKind {
    pub fn is_service(self) -> bool {
        !matches!(self, TransferKind::Message)
    }
}

//==================================================================================CAN_ID
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Encapsulates an extended CAN identifier (29 bits).
pub struct CanId(pub u32);

impl CanId {
    /// Creates a `CanIdBuilder` for a broadcast of `data_type_id` from `source`.
    pub fn builder(data_type_id: u16, source: u8) -> CanIdBuilder {
        CanIdBuilder::new(data_type_id, source)
    }

    /// Priority (5 bits, 0 is the most urgent).
    pub fn priority(&self) -> u8 {
        ((self.0 >> 24) & 0x1F) as u8
    }

    /// Seven-bit source node id; 0 marks an anonymous frame.
    pub fn source(&self) -> u8 {
        (self.0 & 0x7F) as u8
    }

    pub fn is_service(&self) -> bool {
        (self.0 >> 7) & 0x01 == 1
    }

    /// Destination node id of a service frame.
    pub fn destination(&self) -> Option<u8> {
        self.is_service().then(|| ((self.0 >> 8) & 0x7F) as u8)
    }

    pub fn kind(&self) -> TransferKind {
        match (self.is_service(), (self.0 >> 15) & 0x01) {
            (false, _) => TransferKind::Message,
            (true, 1) => TransferKind::Request,
            (true, _) => TransferKind::Response,
        }
    }

    /// Message type id (16 bits) or service id (8 bits).
    pub fn data_type_id(&self) -> u16 {
        if self.is_service() {
            ((self.0 >> 16) & 0xFF) as u16
        } else {
            ((self.0 >> 8) & 0xFFFF) as u16
        }
    }

    /// Decompose the identifier, rejecting values wider than 29 bits.
    pub fn fields(&self) -> Result<CanIdFields, ProtocolError> {
        if self.0 & !EXTENDED_ID_MASK != 0 {
            return Err(ProtocolError::InvalidIdentifier {
                field: "raw",
                value: self.0,
            });
        }
        Ok(CanIdFields {
            priority: self.priority(),
            kind: self.kind(),
            data_type_id: self.data_type_id(),
            source: self.source(),
            destination: self.destination(),
        })
    }
}

//==================================================================================CAN_ID_FIELDS
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Decomposed view of a [`CanId`]. `pack` and [`CanId::fields`] are inverses.
pub struct CanIdFields {
    pub priority: u8,
    pub kind: TransferKind,
    pub data_type_id: u16,
    pub source: u8,
    /// Present for service frames only.
    pub destination: Option<u8>,
}

impl CanIdFields {
    /// Pack the fields into a 29-bit identifier.
    pub fn pack(&self) -> Result<CanId, ProtocolError> {
        check("priority", self.priority as u32, MAX_PRIORITY as u32)?;
        check("source", self.source as u32, MAX_NODE_ID as u32)?;
        let head = ((self.priority as u32) << 24) | self.source as u32;

        match (self.kind, self.destination) {
            (TransferKind::Message, None) => {
                Ok(CanId(head | ((self.data_type_id as u32) << 8)))
            }
            (TransferKind::Message, Some(destination)) => Err(ProtocolError::InvalidIdentifier {
                field: "destination",
                value: destination as u32,
            }),
            (_, None) => Err(ProtocolError::InvalidIdentifier {
                field: "destination",
                value: 0,
            }),
            (kind, Some(destination)) => {
                check("service_id", self.data_type_id as u32, 0xFF)?;
                check("destination", destination as u32, MAX_NODE_ID as u32)?;
                let request = (kind == TransferKind::Request) as u32;
                Ok(CanId(
                    head | ((self.data_type_id as u32) << 16)
                        | (request << 15)
                        | ((destination as u32) << 8)
                        | (1 << 7),
                ))
            }
        }
    }
}

fn check(field: &'static str, value: u32, max: u32) -> Result<(), ProtocolError> {
    if value > max {
        Err(ProtocolError::InvalidIdentifier { field, value })
    } else {
        Ok(())
    }
}

//==================================================================================CAN_ID_BUILDER
#[derive(Debug)]
/// Fluent identifier builder; defaults to a broadcast at [`DEFAULT_PRIORITY`].
pub struct CanIdBuilder {
    fields: CanIdFields,
}

impl CanIdBuilder {
    pub fn new(data_type_id: u16, source: u8) -> Self {
        Self {
            fields: CanIdFields {
                priority: DEFAULT_PRIORITY,
                kind: TransferKind::Message,
                data_type_id,
                source,
                destination: None,
            },
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.fields.priority = priority;
        self
    }

    /// Turns the identifier into a service request addressed to `destination`.
    pub fn request_to(mut self, destination: u8) -> Self {
        self.fields.kind = TransferKind::Request;
        self.fields.destination = Some(destination);
        self
    }

    /// Turns the identifier into a service response addressed to `destination`.
    pub fn response_to(mut self, destination: u8) -> Self {
        self.fields.kind = TransferKind::Response;
        self.fields.destination = Some(destination);
        self
    }

    pub fn build(self) -> Result<CanId, ProtocolError> {
        self.fields.pack()
    }
}
