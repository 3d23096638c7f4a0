//! Error definitions shared across library modules.
//! Each type models one failure scope: a single encode/decode/pack call
//! (`ProtocolError`), a single inbound transfer (`TransferError`), a single
//! node operation (`NodeError`) or the whole node (`RunError`).
use thiserror_no_std::Error;

//==================================================================================PROTOCOL_ERROR
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Failures of a single identifier, encode or decode call. They never corrupt
/// state outside the call that raised them.
pub enum ProtocolError {
    /// An identifier field does not fit its allotted bit width.
    #[error("Invalid CAN identifier: {field} = {value}")]
    InvalidIdentifier { field: &'static str, value: u32 },
    /// The buffer is shorter than the schema requires, or the record does not
    /// have the shape the schema declares.
    #[error("Schema mismatch on field {field}")]
    SchemaMismatch { field: &'static str },
    /// A value exceeds the width or length declared for its field.
    #[error("Value out of range for field {field}")]
    FieldOutOfRange { field: &'static str },
    /// Enumeration label unknown on encode, or decoded ordinal without label.
    #[error("Invalid enumeration value for field {field}")]
    InvalidEnumValue { field: &'static str },
    /// The schema declaration itself is not valid.
    #[error("Invalid schema declaration: {field}")]
    InvalidSchema { field: &'static str },
}

//==================================================================================TRANSFER_ERROR
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Reasons an inbound transfer is dropped. These never escape the transfer
/// manager: the affected transfer is discarded, counted and logged.
pub enum TransferError {
    /// CRC over (signature ++ payload) does not match the transmitted one.
    #[error("Transfer CRC mismatch")]
    CrcMismatch,
    /// Toggle bit out of sequence.
    #[error("Toggle bit mismatch")]
    ToggleMismatch,
    /// Continuation without an open buffer, with a different transfer id, or
    /// arriving after the reassembly timeout.
    #[error("Stale transfer")]
    StaleTransfer,
    /// Frame without tail byte or a start frame too short to carry the CRC.
    #[error("Malformed frame")]
    MalformedFrame,
    /// Reassembled payload exceeds the transfer payload cap.
    #[error("Transfer payload too large")]
    PayloadTooLarge,
}

//==================================================================================NODE_ERROR
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors scoped to a single node operation (broadcast, call, registration).
pub enum NodeError {
    /// No response matched the request before its deadline.
    #[error("Request timed out")]
    RequestTimeout,
    /// The data type is not part of the node's schema registry.
    #[error("Unknown data type {name}")]
    UnknownType { name: &'static str },
    /// The message schema has no numeric id and cannot go on the wire.
    #[error("Data type {name} has no numeric id")]
    MissingTypeId { name: &'static str },
    /// Another listened type already uses this id with a different signature.
    #[error("Data type {name} shares its id with another listened type")]
    TypeIdConflict { name: &'static str },
    /// A periodic broadcast needs a non-zero period.
    #[error("Broadcast period of {name} is zero")]
    InvalidPeriod { name: &'static str },
    /// A request handler is already registered for this service.
    #[error("Handler already registered for {name}")]
    DuplicateHandler { name: &'static str },
    /// Node id outside the range accepted for this operation.
    #[error("Invalid node id {node_id}")]
    InvalidNodeId { node_id: u8 },
    /// Encoding or decoding failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

//==================================================================================RUN_ERROR
#[derive(Error, Debug)]
/// Transport failures. They are the only errors that stop the dispatch loop.
pub enum RunError<E: core::fmt::Debug> {
    /// Unable to receive frames from the bus.
    #[error("CAN bus receive error: {0:?}")]
    Receive(E),
    /// The bus refused a frame.
    #[error("CAN bus send error: {0:?}")]
    Send(E),
}

//==================================================================================HANDLER_ERROR
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Returned by a service handler that declines to answer. No response is sent.
pub enum HandlerError {
    /// The request was understood but cannot be served.
    #[error("Request rejected")]
    Rejected,
    /// Building the response failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

//==================================================================================BITREADER_ERRORS
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
/// Errors raised during bitwise buffer reads.
pub enum BitReaderError {
    /// Attempted to read past the end of the buffer.
    #[error("Attempted to read out of bounds -> asked: {asked}, available: {available}")]
    OutOfBounds { asked: usize, available: usize },
    /// Requested more bits than the target type can hold.
    #[error("Cannot read more than {max} bits. Requested: {asked}")]
    TooLongForType { max: u8, asked: u8 },
}
//==================================================================================BITWRITER_ERRORS
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
/// Errors raised during bitwise writes.
pub enum BitWriterError {
    /// Field is too large for the provided type.
    #[error("Cannot write more than {max} bits. Requested: {asked}")]
    TooLongForType { max: u8, asked: u8 },
}
