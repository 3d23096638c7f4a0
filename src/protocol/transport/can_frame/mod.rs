//! In-memory representation of a DroneCAN frame: an extended CAN data frame
//! whose last valid byte is the tail byte.
use crate::protocol::transport::can_id::CanId;
use crate::protocol::transport::transfer::TransferId;

#[derive(Clone, Debug, PartialEq, Eq)]
/// Raw frame as read from or written to the CAN bus.
pub struct CanFrame {
    /// Full 29-bit CAN identifier stored inside a `u32`.
    pub id: CanId,
    /// Payload buffer. Classic CAN frames always provide eight bytes.
    pub data: [u8; 8],
    /// Number of valid bytes (Data Length Code, 0 to 8).
    pub len: usize,
}

impl CanFrame {
    /// Frame carrying `payload` (at most seven bytes) followed by `tail`.
    pub fn with_tail(id: CanId, payload: &[u8], tail: TailByte) -> Self {
        let len = payload.len().min(7);
        let mut data = [0; 8];
        data[..len].copy_from_slice(&payload[..len]);
        data[len] = tail.0;
        Self {
            id,
            data,
            len: len + 1,
        }
    }

    /// Valid bytes, tail byte included.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len.min(8)]
    }

    /// Transfer bytes preceding the tail byte.
    pub fn payload(&self) -> &[u8] {
        let bytes = self.bytes();
        &bytes[..bytes.len().saturating_sub(1)]
    }

    /// `None` for an empty frame.
    pub fn tail(&self) -> Option<TailByte> {
        self.bytes().last().copied().map(TailByte)
    }
}

impl embedded_can::Frame for CanFrame {
    fn new(id: impl Into<embedded_can::Id>, data: &[u8]) -> Option<Self> {
        let embedded_can::Id::Extended(id) = id.into() else {
            return None;
        };
        if data.len() > 8 {
            return None;
        }
        let mut buffer = [0; 8];
        buffer[..data.len()].copy_from_slice(data);
        Some(Self {
            id: CanId(id.as_raw()),
            data: buffer,
            len: data.len(),
        })
    }

    /// DroneCAN never uses remote frames.
    fn new_remote(_id: impl Into<embedded_can::Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        true
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> embedded_can::Id {
        // Identifiers built by this crate never exceed 29 bits.
        embedded_can::ExtendedId::new(self.id.0 & 0x1FFF_FFFF)
            .map(embedded_can::Id::Extended)
            .unwrap_or(embedded_can::Id::Extended(embedded_can::ExtendedId::ZERO))
    }

    fn dlc(&self) -> usize {
        self.len
    }

    fn data(&self) -> &[u8] {
        self.bytes()
    }
}

//==================================================================================TAIL_BYTE
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// `| start:1 | end:1 | toggle:1 | transfer id:5 |`
pub struct TailByte(pub u8);

impl TailByte {
    pub const fn new(start: bool, end: bool, toggle: bool, transfer_id: TransferId) -> Self {
        Self(
            ((start as u8) << 7) | ((end as u8) << 6) | ((toggle as u8) << 5) | transfer_id.value(),
        )
    }

    pub const fn start_of_transfer(self) -> bool {
        self.0 & 0x80 != 0
    }

    pub const fn end_of_transfer(self) -> bool {
        self.0 & 0x40 != 0
    }

    pub const fn toggle(self) -> bool {
        self.0 & 0x20 != 0
    }

    pub const fn transfer_id(self) -> TransferId {
        TransferId::new(self.0)
    }
}
