//! CAN frame generator for outbound transfers. Builds the frame sequence
//! (single or multi-frame) lazily from a complete transfer.
use alloc::vec::Vec;

use super::{Transfer, TransferId, FRAME_PAYLOAD_CAPACITY, MAX_TRANSFER_PAYLOAD};
use crate::error::ProtocolError;
use crate::infra::crc::{transfer_crc, TransferCrc};
use crate::protocol::transport::can_frame::{CanFrame, TailByte};
use crate::protocol::transport::can_id::CanId;

#[derive(Debug)]
/// Parameters shared by all frames of one transfer.
pub struct TransferBuilder {
    id: CanId,
    transfer_id: TransferId,
    /// Bytes spread over the frames: CRC prefix included for multi-frame transfers.
    data: Vec<u8>,
}

impl TransferBuilder {
    /// Packs the CAN identifier up front and prepends the transfer CRC when
    /// the payload spans several frames.
    pub fn new(transfer: Transfer, signature: u64) -> Result<Self, ProtocolError> {
        if transfer.payload.len() > MAX_TRANSFER_PAYLOAD {
            return Err(ProtocolError::FieldOutOfRange { field: "payload" });
        }
        let id = transfer.can_id()?;
        let data = if transfer.is_multi_frame() {
            let crc = transfer_crc(signature, &transfer.payload);
            let mut data = Vec::with_capacity(TransferCrc::LENGTH + transfer.payload.len());
            data.extend_from_slice(&crc.to_le_bytes());
            data.extend_from_slice(&transfer.payload);
            data
        } else {
            transfer.payload
        };
        Ok(Self {
            id,
            transfer_id: transfer.transfer_id,
            data,
        })
    }

    /// Start the iteration; each call to `next` yields the next frame.
    pub fn build(self) -> FrameIterator {
        FrameIterator {
            builder: self,
            cursor: 0,
            toggle: false,
            done: false,
        }
    }
}

/// Lazy iterator returning frames one by one, in transmission order.
#[derive(Debug)]
pub struct FrameIterator {
    builder: TransferBuilder,
    cursor: usize,
    toggle: bool,
    done: bool,
}

impl FrameIterator {
    pub fn can_id(&self) -> CanId {
        self.builder.id
    }

    pub fn transfer_id(&self) -> TransferId {
        self.builder.transfer_id
    }
}

impl Iterator for FrameIterator {
    type Item = CanFrame;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let data = &self.builder.data;
        let chunk = FRAME_PAYLOAD_CAPACITY.min(data.len() - self.cursor);
        let start = self.cursor == 0;
        let end = self.cursor + chunk >= data.len();

        let tail = TailByte::new(start, end, self.toggle, self.builder.transfer_id);
        let frame = CanFrame::with_tail(
            self.builder.id,
            &data[self.cursor..self.cursor + chunk],
            tail,
        );

        self.cursor += chunk;
        self.toggle = !self.toggle;
        self.done = end;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.done {
            0
        } else {
            let left = self.builder.data.len() - self.cursor;
            left.div_ceil(FRAME_PAYLOAD_CAPACITY).max(1)
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for FrameIterator {}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
