//! Transfer bookkeeping for one node: outbound transfer-id counters, inbound
//! reassembly and reception statistics.
use alloc::collections::BTreeMap;

use embassy_time::{Duration, Instant};

use super::assembler::{ProcessResult, TransferAssembler};
use super::builder::{FrameIterator, TransferBuilder};
use super::{Transfer, TransferId, TransferKind};
use crate::error::{ProtocolError, TransferError};
use crate::protocol::transport::can_frame::CanFrame;

/// Outbound streams: kind, data type id and destination (`None` for broadcasts).
type OutboundKey = (TransferKind, u16, Option<u8>);
/// Inbound streams: source, kind and data type id.
type InboundKey = (u8, TransferKind, u16);

//==================================================================================RX_STATS
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Reception counters. Drops never reach the application, they end up here.
pub struct RxStats {
    /// Transfers delivered.
    pub transfers: u32,
    pub crc_errors: u32,
    pub toggle_errors: u32,
    /// Stale continuations and sessions dropped by the reassembly timeout.
    pub stale: u32,
    pub malformed: u32,
    pub oversized: u32,
    /// Delivered transfers whose id skipped ahead of the previous one.
    pub gaps: u32,
}

impl RxStats {
    fn record(&mut self, error: TransferError) {
        let counter = match error {
            TransferError::CrcMismatch => &mut self.crc_errors,
            TransferError::ToggleMismatch => &mut self.toggle_errors,
            TransferError::StaleTransfer => &mut self.stale,
            TransferError::MalformedFrame => &mut self.malformed,
            TransferError::PayloadTooLarge => &mut self.oversized,
        };
        *counter = counter.saturating_add(1);
    }
}

//==================================================================================TRANSFER_MANAGER
#[derive(Debug)]
pub struct TransferManager {
    assembler: TransferAssembler,
    next_transfer_ids: BTreeMap<OutboundKey, TransferId>,
    last_received: BTreeMap<InboundKey, TransferId>,
    stats: RxStats,
}

impl TransferManager {
    /// `transfer_timeout` bounds the reassembly of one multi-frame transfer.
    pub fn new(transfer_timeout: Duration) -> Self {
        Self {
            assembler: TransferAssembler::new(transfer_timeout),
            next_transfer_ids: BTreeMap::new(),
            last_received: BTreeMap::new(),
            stats: RxStats::default(),
        }
    }

    /// Assign the transfer id and produce the frames of `transfer`.
    ///
    /// Messages and requests take the next id of their stream, starting at 0.
    /// Responses keep the id of the request they answer. Nothing is consumed
    /// when the transfer cannot be framed.
    pub fn send(
        &mut self,
        mut transfer: Transfer,
        signature: u64,
    ) -> Result<FrameIterator, ProtocolError> {
        if transfer.kind == TransferKind::Response {
            return TransferBuilder::new(transfer, signature).map(TransferBuilder::build);
        }

        let key = (transfer.kind, transfer.data_type_id, transfer.destination);
        let transfer_id = self.next_transfer_ids.get(&key).copied().unwrap_or_default();
        transfer.transfer_id = transfer_id;
        let builder = TransferBuilder::new(transfer, signature)?;
        self.next_transfer_ids.insert(key, transfer_id.next());
        Ok(builder.build())
    }

    /// Feed one inbound frame; returns the transfer it completes, if any.
    pub fn receive(&mut self, frame: &CanFrame, signature: u64, now: Instant) -> Option<Transfer> {
        match self.assembler.process_frame(frame, signature, now) {
            ProcessResult::FragmentConsumed => None,
            ProcessResult::TransferComplete(transfer) => {
                self.track(&transfer);
                Some(transfer)
            }
            ProcessResult::Dropped(error) => {
                #[cfg(feature = "defmt")]
                defmt::debug!(
                    "Dropped frame {=u32:#x} from node {}: {}",
                    frame.id.0,
                    frame.id.source(),
                    error
                );
                self.stats.record(error);
                None
            }
        }
    }

    /// Drop reassembly sessions past the transfer timeout.
    pub fn cleanup(&mut self, now: Instant) {
        let dropped = self.assembler.cleanup(now);
        if dropped > 0 {
            #[cfg(feature = "defmt")]
            defmt::debug!("Reassembly timeout dropped {} session(s)", dropped);
            self.stats.stale = self.stats.stale.saturating_add(dropped as u32);
        }
    }

    pub fn stats(&self) -> RxStats {
        self.stats
    }

    /// Id the next message or request on this stream will carry.
    pub fn next_transfer_id(
        &self,
        kind: TransferKind,
        data_type_id: u16,
        destination: Option<u8>,
    ) -> TransferId {
        self.next_transfer_ids
            .get(&(kind, data_type_id, destination))
            .copied()
            .unwrap_or_default()
    }

    fn track(&mut self, transfer: &Transfer) {
        self.stats.transfers = self.stats.transfers.saturating_add(1);
        let key = (transfer.source, transfer.kind, transfer.data_type_id);
        let previous = self.last_received.insert(key, transfer.transfer_id);
        if let Some(previous) = previous {
            if previous.next() != transfer.transfer_id {
                #[cfg(feature = "defmt")]
                defmt::trace!(
                    "Transfer id gap from node {}: {} -> {}",
                    transfer.source,
                    previous,
                    transfer.transfer_id
                );
                self.stats.gaps = self.stats.gaps.saturating_add(1);
            }
        }
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
