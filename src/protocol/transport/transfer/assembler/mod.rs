//! Transfer assembler: rebuilds inbound transfers by aggregating the frames of
//! multi-frame sessions, validating toggle bits, transfer ids and the CRC.
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use embassy_time::{Duration, Instant};

use super::{Transfer, TransferId, TransferKind, MAX_TRANSFER_PAYLOAD};
use crate::error::TransferError;
use crate::infra::crc::{transfer_crc, TransferCrc};
use crate::protocol::transport::can_frame::CanFrame;

//==================================================================================Enums and Structs
#[derive(Debug, PartialEq, Eq)]
pub enum ProcessResult {
    /// Frame integrated, more fragments are expected.
    FragmentConsumed,
    /// All fragments received and validated.
    TransferComplete(Transfer),
    /// The frame was rejected; any session it belonged to is discarded.
    Dropped(TransferError),
}

/// Sessions are told apart by kind, data type, source and destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct SessionKey {
    kind: TransferKind,
    data_type_id: u16,
    source: u8,
    destination: Option<u8>,
}

/// Internal structure tracking one multi-frame transfer in progress.
#[derive(Debug)]
struct Session {
    priority: u8,
    transfer_id: TransferId,
    expected_toggle: bool,
    crc: u16,
    payload: Vec<u8>,
    started_at: Instant,
}

/// Reassembly state for every multi-frame transfer currently in progress.
#[derive(Debug)]
pub struct TransferAssembler {
    sessions: BTreeMap<SessionKey, Session>,
    timeout: Duration,
}

impl TransferAssembler {
    /// `timeout` bounds the time between the first and the last frame.
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: BTreeMap::new(),
            timeout,
        }
    }

    /// Number of sessions currently open.
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    //==================================================================================Process Functions
    /// Process one inbound frame.
    ///
    /// * `signature` – signature of the frame's data type, seeds the CRC
    /// * `now` – reception timestamp
    pub fn process_frame(&mut self, frame: &CanFrame, signature: u64, now: Instant) -> ProcessResult {
        let Some(tail) = frame.tail() else {
            return ProcessResult::Dropped(TransferError::MalformedFrame);
        };
        let Ok(fields) = frame.id.fields() else {
            return ProcessResult::Dropped(TransferError::MalformedFrame);
        };
        let key = SessionKey {
            kind: fields.kind,
            data_type_id: fields.data_type_id,
            source: fields.source,
            destination: fields.destination,
        };
        let complete = |payload: Vec<u8>, priority: u8, transfer_id: TransferId| Transfer {
            priority,
            kind: key.kind,
            data_type_id: key.data_type_id,
            source: key.source,
            destination: key.destination,
            transfer_id,
            payload,
        };

        if tail.start_of_transfer() {
            // A new start supersedes whatever the sender left unfinished.
            self.sessions.remove(&key);
            if tail.toggle() {
                return ProcessResult::Dropped(TransferError::ToggleMismatch);
            }
            if tail.end_of_transfer() {
                return ProcessResult::TransferComplete(complete(
                    frame.payload().to_vec(),
                    fields.priority,
                    tail.transfer_id(),
                ));
            }

            let payload = frame.payload();
            if payload.len() < TransferCrc::LENGTH {
                return ProcessResult::Dropped(TransferError::MalformedFrame);
            }
            self.sessions.insert(
                key,
                Session {
                    priority: fields.priority,
                    transfer_id: tail.transfer_id(),
                    expected_toggle: true,
                    crc: u16::from_le_bytes([payload[0], payload[1]]),
                    payload: payload[TransferCrc::LENGTH..].to_vec(),
                    started_at: now,
                },
            );
            return ProcessResult::FragmentConsumed;
        }

        // Continuation frame.
        let Some(session) = self.sessions.get_mut(&key) else {
            return ProcessResult::Dropped(TransferError::StaleTransfer);
        };
        let error = if session.transfer_id != tail.transfer_id()
            || now.saturating_duration_since(session.started_at) > self.timeout
        {
            Some(TransferError::StaleTransfer)
        } else if session.expected_toggle != tail.toggle() {
            Some(TransferError::ToggleMismatch)
        } else if session.payload.len() + frame.payload().len() > MAX_TRANSFER_PAYLOAD {
            Some(TransferError::PayloadTooLarge)
        } else {
            None
        };
        if let Some(error) = error {
            self.sessions.remove(&key);
            return ProcessResult::Dropped(error);
        }

        session.payload.extend_from_slice(frame.payload());
        session.expected_toggle = !session.expected_toggle;
        if !tail.end_of_transfer() {
            return ProcessResult::FragmentConsumed;
        }

        let Some(session) = self.sessions.remove(&key) else {
            return ProcessResult::Dropped(TransferError::StaleTransfer);
        };
        if transfer_crc(signature, &session.payload) != session.crc {
            return ProcessResult::Dropped(TransferError::CrcMismatch);
        }
        ProcessResult::TransferComplete(complete(
            session.payload,
            session.priority,
            session.transfer_id,
        ))
    }

    /// Drop sessions started more than the timeout ago; returns how many.
    pub fn cleanup(&mut self, now: Instant) -> usize {
        let before = self.sessions.len();
        let timeout = self.timeout;
        self.sessions
            .retain(|_, session| now.saturating_duration_since(session.started_at) <= timeout);
        before - self.sessions.len()
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
