//! Outstanding service calls, each waiting on its own signal.
//!
//! An entry is removed exactly once: by the matching response, by the caller's
//! deadline, or by the caller being dropped. Whoever removes it decides the
//! outcome; the others find nothing and do nothing.
use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use crate::core::Record;
use crate::error::NodeError;
use crate::protocol::transport::transfer::TransferId;

/// Completion slot of one call.
pub type ResponseSignal = Signal<CriticalSectionRawMutex, Result<Record, NodeError>>;

/// A response matches a call by the node it came from, its service id and
/// the transfer id of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingKey {
    pub destination: u8,
    pub service_id: u8,
    pub transfer_id: TransferId,
}

#[derive(Default)]
pub struct PendingTable {
    entries: BTreeMap<PendingKey, Arc<ResponseSignal>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call. A stale entry with the same key is replaced, its
    /// caller then runs into its own deadline.
    pub fn insert(&mut self, key: PendingKey, signal: Arc<ResponseSignal>) {
        self.entries.insert(key, signal);
    }

    /// Resolve the call registered under `key`. Returns `false` when no call
    /// waits for it (late, duplicate or unsolicited response).
    pub fn resolve(&mut self, key: &PendingKey, result: Result<Record, NodeError>) -> bool {
        match self.entries.remove(key) {
            Some(signal) => {
                signal.signal(result);
                true
            }
            None => false,
        }
    }

    /// Remove the entry of `key` if it still belongs to `signal`.
    pub fn release(&mut self, key: &PendingKey, signal: &Arc<ResponseSignal>) -> bool {
        let owned = self
            .entries
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, signal));
        if owned {
            self.entries.remove(key);
        }
        owned
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(transfer_id: u8) -> PendingKey {
        PendingKey {
            destination: 20,
            service_id: 1,
            transfer_id: TransferId::new(transfer_id),
        }
    }

    #[test]
    /// Resolution removes the entry and fills the signal once.
    fn test_resolve_once() {
        let mut table = PendingTable::new();
        let signal = Arc::new(ResponseSignal::new());
        table.insert(key(3), signal.clone());

        assert!(table.resolve(&key(3), Ok(Record::new())));
        assert!(!table.resolve(&key(3), Err(NodeError::RequestTimeout)));
        assert_eq!(signal.try_take(), Some(Ok(Record::new())));
        assert!(table.is_empty());
    }

    #[test]
    /// Unknown keys are ignored.
    fn test_resolve_unknown() {
        let mut table = PendingTable::new();
        table.insert(key(3), Arc::new(ResponseSignal::new()));
        assert!(!table.resolve(&key(4), Ok(Record::new())));
        assert_eq!(table.len(), 1);
    }

    #[test]
    /// Release only removes the caller's own entry.
    fn test_release_checks_owner() {
        let mut table = PendingTable::new();
        let first = Arc::new(ResponseSignal::new());
        let second = Arc::new(ResponseSignal::new());
        table.insert(key(0), first.clone());
        table.insert(key(0), second.clone());

        assert!(!table.release(&key(0), &first));
        assert_eq!(table.len(), 1);
        assert!(table.release(&key(0), &second));
        assert!(!table.release(&key(0), &second));
    }
}
