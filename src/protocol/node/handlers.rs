//! Application callbacks registered on a node.
//!
//! Listeners and producers run synchronously inside the dispatch loop and must
//! return quickly. Service handlers are asynchronous; the dispatch loop awaits
//! them before reading the next frame, so a handler must not wait on a call
//! issued through the same node.
use alloc::boxed::Box;
use core::future::Future;

use async_trait::async_trait;
use embassy_time::Instant;

use crate::core::Record;
use crate::error::HandlerError;
use crate::protocol::transport::transfer::TransferId;

/// Transport details of an inbound transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferMeta {
    pub source: u8,
    pub transfer_id: TransferId,
    pub priority: u8,
}

//==================================================================================MESSAGE_LISTENER
/// Receives every decoded broadcast of one message type.
pub trait MessageListener: Send + Sync {
    fn on_message(&self, meta: &TransferMeta, message: &Record);
}

impl<F> MessageListener for F
where
    F: Fn(&TransferMeta, &Record) + Send + Sync,
{
    fn on_message(&self, meta: &TransferMeta, message: &Record) {
        self(meta, message)
    }
}

//==================================================================================SERVICE_HANDLER
/// Serves the requests of one service. The returned record is sent back to
/// the requester; an error suppresses the response.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    async fn handle(&self, meta: TransferMeta, request: Record) -> Result<Record, HandlerError>;
}

#[async_trait]
impl<F, Fut> ServiceHandler for F
where
    F: Fn(TransferMeta, Record) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Record, HandlerError>> + Send,
{
    async fn handle(&self, meta: TransferMeta, request: Record) -> Result<Record, HandlerError> {
        self(meta, request).await
    }
}

//==================================================================================BROADCAST_PRODUCER
/// Builds the next value of a periodic broadcast.
pub trait BroadcastProducer: Send + Sync {
    fn produce(&self, now: Instant) -> Record;
}

impl<F> BroadcastProducer for F
where
    F: Fn(Instant) -> Record + Send + Sync,
{
    fn produce(&self, now: Instant) -> Record {
        self(now)
    }
}
