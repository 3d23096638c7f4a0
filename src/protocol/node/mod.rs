//! DroneCAN node engine: periodic broadcasts, service calls, request handlers
//! and the dispatch loop tying them to one CAN bus.
//!
//! The engine is shared by reference between the task driving [`NodeEngine::run`]
//! and any number of tasks calling [`NodeEngine::broadcast`] or
//! [`NodeEngine::call`]. All protocol state sits behind one critical section;
//! only the dispatch loop touches the bus.
//!
//! ```rust,ignore
//! let mut node = NodeEngine::new(bus, timer, NodeConfig::new(99)?, messages::standard_registry()?);
//! node.add_broadcaster(messages::NODE_STATUS, Duration::from_secs(1), move |now: Instant| {
//!     messages::node_status_record((now - start).as_secs() as u32, "ok", "operational")
//! })?;
//! node.on_request(messages::GET_NODE_INFO, |_meta, _request| async { Ok(node_info()) })?;
//! node.run().await?;
//! ```
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::convert::Infallible;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Instant};
use futures_util::{future::select, future::Either, pin_mut};

use crate::core::{MessageSchema, Record, SchemaRegistry, ServiceSchema};
use crate::error::{NodeError, ProtocolError, RunError};
use crate::infra::codec::engine::{decode, encode};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::MAX_NODE_ID;
use crate::protocol::transport::traits::{
    can_bus::CanBus, frame_sender::FrameSender, node_timer::NodeTimer,
};
use crate::protocol::transport::transfer::manager::{RxStats, TransferManager};
use crate::protocol::transport::transfer::{Transfer, TransferId, TransferKind};
use crate::protocol::transport::OUTBOUND_QUEUE_DEPTH;

pub mod config;
pub mod handlers;
pub mod pending;

use config::NodeConfig;
use handlers::{BroadcastProducer, MessageListener, ServiceHandler, TransferMeta};
use pending::{PendingKey, PendingTable, ResponseSignal};

/// Protocol state guarded by the node's critical section.
struct EngineState {
    transfers: TransferManager,
    pending: PendingTable,
}

type SharedState = BlockingMutex<CriticalSectionRawMutex, RefCell<EngineState>>;

struct Broadcaster {
    schema: Arc<MessageSchema>,
    period: Duration,
    producer: Box<dyn BroadcastProducer>,
}

/// One event of the dispatch loop.
enum Event<E> {
    Frame(Result<CanFrame, E>),
    Outbound(Vec<CanFrame>),
    BroadcastDue,
}

//==================================================================================NODE_ENGINE
pub struct NodeEngine<C: CanBus, T: NodeTimer> {
    config: NodeConfig,
    registry: SchemaRegistry,
    timer: T,
    bus: Mutex<CriticalSectionRawMutex, C>,
    state: SharedState,
    /// Complete outbound transfers, written by the dispatch loop in order.
    outbound: Channel<CriticalSectionRawMutex, Vec<CanFrame>, OUTBOUND_QUEUE_DEPTH>,
    listeners: Vec<(Arc<MessageSchema>, Box<dyn MessageListener>)>,
    handlers: Vec<(Arc<ServiceSchema>, Box<dyn ServiceHandler>)>,
    broadcasters: Vec<Broadcaster>,
}

impl<C, T> NodeEngine<C, T>
where
    C: CanBus,
    T: NodeTimer,
{
    pub fn new(bus: C, timer: T, config: NodeConfig, registry: SchemaRegistry) -> Self {
        Self {
            state: BlockingMutex::new(RefCell::new(EngineState {
                transfers: TransferManager::new(config.transfer_timeout()),
                pending: PendingTable::new(),
            })),
            config,
            registry,
            timer,
            bus: Mutex::new(bus),
            outbound: Channel::new(),
            listeners: Vec::new(),
            handlers: Vec::new(),
            broadcasters: Vec::new(),
        }
    }

    pub fn node_id(&self) -> u8 {
        self.config.node_id()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Reception counters of the transfer layer.
    pub fn stats(&self) -> RxStats {
        self.state.lock(|state| state.borrow().transfers.stats())
    }

    /// Number of calls waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.state.lock(|state| state.borrow().pending.len())
    }

    //==================================================================================REGISTRATION
    /// Invoke `listener` for every inbound broadcast of `name`.
    ///
    /// Broadcasts are routed by type id, so every listened type must own its
    /// id: a type sharing it with another listened type under a different
    /// signature is refused.
    pub fn on_message(
        &mut self,
        name: &'static str,
        listener: impl MessageListener + 'static,
    ) -> Result<(), NodeError> {
        let schema = self.message_schema(name)?;
        if self
            .listeners
            .iter()
            .any(|(s, _)| s.id.is_some() && s.id == schema.id && s.signature != schema.signature)
        {
            return Err(NodeError::TypeIdConflict { name });
        }
        self.listeners.push((schema, Box::new(listener)));
        Ok(())
    }

    /// Serve the requests of service `name` with `handler`.
    pub fn on_request(
        &mut self,
        name: &'static str,
        handler: impl ServiceHandler + 'static,
    ) -> Result<(), NodeError> {
        let schema = self.service_schema(name)?;
        if self.handlers.iter().any(|(s, _)| s.id == schema.id) {
            return Err(NodeError::DuplicateHandler { name });
        }
        self.handlers.push((schema, Box::new(handler)));
        Ok(())
    }

    /// Broadcast the value built by `producer` every `period`, starting one
    /// period after the dispatch loop starts. The period must not be zero.
    pub fn add_broadcaster(
        &mut self,
        name: &'static str,
        period: Duration,
        producer: impl BroadcastProducer + 'static,
    ) -> Result<(), NodeError> {
        let schema = self.message_schema(name)?;
        if schema.id.is_none() {
            return Err(NodeError::MissingTypeId { name });
        }
        if period == Duration::from_ticks(0) {
            return Err(NodeError::InvalidPeriod { name });
        }
        self.broadcasters.push(Broadcaster {
            schema,
            period,
            producer: Box::new(producer),
        });
        Ok(())
    }

    //==================================================================================OPERATIONS
    /// Encode `message` and queue it as one broadcast transfer.
    pub async fn broadcast(&self, name: &'static str, message: &Record) -> Result<(), NodeError> {
        let schema = self.message_schema(name)?;
        let frames = self.frame_message(&schema, message)?;
        self.outbound.send(frames).await;
        Ok(())
    }

    /// Send a request to `destination` and wait for the matching response.
    ///
    /// Fails with [`NodeError::RequestTimeout`] when nothing matches before the
    /// configured deadline. Dropping the future cancels the call.
    pub async fn call(
        &self,
        destination: u8,
        name: &'static str,
        request: &Record,
    ) -> Result<Record, NodeError> {
        if !(1..=MAX_NODE_ID).contains(&destination) || destination == self.node_id() {
            return Err(NodeError::InvalidNodeId {
                node_id: destination,
            });
        }
        let deadline = self.timer.now() + self.config.request_timeout();
        let service = self.service_schema(name)?;
        let transfer = Transfer {
            priority: self.config.priority(),
            kind: TransferKind::Request,
            data_type_id: service.id as u16,
            source: self.node_id(),
            destination: Some(destination),
            transfer_id: TransferId::default(),
            payload: encode(&service.request, request)?,
        };

        let signal = Arc::new(ResponseSignal::new());
        let (frames, key) = self.state.lock(|state| {
            let mut state = state.borrow_mut();
            let frames = state.transfers.send(transfer, service.signature)?;
            let key = PendingKey {
                destination,
                service_id: service.id,
                transfer_id: frames.transfer_id(),
            };
            state.pending.insert(key, signal.clone());
            Ok::<_, ProtocolError>((frames, key))
        })?;
        let guard = PendingGuard {
            state: &self.state,
            key,
            signal: &signal,
        };

        #[cfg(feature = "defmt")]
        defmt::debug!("Calling service {} on node {} ({})", name, destination, key.transfer_id);
        self.outbound.send(frames.collect()).await;

        let response = {
            let response = signal.wait();
            let expired = self.timer.delay_until(deadline);
            pin_mut!(response);
            pin_mut!(expired);
            match select(response, expired).await {
                Either::Left((result, _)) => Some(result),
                Either::Right(((), _)) => None,
            }
        };

        match response {
            Some(result) => result,
            // The response may have been delivered between the deadline firing
            // and the entry being released.
            None if guard.release() => Err(NodeError::RequestTimeout),
            None => signal.try_take().unwrap_or(Err(NodeError::RequestTimeout)),
        }
    }

    //==================================================================================DISPATCH_LOOP
    /// Drive the node: receive and dispatch frames, write queued transfers and
    /// emit periodic broadcasts. Only a transport failure ends the loop.
    pub async fn run(&self) -> Result<Infallible, RunError<C::Error>> {
        let mut bus = self.bus.lock().await;
        let started = self.timer.now();
        let mut schedule: Vec<Instant> = self
            .broadcasters
            .iter()
            .map(|broadcaster| started + broadcaster.period)
            .collect();

        #[cfg(feature = "defmt")]
        defmt::info!("Node {} running", self.node_id());

        loop {
            let next_due = schedule.iter().min().copied();
            let event = {
                let frame = bus.recv();
                let queued = self.outbound.receive();
                let due = async {
                    match next_due {
                        Some(deadline) => self.timer.delay_until(deadline).await,
                        None => core::future::pending().await,
                    }
                };
                pin_mut!(frame);
                pin_mut!(queued);
                pin_mut!(due);

                match select(frame, select(queued, due)).await {
                    Either::Left((result, _)) => Event::Frame(result),
                    Either::Right((Either::Left((frames, _)), _)) => Event::Outbound(frames),
                    Either::Right((Either::Right(((), _)), _)) => Event::BroadcastDue,
                }
            };

            match event {
                Event::Frame(Ok(frame)) => self.handle_frame(&mut *bus, &frame).await?,
                Event::Frame(Err(err)) => return Err(RunError::Receive(err)),
                Event::Outbound(frames) => bus.send_frames(frames).await.map_err(RunError::Send)?,
                Event::BroadcastDue => self.emit_due(&mut *bus, &mut schedule).await?,
            }
        }
    }

    /// Emit every broadcast whose time has come and plan its next occurrence.
    async fn emit_due(
        &self,
        bus: &mut C,
        schedule: &mut [Instant],
    ) -> Result<(), RunError<C::Error>> {
        let now = self.timer.now();
        for (broadcaster, due) in self.broadcasters.iter().zip(schedule.iter_mut()) {
            if *due > now {
                continue;
            }
            *due += broadcaster.period;
            if *due <= now {
                // Fell behind: skip the missed periods.
                *due = now + broadcaster.period;
            }

            let message = broadcaster.producer.produce(now);
            match self.frame_message(&broadcaster.schema, &message) {
                Ok(frames) => bus.send_frames(frames).await.map_err(RunError::Send)?,
                Err(_err) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!(
                        "Broadcast of {} skipped: {}",
                        broadcaster.schema.name,
                        _err
                    );
                }
            }
        }
        Ok(())
    }

    /// Filter, reassemble and dispatch one inbound frame.
    async fn handle_frame(&self, bus: &mut C, frame: &CanFrame) -> Result<(), RunError<C::Error>> {
        let Ok(fields) = frame.id.fields() else {
            return Ok(());
        };
        let own_id = self.node_id();
        if fields.destination.is_some_and(|destination| destination != own_id) {
            return Ok(());
        }
        if fields.kind == TransferKind::Request && fields.source == own_id {
            #[cfg(feature = "defmt")]
            defmt::warn!("Rejected request carrying our own node id {}", own_id);
            return Ok(());
        }

        // Only reassemble what someone is waiting for.
        let signature = match fields.kind {
            TransferKind::Message => self
                .listeners
                .iter()
                .find(|(schema, _)| schema.id == Some(fields.data_type_id))
                .map(|(schema, _)| schema.signature),
            TransferKind::Request => self
                .handlers
                .iter()
                .find(|(schema, _)| schema.id as u16 == fields.data_type_id)
                .map(|(schema, _)| schema.signature),
            TransferKind::Response => self
                .registry
                .service_by_id(fields.data_type_id as u8)
                .map(|schema| schema.signature),
        };
        let Some(signature) = signature else {
            return Ok(());
        };

        let now = self.timer.now();
        let transfer = self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.transfers.cleanup(now);
            state.transfers.receive(frame, signature, now)
        });
        let Some(transfer) = transfer else {
            return Ok(());
        };
        let meta = TransferMeta {
            source: transfer.source,
            transfer_id: transfer.transfer_id,
            priority: transfer.priority,
        };

        match transfer.kind {
            TransferKind::Message => self.dispatch_message(&meta, &transfer),
            TransferKind::Request => return self.dispatch_request(bus, meta, transfer).await,
            TransferKind::Response => self.dispatch_response(&meta, &transfer),
        }
        Ok(())
    }

    fn dispatch_message(&self, meta: &TransferMeta, transfer: &Transfer) {
        let type_id = Some(transfer.data_type_id);
        let Some(schema) = self
            .listeners
            .iter()
            .find(|(schema, _)| schema.id == type_id)
            .map(|(schema, _)| schema)
        else {
            return;
        };
        let message = match decode(schema, &transfer.payload) {
            Ok(message) => message,
            Err(_err) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Undecodable {} from node {}: {}", schema.name, meta.source, _err);
                return;
            }
        };
        self.listeners
            .iter()
            .filter(|(schema, _)| schema.id == type_id)
            .for_each(|(_, listener)| listener.on_message(meta, &message));
    }

    async fn dispatch_request(
        &self,
        bus: &mut C,
        meta: TransferMeta,
        transfer: Transfer,
    ) -> Result<(), RunError<C::Error>> {
        let Some((service, handler)) = self
            .handlers
            .iter()
            .find(|(schema, _)| schema.id as u16 == transfer.data_type_id)
        else {
            return Ok(());
        };
        let request = match decode(&service.request, &transfer.payload) {
            Ok(request) => request,
            Err(_err) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Undecodable {} request from node {}: {}", service.name, meta.source, _err);
                return Ok(());
            }
        };

        let response = match handler.handle(meta, request).await {
            Ok(response) => response,
            Err(_err) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Handler for {} failed, no response sent: {}", service.name, _err);
                return Ok(());
            }
        };

        let frames = encode(&service.response, &response).and_then(|payload| {
            let transfer = Transfer {
                priority: meta.priority,
                kind: TransferKind::Response,
                data_type_id: transfer.data_type_id,
                source: self.node_id(),
                destination: Some(meta.source),
                transfer_id: meta.transfer_id,
                payload,
            };
            self.state
                .lock(|state| state.borrow_mut().transfers.send(transfer, service.signature))
        });
        match frames {
            Ok(frames) => bus.send_frames(frames).await.map_err(RunError::Send),
            Err(_err) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Response to {} not encodable: {}", service.name, _err);
                Ok(())
            }
        }
    }

    fn dispatch_response(&self, meta: &TransferMeta, transfer: &Transfer) {
        let Some(service) = self.registry.service_by_id(transfer.data_type_id as u8) else {
            return;
        };
        let key = PendingKey {
            destination: meta.source,
            service_id: service.id,
            transfer_id: meta.transfer_id,
        };
        let result = decode(&service.response, &transfer.payload).map_err(NodeError::from);
        let matched = self
            .state
            .lock(|state| state.borrow_mut().pending.resolve(&key, result));
        if !matched {
            #[cfg(feature = "defmt")]
            defmt::trace!("Unmatched {} response from node {}", service.name, meta.source);
        }
    }

    //==================================================================================HELPERS
    fn message_schema(&self, name: &'static str) -> Result<Arc<MessageSchema>, NodeError> {
        self.registry
            .message(name)
            .cloned()
            .ok_or(NodeError::UnknownType { name })
    }

    fn service_schema(&self, name: &'static str) -> Result<Arc<ServiceSchema>, NodeError> {
        self.registry
            .service(name)
            .cloned()
            .ok_or(NodeError::UnknownType { name })
    }

    /// Encode a broadcast and frame it with the next transfer id of its stream.
    fn frame_message(
        &self,
        schema: &MessageSchema,
        message: &Record,
    ) -> Result<Vec<CanFrame>, NodeError> {
        let data_type_id = schema.id.ok_or(NodeError::MissingTypeId { name: schema.name })?;
        let transfer = Transfer {
            priority: self.config.priority(),
            kind: TransferKind::Message,
            data_type_id,
            source: self.node_id(),
            destination: None,
            transfer_id: TransferId::default(),
            payload: encode(schema, message)?,
        };
        let frames = self
            .state
            .lock(|state| state.borrow_mut().transfers.send(transfer, schema.signature))?;
        Ok(frames.collect())
    }
}

/// Releases the pending entry of a call that ends without its response,
/// including when the call future is dropped.
struct PendingGuard<'a> {
    state: &'a SharedState,
    key: PendingKey,
    signal: &'a Arc<ResponseSignal>,
}

impl PendingGuard<'_> {
    fn release(&self) -> bool {
        self.state
            .lock(|state| state.borrow_mut().pending.release(&self.key, self.signal))
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
