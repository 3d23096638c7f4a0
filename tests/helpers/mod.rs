/// Test doubles to simulate the CAN bus and clock during integration tests.
use dronecan_node::{
    core::SchemaRegistry,
    protocol::{
        messages,
        node::{config::NodeConfig, NodeEngine},
        transport::{
            can_frame::CanFrame,
            traits::{can_bus::CanBus, node_timer::NodeTimer},
            transfer::{builder::TransferBuilder, Transfer},
        },
    },
};
use embassy_time::Instant;
use futures_util::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{self, Duration};

#[derive(Clone)]
#[allow(dead_code)]
/// In-memory CAN bus reproducing the `CanBus` trait behavior.
pub struct MockCanBus {
    tx: mpsc::UnboundedSender<CanFrame>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<CanFrame>>>,
}

#[allow(dead_code)]
impl MockCanBus {
    /// Construct a pair of interconnected buses (DUT ↔ host).
    pub fn create_pair() -> (Self, Self) {
        let (dut_tx, host_rx) = mpsc::unbounded_channel();
        let (host_tx, dut_rx) = mpsc::unbounded_channel();

        let dut_bus = Self {
            tx: dut_tx,
            rx: Arc::new(Mutex::new(dut_rx)),
        };

        let host_bus = Self {
            tx: host_tx,
            rx: Arc::new(Mutex::new(host_rx)),
        };

        (dut_bus, host_bus)
    }

    /// Inject every frame of `frames` as if another node sent them.
    pub fn inject(&self, frames: impl IntoIterator<Item = CanFrame>) {
        for frame in frames {
            self.tx.send(frame).ok();
        }
    }

    /// Next frame written by the peer, or `None` once `wait` has elapsed.
    pub async fn next_frame(&self, wait: Duration) -> Option<CanFrame> {
        let mut rx = self.rx.lock().await;
        time::timeout(wait, rx.recv()).await.ok().flatten()
    }

    /// Frames already written by the peer.
    pub async fn drain(&self) -> Vec<CanFrame> {
        let mut rx = self.rx.lock().await;
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

impl CanBus for MockCanBus {
    type Error = ();

    async fn send<'a>(&'a mut self, frame: &'a CanFrame) -> Result<(), Self::Error> {
        self.tx.send(frame.clone()).map_err(|_| ())?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<CanFrame, Self::Error> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(())
    }
}

#[derive(Clone, Copy)]
#[allow(dead_code)]
/// Clock over tokio time, so `start_paused` tests advance it instantly.
pub struct MockTimer {
    origin: time::Instant,
}

#[allow(dead_code)]
impl MockTimer {
    pub fn new() -> Self {
        Self {
            origin: time::Instant::now(),
        }
    }
}

impl NodeTimer for MockTimer {
    fn now(&self) -> Instant {
        Instant::from_micros(self.origin.elapsed().as_micros() as u64)
    }

    fn delay_until<'a>(&'a self, deadline: Instant) -> impl Future<Output = ()> + 'a {
        time::sleep_until(self.origin + Duration::from_micros(deadline.as_micros()))
    }
}

#[allow(dead_code)]
/// Node with the standard registry on one end of a fresh bus pair.
pub fn standard_node(node_id: u8) -> (NodeEngine<MockCanBus, MockTimer>, MockCanBus) {
    node_with(NodeConfig::new(node_id).unwrap(), messages::standard_registry().unwrap())
}

#[allow(dead_code)]
pub fn node_with(
    config: NodeConfig,
    registry: SchemaRegistry,
) -> (NodeEngine<MockCanBus, MockTimer>, MockCanBus) {
    let (dut_bus, host_bus) = MockCanBus::create_pair();
    (NodeEngine::new(dut_bus, MockTimer::new(), config, registry), host_bus)
}

#[allow(dead_code)]
/// Frames of one transfer, as a remote node would emit them.
pub fn frames_of(transfer: Transfer, signature: u64) -> Vec<CanFrame> {
    TransferBuilder::new(transfer, signature).unwrap().build().collect()
}
