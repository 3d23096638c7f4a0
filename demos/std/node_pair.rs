//! # Node Pair Example
//!
//! Two DroneCAN nodes sharing an in-memory bus:
//! - Node 99 publishes `NodeStatus` every second and serves `GetNodeInfo`
//! - Node 10 listens to the status and queries node 99 once
//!
//! ```bash
//! cargo run --example node_pair
//! ```

use dronecan_node::core::Record;
use dronecan_node::error::HandlerError;
use dronecan_node::protocol::messages::{self, GET_NODE_INFO, NODE_STATUS};
use dronecan_node::protocol::node::{config::NodeConfig, handlers::TransferMeta, NodeEngine};
use dronecan_node::protocol::transport::can_frame::CanFrame;
use dronecan_node::protocol::transport::traits::{can_bus::CanBus, node_timer::NodeTimer};
use embassy_time::{Duration, Instant};
use std::future::Future;
use tokio::sync::mpsc;
use tokio::time;

/// One end of a point-to-point in-memory bus.
struct LoopbackBus {
    tx: mpsc::UnboundedSender<CanFrame>,
    rx: mpsc::UnboundedReceiver<CanFrame>,
}

impl LoopbackBus {
    fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Self { tx: a_tx, rx: a_rx },
            Self { tx: b_tx, rx: b_rx },
        )
    }
}

impl CanBus for LoopbackBus {
    type Error = ();

    async fn send<'a>(&'a mut self, frame: &'a CanFrame) -> Result<(), Self::Error> {
        println!("   [bus] {:08X} {:02X?}", frame.id.0, frame.bytes());
        self.tx.send(frame.clone()).map_err(|_| ())
    }

    async fn recv(&mut self) -> Result<CanFrame, Self::Error> {
        self.rx.recv().await.ok_or(())
    }
}

/// Clock counted from program start.
#[derive(Clone, Copy)]
struct TokioTimer {
    origin: time::Instant,
}

impl NodeTimer for TokioTimer {
    fn now(&self) -> Instant {
        Instant::from_micros(self.origin.elapsed().as_micros() as u64)
    }

    fn delay_until<'a>(&'a self, deadline: Instant) -> impl Future<Output = ()> + 'a {
        time::sleep_until(self.origin + time::Duration::from_micros(deadline.as_micros()))
    }
}

fn node_info(start: Instant, now: Instant) -> Record {
    Record::new()
        .with(
            "status",
            messages::node_status_record((now - start).as_secs() as u32, "ok", "operational"),
        )
        .with(
            "software_version",
            Record::new()
                .with("major", 1u32)
                .with("minor", 0u32)
                .with("optional_field_flags", 0u32)
                .with("vcs_commit", 0u32)
                .with("image_crc", 0u64),
        )
        .with(
            "hardware_version",
            Record::new()
                .with("major", 1u32)
                .with("minor", 0u32)
                .with("unique_id", vec![0u8; 16])
                .with("certificate_of_authenticity", Vec::new()),
        )
        .with("name", "")
}

#[tokio::main]
async fn main() {
    println!("=== dronecan-node: node pair ===\n");

    let timer = TokioTimer {
        origin: time::Instant::now(),
    };
    let start = timer.now();
    let registry = messages::standard_registry().expect("standard schemas");
    let (bus_server, bus_client) = LoopbackBus::pair();

    // ======================================================================
    // 1. Node 99: status heartbeat and GetNodeInfo server
    // ======================================================================
    let config = NodeConfig::new(99).expect("valid node id");
    let mut server = NodeEngine::new(bus_server, timer, config, registry.clone());
    server.add_broadcaster(
        NODE_STATUS,
        Duration::from_millis(messages::NODE_STATUS_PERIOD_MS),
        move |now: Instant| {
            messages::node_status_record((now - start).as_secs() as u32, "ok", "operational")
        },
    )
    .expect("NodeStatus has a type id");
    server.on_request(GET_NODE_INFO, move |meta: TransferMeta, _request: Record| {
        println!("   [99] GetNodeInfo request from node {}", meta.source);
        let response = node_info(start, timer.now());
        async move { Ok::<_, HandlerError>(response) }
    })
    .expect("single GetNodeInfo handler");

    // ======================================================================
    // 2. Node 10: status listener and GetNodeInfo client
    // ======================================================================
    let config = NodeConfig::new(10).expect("valid node id");
    let mut client = NodeEngine::new(bus_client, timer, config, registry);
    client.on_message(NODE_STATUS, |meta: &TransferMeta, status: &Record| {
        println!(
            "   [10] NodeStatus from {}: uptime {} s, health {:?}, mode {:?}",
            meta.source,
            status.unsigned("uptime_sec").unwrap_or_default(),
            status.label("health"),
            status.label("mode"),
        );
    })
    .expect("NodeStatus is registered");

    let scenario = async {
        time::sleep(time::Duration::from_millis(1_500)).await;
        println!("\n   [10] Calling GetNodeInfo on node 99");
        match client.call(99, GET_NODE_INFO, &Record::new()).await {
            Ok(info) => {
                let software = info.record("software_version");
                println!(
                    "   [10] Node 99 runs software {}.{}\n",
                    software.and_then(|s| s.unsigned("major")).unwrap_or_default(),
                    software.and_then(|s| s.unsigned("minor")).unwrap_or_default(),
                );
            }
            Err(err) => eprintln!("   [10] GetNodeInfo failed: {err}\n"),
        }
        time::sleep(time::Duration::from_millis(1_200)).await;
    };

    tokio::select! {
        result = server.run() => eprintln!("Node 99 stopped: {:?}", result.err()),
        result = client.run() => eprintln!("Node 10 stopped: {:?}", result.err()),
        _ = scenario => println!("Node pair complete."),
    }
}
