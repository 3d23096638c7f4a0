//! Node configuration: identity, default priority and protocol timeouts.
use embassy_time::Duration;

use crate::error::{NodeError, ProtocolError};
use crate::protocol::transport::can_id::{MAX_NODE_ID, MAX_PRIORITY};
use crate::protocol::transport::{DEFAULT_PRIORITY, REQUEST_TIMEOUT_MS, TRANSFER_TIMEOUT_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Validated settings of one node.
pub struct NodeConfig {
    node_id: u8,
    priority: u8,
    request_timeout: Duration,
    transfer_timeout: Duration,
}

impl NodeConfig {
    /// Creates a `NodeConfigBuilder` with the crate defaults.
    pub fn builder(node_id: u8) -> NodeConfigBuilder {
        NodeConfigBuilder {
            node_id,
            priority: DEFAULT_PRIORITY,
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
            transfer_timeout: Duration::from_millis(TRANSFER_TIMEOUT_MS),
        }
    }

    /// Defaults for `node_id`.
    pub fn new(node_id: u8) -> Result<Self, NodeError> {
        Self::builder(node_id).build()
    }

    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    /// Priority of every transfer this node originates.
    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn transfer_timeout(&self) -> Duration {
        self.transfer_timeout
    }
}

#[derive(Debug)]
pub struct NodeConfigBuilder {
    node_id: u8,
    priority: u8,
    request_timeout: Duration,
    transfer_timeout: Duration,
}

impl NodeConfigBuilder {
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Deadline of a service call.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Reassembly window of an inbound multi-frame transfer.
    pub fn transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    /// Node ids run from 1 to 127; 0 is reserved for anonymous nodes.
    pub fn build(self) -> Result<NodeConfig, NodeError> {
        if !(1..=MAX_NODE_ID).contains(&self.node_id) {
            return Err(NodeError::InvalidNodeId {
                node_id: self.node_id,
            });
        }
        if self.priority > MAX_PRIORITY {
            return Err(NodeError::Protocol(ProtocolError::InvalidIdentifier {
                field: "priority",
                value: self.priority as u32,
            }));
        }
        Ok(NodeConfig {
            node_id: self.node_id,
            priority: self.priority,
            request_timeout: self.request_timeout,
            transfer_timeout: self.transfer_timeout,
        })
    }
}
