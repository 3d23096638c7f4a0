//! Abstraction traits used by the transport layer (CAN bus, clock, frame sender).
pub mod can_bus;
pub mod frame_sender;
pub mod node_timer;
