//! Standard `uavcan.protocol` data types every node is expected to speak.
//!
//! Schemas carry the official DSDL signatures so transfers interoperate with
//! other DroneCAN implementations.
use alloc::sync::Arc;
use alloc::vec;

use crate::core::{label, Field, FieldType, MessageSchema, Record, SchemaRegistry, ServiceSchema};
use crate::error::ProtocolError;

pub const NODE_STATUS: &str = "uavcan.protocol.NodeStatus";
pub const NODE_STATUS_ID: u16 = 341;
const NODE_STATUS_SIGNATURE: u64 = 0x0F08_68D0_C1A7_C6F1;
/// Nodes publish their status at least once per second.
pub const NODE_STATUS_PERIOD_MS: u64 = 1_000;

pub const SOFTWARE_VERSION: &str = "uavcan.protocol.SoftwareVersion";
const SOFTWARE_VERSION_SIGNATURE: u64 = 0xDD46_FD37_6527_FEA1;

pub const HARDWARE_VERSION: &str = "uavcan.protocol.HardwareVersion";
const HARDWARE_VERSION_SIGNATURE: u64 = 0x0AD5_C4C9_33F4_A0C4;

pub const GET_NODE_INFO: &str = "uavcan.protocol.GetNodeInfo";
pub const GET_NODE_INFO_ID: u8 = 1;
const GET_NODE_INFO_SIGNATURE: u64 = 0xEE46_8A81_21C4_6A9E;

/// `NodeStatus.health` labels, by ordinal.
pub const HEALTH_LABELS: &[Option<&str>] =
    &[Some("ok"), Some("warning"), Some("error"), Some("critical")];

/// `NodeStatus.mode` labels; ordinals 4 to 6 are reserved.
pub const MODE_LABELS: &[Option<&str>] = &[
    Some("operational"),
    Some("initialization"),
    Some("maintenance"),
    Some("software_update"),
    None,
    None,
    None,
    Some("offline"),
];

//==================================================================================SCHEMAS
/// `uavcan.protocol.NodeStatus` (341): 7 bytes on the wire.
pub fn node_status() -> Result<MessageSchema, ProtocolError> {
    MessageSchema::builder(NODE_STATUS)
        .id(NODE_STATUS_ID)
        .signature(NODE_STATUS_SIGNATURE)
        .field("uptime_sec", FieldType::uint(32))
        .field("health", FieldType::enumeration(2, HEALTH_LABELS))
        .field("mode", FieldType::enumeration(3, MODE_LABELS))
        .field("sub_mode", FieldType::uint(3))
        .field("vendor_specific_status_code", FieldType::uint(16))
        .build()
}

/// `uavcan.protocol.SoftwareVersion`, nested in GetNodeInfo.
pub fn software_version() -> Result<MessageSchema, ProtocolError> {
    MessageSchema::builder(SOFTWARE_VERSION)
        .signature(SOFTWARE_VERSION_SIGNATURE)
        .field("major", FieldType::uint(8))
        .field("minor", FieldType::uint(8))
        .field("optional_field_flags", FieldType::uint(8))
        .field("vcs_commit", FieldType::uint(32))
        .field("image_crc", FieldType::biguint(64))
        .build()
}

/// `uavcan.protocol.HardwareVersion`, nested in GetNodeInfo.
pub fn hardware_version() -> Result<MessageSchema, ProtocolError> {
    MessageSchema::builder(HARDWARE_VERSION)
        .signature(HARDWARE_VERSION_SIGNATURE)
        .field("major", FieldType::uint(8))
        .field("minor", FieldType::uint(8))
        .field("unique_id", FieldType::byte_array(16))
        .field("certificate_of_authenticity", FieldType::variable_byte_array(255))
        .build()
}

/// `uavcan.protocol.GetNodeInfo` (1): empty request, node description response.
pub fn get_node_info() -> Result<ServiceSchema, ProtocolError> {
    let field = |name, ty| Field { name, ty };
    ServiceSchema::with_signature(
        GET_NODE_INFO,
        GET_NODE_INFO_ID,
        vec![],
        vec![
            field("status", FieldType::Reference(Arc::new(node_status()?))),
            field(
                "software_version",
                FieldType::Reference(Arc::new(software_version()?)),
            ),
            field(
                "hardware_version",
                FieldType::Reference(Arc::new(hardware_version()?)),
            ),
            field("name", FieldType::string(80)),
        ],
        Some(GET_NODE_INFO_SIGNATURE),
    )
}

/// Registry holding NodeStatus and GetNodeInfo.
pub fn standard_registry() -> Result<SchemaRegistry, ProtocolError> {
    Ok(SchemaRegistry::new()
        .with_message(Arc::new(node_status()?))
        .with_service(Arc::new(get_node_info()?)))
}

//==================================================================================RECORDS
/// NodeStatus record with a zero sub-mode and vendor code.
pub fn node_status_record(uptime_sec: u32, health: &'static str, mode: &'static str) -> Record {
    Record::new()
        .with("uptime_sec", uptime_sec)
        .with("health", label(health))
        .with("mode", label(mode))
        .with("sub_mode", 0u32)
        .with("vendor_specific_status_code", 0u32)
}
