//! Defines the data contract between the application (which declares schemas)
//! and the codec engine (which interprets them).
//!
//! Schemas are declared once at startup and are immutable afterwards. Values
//! travel as [`Record`]s: ordered maps from field name to [`Value`].
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt::Write;

use crate::error::ProtocolError;
use crate::infra::crc::SignatureCrc;
use crate::protocol::transport::transfer::MAX_TRANSFER_PAYLOAD;

//==================================================================================FIELD_TYPE
/// Wire type of a schema field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Unsigned integer of 1 to 32 bits.
    Unsigned { bits: u8 },
    /// Unsigned integer of 1 to 64 bits.
    WideUnsigned { bits: u8 },
    /// Ordinal of `bits` bits; `labels[n]` names ordinal `n`, `None` marks a
    /// reserved ordinal.
    Enumeration {
        bits: u8,
        labels: &'static [Option<&'static str>],
    },
    /// Exactly `len` bytes.
    ByteArray { len: usize },
    /// Up to `max_len` bytes behind a length prefix.
    VariableByteArray { max_len: usize },
    /// Up to `max_len` bytes of UTF-8 behind a length prefix.
    String { max_len: usize },
    /// Nested compound encoded with its own schema.
    Reference(Arc<MessageSchema>),
}

impl FieldType {
    pub const fn uint(bits: u8) -> Self {
        Self::Unsigned { bits }
    }

    pub const fn biguint(bits: u8) -> Self {
        Self::WideUnsigned { bits }
    }

    pub const fn enumeration(bits: u8, labels: &'static [Option<&'static str>]) -> Self {
        Self::Enumeration { bits, labels }
    }

    pub const fn byte_array(len: usize) -> Self {
        Self::ByteArray { len }
    }

    pub const fn variable_byte_array(max_len: usize) -> Self {
        Self::VariableByteArray { max_len }
    }

    pub const fn string(max_len: usize) -> Self {
        Self::String { max_len }
    }

    pub fn reference(schema: &Arc<MessageSchema>) -> Self {
        Self::Reference(Arc::clone(schema))
    }

    /// Width of the length prefix of a variable-length field: enough bits to
    /// count from 0 to `max_len` inclusive.
    pub fn length_prefix_bits(max_len: usize) -> u8 {
        (usize::BITS - max_len.leading_zeros()) as u8
    }

    /// Normalized declaration used to derive signatures.
    fn declaration(&self, out: &mut String) {
        // Writing into a String cannot fail.
        let _ = match self {
            Self::Unsigned { bits } | Self::WideUnsigned { bits } => {
                write!(out, "saturated uint{}", bits)
            }
            Self::Enumeration { bits, .. } => write!(out, "saturated uint{}", bits),
            Self::ByteArray { len } => write!(out, "saturated uint8[{}]", len),
            Self::VariableByteArray { max_len } | Self::String { max_len } => {
                write!(out, "saturated uint8[<={}]", max_len)
            }
            Self::Reference(schema) => write!(out, "{}", schema.name),
        };
    }

    fn validate(&self, field: &'static str) -> Result<(), ProtocolError> {
        let valid = match self {
            Self::Unsigned { bits } => (1..=32).contains(bits),
            Self::WideUnsigned { bits } => (1..=64).contains(bits),
            Self::Enumeration { bits, labels } => {
                (1..=8).contains(bits) && labels.len() <= 1usize << bits
            }
            // No field can outgrow the transfer carrying it.
            Self::VariableByteArray { max_len } | Self::String { max_len } => {
                (1..=MAX_TRANSFER_PAYLOAD).contains(max_len)
            }
            Self::ByteArray { len } => *len <= MAX_TRANSFER_PAYLOAD,
            Self::Reference(_) => true,
        };
        if valid {
            Ok(())
        } else {
            Err(ProtocolError::InvalidSchema { field })
        }
    }
}

/// A named field of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
}

//==================================================================================MESSAGE_SCHEMA
/// Ordered field list describing one data type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSchema {
    /// Full data type name, e.g. `uavcan.protocol.NodeStatus`.
    pub name: &'static str,
    /// Fixed numeric data type id, required to put the type on the wire.
    pub id: Option<u16>,
    pub fields: Vec<Field>,
    /// Identity hash seeding transfer CRCs.
    pub signature: u64,
}

impl MessageSchema {
    pub fn builder(name: &'static str) -> MessageSchemaBuilder {
        MessageSchemaBuilder {
            name,
            id: None,
            fields: Vec::new(),
            signature: None,
        }
    }

    fn write_declaration(&self, out: &mut String) {
        for field in &self.fields {
            field.ty.declaration(out);
            out.push(' ');
            out.push_str(field.name);
            out.push('\n');
        }
    }

    fn fold_nested_signatures(&self, crc: &mut SignatureCrc) {
        for field in &self.fields {
            if let FieldType::Reference(nested) = &field.ty {
                crc.extend(nested.signature);
            }
        }
    }
}

/// Fluent builder validating a [`MessageSchema`].
#[derive(Debug)]
pub struct MessageSchemaBuilder {
    name: &'static str,
    id: Option<u16>,
    fields: Vec<Field>,
    signature: Option<u64>,
}

impl MessageSchemaBuilder {
    /// Assign the numeric data type id.
    pub fn id(mut self, id: u16) -> Self {
        self.id = Some(id);
        self
    }

    /// Append a field; declaration order is wire order.
    pub fn field(mut self, name: &'static str, ty: FieldType) -> Self {
        self.fields.push(Field { name, ty });
        self
    }

    /// Use a known signature instead of deriving one from the declaration.
    pub fn signature(mut self, signature: u64) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn build(self) -> Result<MessageSchema, ProtocolError> {
        validate_fields(&self.fields)?;
        let mut schema = MessageSchema {
            name: self.name,
            id: self.id,
            fields: self.fields,
            signature: 0,
        };
        schema.signature = match self.signature {
            Some(signature) => signature,
            None => {
                let mut text = String::from(schema.name);
                text.push('\n');
                schema.write_declaration(&mut text);
                let mut crc = SignatureCrc::default();
                crc.add_bytes(text.as_bytes());
                schema.fold_nested_signatures(&mut crc);
                crc.get()
            }
        };
        Ok(schema)
    }
}

fn validate_fields(fields: &[Field]) -> Result<(), ProtocolError> {
    for (index, field) in fields.iter().enumerate() {
        field.ty.validate(field.name)?;
        if fields[..index].iter().any(|f| f.name == field.name) {
            return Err(ProtocolError::InvalidSchema { field: field.name });
        }
    }
    Ok(())
}

//==================================================================================SERVICE_SCHEMA
/// Request/response pair sharing one service id and one signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSchema {
    pub name: &'static str,
    pub id: u8,
    pub request: MessageSchema,
    pub response: MessageSchema,
    pub signature: u64,
}

impl ServiceSchema {
    /// Declare a service from its request and response field lists.
    ///
    /// The request and response schemas take the service name and signature.
    pub fn new(
        name: &'static str,
        id: u8,
        request: Vec<Field>,
        response: Vec<Field>,
    ) -> Result<Self, ProtocolError> {
        Self::with_signature(name, id, request, response, None)
    }

    /// Same as [`ServiceSchema::new`] with a known signature.
    pub fn with_signature(
        name: &'static str,
        id: u8,
        request: Vec<Field>,
        response: Vec<Field>,
        signature: Option<u64>,
    ) -> Result<Self, ProtocolError> {
        validate_fields(&request)?;
        validate_fields(&response)?;
        let request = MessageSchema {
            name,
            id: Some(id as u16),
            fields: request,
            signature: 0,
        };
        let response = MessageSchema {
            name,
            id: Some(id as u16),
            fields: response,
            signature: 0,
        };
        let signature = signature.unwrap_or_else(|| {
            let mut text = String::from(name);
            text.push('\n');
            request.write_declaration(&mut text);
            text.push_str("---\n");
            response.write_declaration(&mut text);
            let mut crc = SignatureCrc::default();
            crc.add_bytes(text.as_bytes());
            request.fold_nested_signatures(&mut crc);
            response.fold_nested_signatures(&mut crc);
            crc.get()
        });
        Ok(Self {
            name,
            id,
            request: MessageSchema {
                signature,
                ..request
            },
            response: MessageSchema {
                signature,
                ..response
            },
            signature,
        })
    }
}

//==================================================================================REGISTRY
/// Immutable set of data types known to a node.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    messages: Vec<Arc<MessageSchema>>,
    services: Vec<Arc<ServiceSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, schema: Arc<MessageSchema>) -> Self {
        self.messages.push(schema);
        self
    }

    pub fn with_service(mut self, schema: Arc<ServiceSchema>) -> Self {
        self.services.push(schema);
        self
    }

    pub fn message(&self, name: &str) -> Option<&Arc<MessageSchema>> {
        self.messages.iter().find(|s| s.name == name)
    }

    pub fn message_by_id(&self, id: u16) -> Option<&Arc<MessageSchema>> {
        self.messages.iter().find(|s| s.id == Some(id))
    }

    pub fn service(&self, name: &str) -> Option<&Arc<ServiceSchema>> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn service_by_id(&self, id: u8) -> Option<&Arc<ServiceSchema>> {
        self.services.iter().find(|s| s.id == id)
    }
}

//==================================================================================VALUES
/// A field value, matching one [`FieldType`] variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Unsigned(u32),
    WideUnsigned(u64),
    Enum(&'static str),
    Bytes(Vec<u8>),
    Str(String),
    Record(Record),
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Unsigned(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::WideUnsigned(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(String::from(value))
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Value::Record(value)
    }
}

/// Field values of one data type instance, keyed by field name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record(BTreeMap<&'static str, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &'static str, value: impl Into<Value>) -> Self {
        self.0.insert(name, value.into());
        self
    }

    pub fn insert(&mut self, name: &'static str, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name, value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn unsigned(&self, name: &str) -> Option<u32> {
        match self.get(name)? {
            Value::Unsigned(v) => Some(*v),
            _ => None,
        }
    }

    pub fn wide_unsigned(&self, name: &str) -> Option<u64> {
        match self.get(name)? {
            Value::WideUnsigned(v) => Some(*v),
            _ => None,
        }
    }

    pub fn label(&self, name: &str) -> Option<&'static str> {
        match self.get(name)? {
            Value::Enum(label) => Some(*label),
            _ => None,
        }
    }

    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        match self.get(name)? {
            Value::Bytes(bytes) => Some(bytes.as_slice()),
            _ => None,
        }
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn record(&self, name: &str) -> Option<&Record> {
        match self.get(name)? {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Enum values are accepted as bare labels.
pub fn label(label: &'static str) -> Value {
    Value::Enum(label)
}
