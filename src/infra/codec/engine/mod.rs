//! Generic serialization/deserialization engine driven by runtime schemas.
//! It walks the declared fields in order, drives the bit-level reader/writer and
//! turns dynamic [`Value`]s into payload bits and back.
//!
//! Variable-length fields carry a length prefix, except the last field of the
//! top-level schema whose length is implied by the payload length. When that
//! last field is a nested compound, the rule applies to the compound's own
//! last field, recursively.
use alloc::string::String;
use alloc::vec::Vec;

use super::bits::{BitReader, BitWriter};
use crate::core::{Field, FieldType, MessageSchema, Record, Value};
use crate::error::ProtocolError;
use crate::protocol::transport::transfer::MAX_TRANSFER_PAYLOAD;

/// Serializes `record` according to `schema`.
///
/// # Return value
/// The payload bytes, the final partial byte padded with zeros.
pub fn encode(schema: &MessageSchema, record: &Record) -> Result<Vec<u8>, ProtocolError> {
    let mut writer = BitWriter::with_capacity(max_encoded_len(schema).min(MAX_TRANSFER_PAYLOAD));
    encode_fields(&mut writer, &schema.fields, record, true)?;
    Ok(writer.into_bytes())
}

/// Deserializes `payload` according to `schema`.
///
/// Bytes left after the last field are ignored.
pub fn decode(schema: &MessageSchema, payload: &[u8]) -> Result<Record, ProtocolError> {
    let mut reader = BitReader::new(payload);
    decode_fields(&mut reader, &schema.fields, true)
}

/// Worst-case payload size of `schema`, in bytes.
pub fn max_encoded_len(schema: &MessageSchema) -> usize {
    max_bits(&schema.fields, true).div_ceil(8)
}

fn max_bits(fields: &[Field], tail: bool) -> usize {
    let last = fields.len().saturating_sub(1);
    fields
        .iter()
        .enumerate()
        .map(|(index, field)| {
            let tail = tail && index == last;
            match &field.ty {
                FieldType::Unsigned { bits }
                | FieldType::WideUnsigned { bits }
                | FieldType::Enumeration { bits, .. } => *bits as usize,
                FieldType::ByteArray { len } => len.saturating_mul(8),
                FieldType::VariableByteArray { max_len } | FieldType::String { max_len } => {
                    let prefix = if tail {
                        0
                    } else {
                        FieldType::length_prefix_bits(*max_len) as usize
                    };
                    max_len.saturating_mul(8).saturating_add(prefix)
                }
                FieldType::Reference(nested) => max_bits(&nested.fields, tail),
            }
        })
        .fold(0, usize::saturating_add)
}

//==================================================================================ENCODE
fn encode_fields(
    writer: &mut BitWriter,
    fields: &[Field],
    record: &Record,
    tail: bool,
) -> Result<(), ProtocolError> {
    let last = fields.len().saturating_sub(1);
    for (index, field) in fields.iter().enumerate() {
        let value = record
            .get(field.name)
            .ok_or(ProtocolError::SchemaMismatch { field: field.name })?;
        write_field(writer, field, value, tail && index == last)?;
    }
    Ok(())
}

/// Write one field; `tail` is set when the field ends the top-level payload.
fn write_field(
    writer: &mut BitWriter,
    field: &Field,
    value: &Value,
    tail: bool,
) -> Result<(), ProtocolError> {
    let name = field.name;
    let out_of_range = ProtocolError::FieldOutOfRange { field: name };
    let mismatch = ProtocolError::SchemaMismatch { field: name };

    match (&field.ty, value) {
        (FieldType::Unsigned { bits }, Value::Unsigned(v)) => {
            let v = *v as u64;
            if *bits < 64 && v >> bits != 0 {
                return Err(out_of_range);
            }
            writer.write_scalar(v, *bits).map_err(|_| out_of_range)
        }
        (FieldType::WideUnsigned { bits }, Value::WideUnsigned(v)) => {
            if *bits < 64 && v >> bits != 0 {
                return Err(out_of_range);
            }
            writer.write_scalar(*v, *bits).map_err(|_| out_of_range)
        }
        (FieldType::Enumeration { bits, labels }, Value::Enum(label)) => {
            let ordinal = labels
                .iter()
                .position(|l| *l == Some(*label))
                .ok_or(ProtocolError::InvalidEnumValue { field: name })?;
            writer
                .write_scalar(ordinal as u64, *bits)
                .map_err(|_| out_of_range)
        }
        (FieldType::ByteArray { len }, Value::Bytes(bytes)) => {
            if bytes.len() != *len {
                return Err(out_of_range);
            }
            writer.write_bytes(bytes).map_err(|_| out_of_range)
        }
        (FieldType::VariableByteArray { max_len }, Value::Bytes(bytes)) => {
            write_variable(writer, bytes, *max_len, tail, name)
        }
        (FieldType::String { max_len }, Value::Str(text)) => {
            write_variable(writer, text.as_bytes(), *max_len, tail, name)
        }
        (FieldType::Reference(nested), Value::Record(inner)) => {
            encode_fields(writer, &nested.fields, inner, tail)
        }
        _ => Err(mismatch),
    }
}

fn write_variable(
    writer: &mut BitWriter,
    bytes: &[u8],
    max_len: usize,
    tail: bool,
    field: &'static str,
) -> Result<(), ProtocolError> {
    let out_of_range = ProtocolError::FieldOutOfRange { field };
    if bytes.len() > max_len {
        return Err(out_of_range);
    }
    if !tail {
        let prefix_bits = FieldType::length_prefix_bits(max_len);
        writer
            .write_scalar(bytes.len() as u64, prefix_bits)
            .map_err(|_| out_of_range.clone())?;
    }
    writer.write_bytes(bytes).map_err(|_| out_of_range)
}

//==================================================================================DECODE
fn decode_fields(
    reader: &mut BitReader,
    fields: &[Field],
    tail: bool,
) -> Result<Record, ProtocolError> {
    let last = fields.len().saturating_sub(1);
    let mut record = Record::new();
    for (index, field) in fields.iter().enumerate() {
        let value = read_field(reader, field, tail && index == last)?;
        record.insert(field.name, value);
    }
    Ok(record)
}

/// Read one field; `tail` is set when the field ends the top-level payload.
fn read_field(reader: &mut BitReader, field: &Field, tail: bool) -> Result<Value, ProtocolError> {
    let name = field.name;
    let mismatch = ProtocolError::SchemaMismatch { field: name };

    match &field.ty {
        FieldType::Unsigned { bits } => reader
            .read_scalar(*bits)
            .map(|v| Value::Unsigned(v as u32))
            .map_err(|_| mismatch),
        FieldType::WideUnsigned { bits } => reader
            .read_scalar(*bits)
            .map(Value::WideUnsigned)
            .map_err(|_| mismatch),
        FieldType::Enumeration { bits, labels } => {
            let ordinal = reader.read_scalar(*bits).map_err(|_| mismatch)? as usize;
            labels
                .get(ordinal)
                .copied()
                .flatten()
                .map(Value::Enum)
                .ok_or(ProtocolError::InvalidEnumValue { field: name })
        }
        FieldType::ByteArray { len } => reader
            .read_bytes(*len)
            .map(Value::Bytes)
            .map_err(|_| mismatch),
        FieldType::VariableByteArray { max_len } => {
            read_variable(reader, *max_len, tail, name).map(Value::Bytes)
        }
        FieldType::String { max_len } => {
            let bytes = read_variable(reader, *max_len, tail, name)?;
            String::from_utf8(bytes).map(Value::Str).map_err(|_| mismatch)
        }
        FieldType::Reference(nested) => {
            decode_fields(reader, &nested.fields, tail).map(Value::Record)
        }
    }
}

fn read_variable(
    reader: &mut BitReader,
    max_len: usize,
    tail: bool,
    field: &'static str,
) -> Result<Vec<u8>, ProtocolError> {
    let mismatch = ProtocolError::SchemaMismatch { field };
    let len = if tail {
        // Whole bytes left in the payload belong to the tail field.
        reader.remaining_bits() / 8
    } else {
        let prefix_bits = FieldType::length_prefix_bits(max_len);
        reader.read_scalar(prefix_bits).map_err(|_| mismatch.clone())? as usize
    };
    if len > max_len {
        return Err(ProtocolError::FieldOutOfRange { field });
    }
    reader.read_bytes(len).map_err(|_| mismatch)
}
