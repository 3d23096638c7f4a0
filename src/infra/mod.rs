//! Infrastructure shared by the protocol layers: checksums and the
//! schema-driven bit-level codec.
pub mod codec;
pub mod crc;
