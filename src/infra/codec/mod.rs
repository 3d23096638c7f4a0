//! Schema-driven codec: bit-level reader/writer and the encode/decode engine.
pub mod bits;
pub mod engine;
