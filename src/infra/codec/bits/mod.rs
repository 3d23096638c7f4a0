//! Low-level components dedicated to bit manipulation for DroneCAN payloads.
//! Fields are packed back to back without alignment, most significant bit of
//! each byte first. Scalars wider than a byte are laid out little-endian: full
//! bytes first, then the remaining high-order bits.
use crate::error::{BitReaderError, BitWriterError};
use alloc::vec::Vec;

/// Reader extracting bit segments from a `&[u8]` without copies.
pub struct BitReader<'a> {
    /// Shared source buffer (typically a reassembled transfer payload).
    buffer: &'a [u8],
    /// Current index expressed as number of bits read from the beginning.
    bit_cursor: usize,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the start of the provided buffer.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            bit_cursor: 0,
        }
    }

    /// Number of bits left between the cursor and the end of the buffer.
    pub fn remaining_bits(&self) -> usize {
        self.buffer.len() * 8 - self.bit_cursor
    }

    /// Read up to 8 bits, most significant bit first.
    pub fn read_bits(&mut self, num_bits: u8) -> Result<u8, BitReaderError> {
        if !(1..=8).contains(&num_bits) {
            return Err(BitReaderError::TooLongForType {
                max: 8,
                asked: num_bits,
            });
        }
        if num_bits as usize > self.remaining_bits() {
            return Err(BitReaderError::OutOfBounds {
                asked: num_bits as usize,
                available: self.remaining_bits(),
            });
        }

        let mut result: u8 = 0;
        let mut bits_read: u8 = 0;

        while bits_read < num_bits {
            let current_byte_index = self.bit_cursor / 8;
            let current_bit_offset = self.bit_cursor % 8;

            // Number of bits available within the current byte.
            let bits_this_iteration = (8 - current_bit_offset).min((num_bits - bits_read) as usize);

            // Bits are taken from the top of the byte downwards.
            let shift = 8 - current_bit_offset - bits_this_iteration;
            let mask = ((1u16 << bits_this_iteration) - 1) as u8;
            let chunk = (self.buffer[current_byte_index] >> shift) & mask;

            result = ((result as u16) << bits_this_iteration) as u8 | chunk;

            bits_read += bits_this_iteration as u8;
            self.bit_cursor += bits_this_iteration;
        }
        Ok(result)
    }

    /// Read an unsigned scalar of `num_bits` bits (1 to 64).
    pub fn read_scalar(&mut self, num_bits: u8) -> Result<u64, BitReaderError> {
        if !(1..=64).contains(&num_bits) {
            return Err(BitReaderError::TooLongForType {
                max: 64,
                asked: num_bits,
            });
        }
        if num_bits as usize > self.remaining_bits() {
            return Err(BitReaderError::OutOfBounds {
                asked: num_bits as usize,
                available: self.remaining_bits(),
            });
        }

        let mut result: u64 = 0;
        let mut remaining = num_bits;
        let mut shift = 0;
        while remaining > 0 {
            let chunk = remaining.min(8);
            result |= (self.read_bits(chunk)? as u64) << shift;
            shift += 8;
            remaining -= chunk;
        }
        Ok(result)
    }

    /// Read `len` bytes; the cursor does not need to be byte aligned.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, BitReaderError> {
        if len > self.remaining_bits() / 8 {
            return Err(BitReaderError::OutOfBounds {
                asked: len.saturating_mul(8),
                available: self.remaining_bits(),
            });
        }
        if self.bit_cursor % 8 == 0 {
            let start = self.bit_cursor / 8;
            self.bit_cursor += len * 8;
            return Ok(self.buffer[start..start + len].to_vec());
        }
        (0..len).map(|_| self.read_bits(8)).collect()
    }
}
//==================================================================================BITWRITER

/// Writer laying bit segments into a growable buffer without assuming byte
/// alignment. Used by the codec engine to build payloads field by field.
#[derive(Debug, Default)]
pub struct BitWriter {
    buffer: Vec<u8>,
    /// Current position expressed in bits written.
    bit_cursor: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size the buffer for a payload of up to `bytes` bytes.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(bytes),
            bit_cursor: 0,
        }
    }

    /// Expose the cursor position in bits.
    pub fn bit_cursor(&self) -> usize {
        self.bit_cursor
    }

    /// Write the `num_bits` low-order bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u8, num_bits: u8) -> Result<(), BitWriterError> {
        if !(1..=8).contains(&num_bits) {
            return Err(BitWriterError::TooLongForType {
                max: 8,
                asked: num_bits,
            });
        }

        let mut bits_left = num_bits as usize;
        while bits_left > 0 {
            let current_byte_index = self.bit_cursor / 8;
            let current_bit_offset = self.bit_cursor % 8;
            if current_byte_index == self.buffer.len() {
                self.buffer.push(0);
            }

            // Number of bits still free in the current byte.
            let bits_this_iteration = (8 - current_bit_offset).min(bits_left);
            let mask = ((1u16 << bits_this_iteration) - 1) as u8;
            let chunk = (value >> (bits_left - bits_this_iteration)) & mask;
            let shift = 8 - current_bit_offset - bits_this_iteration;

            self.buffer[current_byte_index] &= !(mask << shift);
            self.buffer[current_byte_index] |= chunk << shift;

            bits_left -= bits_this_iteration;
            self.bit_cursor += bits_this_iteration;
        }

        Ok(())
    }

    /// Write an unsigned scalar of `num_bits` bits (1 to 64).
    pub fn write_scalar(&mut self, value: u64, num_bits: u8) -> Result<(), BitWriterError> {
        if !(1..=64).contains(&num_bits) {
            return Err(BitWriterError::TooLongForType {
                max: 64,
                asked: num_bits,
            });
        }

        let mut remaining = num_bits;
        let mut value = value;
        while remaining > 0 {
            let chunk = remaining.min(8);
            self.write_bits(value as u8 & (((1u16 << chunk) - 1) as u8), chunk)?;
            value >>= 8;
            remaining -= chunk;
        }
        Ok(())
    }

    /// Copy a byte slice at the current (possibly unaligned) position.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), BitWriterError> {
        if self.bit_cursor % 8 == 0 {
            self.buffer.extend_from_slice(bytes);
            self.bit_cursor += bytes.len() * 8;
            return Ok(());
        }
        bytes.iter().try_for_each(|&byte| self.write_bits(byte, 8))
    }

    /// Consume the writer and return the payload, padded to whole bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}
