//! Checksums used on the wire: CRC16-CCITT protects multi-frame transfers,
//! CRC-64-WE derives data-type signatures from schema declarations.

//==================================================================================TRANSFER_CRC
/// Running CRC16-CCITT (polynomial 0x1021, initial value 0xFFFF, no reflection).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferCrc(u16);

impl Default for TransferCrc {
    fn default() -> Self {
        Self(Self::INIT_VALUE)
    }
}

impl TransferCrc {
    /// Number of bytes the CRC occupies at the head of a multi-frame payload.
    pub const LENGTH: usize = 2;
    const INIT_VALUE: u16 = 0xFFFF;
    const POLYNOMIAL: u16 = 0x1021;

    /// Start a CRC seeded with the data-type signature (little-endian bytes).
    pub fn with_signature(signature: u64) -> Self {
        let mut crc = Self::default();
        crc.add_bytes(&signature.to_le_bytes());
        crc
    }

    pub fn add(&mut self, byte: u8) {
        self.0 ^= u16::from(byte) << 8;
        for _bit in 0..8 {
            if (self.0 & 0x8000) != 0 {
                self.0 = (self.0 << 1) ^ Self::POLYNOMIAL;
            } else {
                self.0 <<= 1;
            }
        }
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        bytes.iter().for_each(|&byte| self.add(byte));
    }

    pub fn get(&self) -> u16 {
        self.0
    }
}

/// CRC of a transfer payload as carried by its first frame.
pub fn transfer_crc(signature: u64, payload: &[u8]) -> u16 {
    let mut crc = TransferCrc::with_signature(signature);
    crc.add_bytes(payload);
    crc.get()
}

//==================================================================================SIGNATURE_CRC
/// CRC-64-WE (polynomial 0x42F0E1EBA9EA3693, init and xor-out all ones).
#[derive(Debug, Clone, Copy)]
pub struct SignatureCrc(u64);

impl Default for SignatureCrc {
    fn default() -> Self {
        Self(Self::MASK)
    }
}

impl SignatureCrc {
    const MASK: u64 = 0xFFFF_FFFF_FFFF_FFFF;
    const POLYNOMIAL: u64 = 0x42F0_E1EB_A9EA_3693;

    pub fn add(&mut self, byte: u8) {
        self.0 ^= u64::from(byte) << 56;
        for _bit in 0..8 {
            if (self.0 & (1 << 63)) != 0 {
                self.0 = (self.0 << 1) ^ Self::POLYNOMIAL;
            } else {
                self.0 <<= 1;
            }
        }
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        bytes.iter().for_each(|&byte| self.add(byte));
    }

    /// Fold a nested signature in, as done for compound fields.
    pub fn extend(&mut self, signature: u64) {
        self.add_bytes(&signature.to_le_bytes());
    }

    pub fn get(&self) -> u64 {
        self.0 ^ Self::MASK
    }
}
