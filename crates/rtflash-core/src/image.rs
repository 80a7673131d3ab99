//! EEPROM image model
//!
//! A firmware image is a fixed 256 KiB byte sequence: four 64 KiB banks,
//! each sharing an address page byte on the EEPROM bus. The valid portion
//! is demarcated by an 11-byte terminator pattern; content is a chain of
//! typed blocks, each carrying a trailing CRC byte.

use crate::error::{Error, Result};

/// Total EEPROM size in bytes
pub const EEPROM_SIZE: usize = 262_144;
/// One bank: the portion addressable without changing the page byte
pub const BANK_SIZE: usize = 65_536;
/// Number of banks
pub const NUM_BANKS: usize = 4;
/// Stride of the writer's outer loop
pub const PAGE_SIZE: usize = 256;
/// Bytes moved by one SMBus burst
pub const BURST_SIZE: usize = 16;

/// Pattern marking the end of the valid image
pub const TERMINATOR: [u8; 11] = [
    0xA5, 0x5A, 0xA5, 0x5A, 0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF,
];

/// Signature opening every block header
pub const BLOCK_SIGNATURE: [u8; 4] = [0xA5, 0x5A, 0xA5, 0x5A];
/// Block header: signature, type byte, 16-bit length, six reserved bytes
pub const BLOCK_HEADER_LEN: usize = 13;
/// Block type marking end-of-image
pub const BLOCK_TYPE_END: u8 = 0xFF;
/// Upper bound on blocks walked during a CRC audit
pub const MAX_CRC_BLOCKS: usize = 16;
/// The first block signature must appear within this many bytes of offset 0
pub const FIRST_BLOCK_SCAN_LIMIT: usize = 50;

/// Write extent derived from the terminator position
///
/// `end` is rounded up to a 16-byte boundary so every burst is full-width;
/// the final partial page, when one exists, is precomputed so the write loop
/// can emit exactly the residual bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteExtent {
    /// One past the last byte to program
    pub end: usize,
    /// Start address of the final partial page, if `end` is not page-aligned
    pub last_page_addr: Option<usize>,
    /// Bytes to program in the final partial page
    pub last_page_len: usize,
}

/// A sparse image difference: one byte to reprogram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaEntry {
    /// EEPROM address of the differing byte
    pub address: u32,
    /// Byte value from the new image
    pub data: u8,
}

/// An owned, fixed-size EEPROM image
#[derive(Debug)]
pub struct EepromImage {
    data: Box<[u8; EEPROM_SIZE]>,
}

impl Default for EepromImage {
    fn default() -> Self {
        Self::new()
    }
}

impl EepromImage {
    /// A blank image, filled with the erased value 0xFF
    pub fn new() -> Self {
        let data = vec![0xFF; EEPROM_SIZE]
            .into_boxed_slice()
            .try_into()
            .expect("length is EEPROM_SIZE");
        Self { data }
    }

    /// Build an image from exactly `EEPROM_SIZE` bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < EEPROM_SIZE {
            return Err(Error::BinaryReadUnderflow { got: bytes.len() });
        }
        let mut image = Self::new();
        image.data.copy_from_slice(&bytes[..EEPROM_SIZE]);
        Ok(image)
    }

    /// Image contents
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..]
    }

    /// Mutable image contents
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[..]
    }

    /// Locate the terminator; returns the index one past its final byte
    pub fn end_offset(&self) -> Option<usize> {
        find_terminator(&self.data[..])
    }

    /// Compute the write extent per the terminator position
    pub fn write_extent(&self) -> WriteExtent {
        let end = match self.end_offset() {
            None => EEPROM_SIZE,
            Some(loc) => round_up(loc, BURST_SIZE),
        };
        let residual = end % PAGE_SIZE;
        let (last_page_addr, last_page_len) = if end < EEPROM_SIZE && residual != 0 {
            (Some(end - residual), residual)
        } else {
            (None, 0)
        };
        WriteExtent {
            end,
            last_page_addr,
            last_page_len,
        }
    }

    /// Sum of bytes (mod 2^32) over one bank, truncated at `limit` bytes
    /// into the bank
    pub fn bank_checksum(&self, bank: usize, limit: usize) -> u32 {
        let start = bank * BANK_SIZE;
        self.data[start..start + limit.min(BANK_SIZE)]
            .iter()
            .fold(0u32, |sum, &b| sum.wrapping_add(b as u32))
    }

    /// Expected per-bank checksums for the verified extent. Banks past the
    /// terminator bank are not checked by the device and stay zero.
    pub fn bank_checksums(&self, extent: &WriteExtent) -> [u32; NUM_BANKS] {
        let end_bank = extent.end / BANK_SIZE;
        let mut sums = [0u32; NUM_BANKS];
        for (bank, sum) in sums.iter_mut().enumerate() {
            if bank < end_bank {
                *sum = self.bank_checksum(bank, BANK_SIZE);
            } else if bank == end_bank && bank < NUM_BANKS {
                *sum = self.bank_checksum(bank, extent.end - bank * BANK_SIZE);
            }
        }
        sums
    }

    /// Offset of the first block signature, searched within the first
    /// `FIRST_BLOCK_SCAN_LIMIT` bytes
    pub fn first_block_offset(&self) -> Option<usize> {
        let window = &self.data[..FIRST_BLOCK_SCAN_LIMIT + BLOCK_SIGNATURE.len()];
        window
            .windows(BLOCK_SIGNATURE.len())
            .take(FIRST_BLOCK_SCAN_LIMIT)
            .position(|w| w == BLOCK_SIGNATURE)
    }

    /// Walk the block chain and collect each block's trailing CRC byte.
    ///
    /// A block whose declared length plus overhead escapes the image makes
    /// the chain unaccountable and fails the audit as a count mismatch.
    pub fn collect_block_crcs(&self) -> Result<Vec<u8>> {
        let mut start = self.first_block_offset().ok_or(Error::EepromCrcBlockNum)?;
        let mut crcs = Vec::new();
        while crcs.len() < MAX_CRC_BLOCKS {
            let block_type = self.data[start + 4];
            if block_type == BLOCK_TYPE_END {
                break;
            }
            let len = u16::from_le_bytes([self.data[start + 5], self.data[start + 6]]) as usize;
            let crc_at = start + BLOCK_HEADER_LEN + len;
            if crc_at >= EEPROM_SIZE {
                return Err(Error::EepromCrcBlockNum);
            }
            crcs.push(self.data[crc_at]);
            start = crc_at + 1;
            if start + BLOCK_HEADER_LEN > EEPROM_SIZE {
                break;
            }
        }
        Ok(crcs)
    }

    /// Compute the sparse difference from `current` to `self`.
    ///
    /// Usable only when at most a quarter of the image differs; larger
    /// deltas are redirected to the full-image path.
    pub fn delta_from(&self, current: &EepromImage) -> Result<Vec<DeltaEntry>> {
        let mut differences = Vec::new();
        for (addr, (old, new)) in current.data.iter().zip(self.data.iter()).enumerate() {
            if old != new {
                differences.push(DeltaEntry {
                    address: addr as u32,
                    data: *new,
                });
            }
        }
        if differences.len() > EEPROM_SIZE / 4 {
            log::info!(
                "image difference too large for delta programming ({} bytes)",
                differences.len()
            );
            return Err(Error::EepromWrite);
        }
        Ok(differences)
    }
}

/// Round `n` up to the next multiple of `to`
pub fn round_up(n: usize, to: usize) -> usize {
    n.div_ceil(to) * to
}

fn find_terminator(data: &[u8]) -> Option<usize> {
    data.windows(TERMINATOR.len())
        .position(|w| w == TERMINATOR)
        .map(|at| at + TERMINATOR.len())
}
