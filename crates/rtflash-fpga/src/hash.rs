//! Firmware digest of an installed retimer image
//!
//! Reads the EEPROM contents back through the FPGA bridge and streams them
//! through SHA-384. The staging area is zero-filled first so a partial
//! read cannot masquerade as old image bytes.

use crate::bridge::{FpgaBridge, FpgaBus};
use crate::error::Result;
use rtflash_core::image::{BANK_SIZE, EEPROM_SIZE};
use sha2::{Digest, Sha384};

/// Runtime directory the hash service stages read-back files in
pub const HASH_STAGING_DIR: &str = "/tmp/hash";

/// Name of the digest algorithm, exposed alongside the digest
pub const HASH_ALGORITHM: &str = "SHA384";

/// A firmware digest and the algorithm that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareDigest {
    /// Always [`HASH_ALGORITHM`]
    pub algorithm: &'static str,
    /// Lower-case hex digest
    pub digest: String,
}

/// Read retimer `retimer`'s installed firmware and compute its SHA-384
pub fn read_firmware_hash<B: FpgaBus>(
    bridge: &mut FpgaBridge<B>,
    retimer: u8,
) -> Result<FirmwareDigest> {
    let zero = vec![0u8; EEPROM_SIZE];
    bridge.stage_image(&zero)?;
    bridge.trigger_read(retimer)?;
    let image = bridge.drain_image()?;

    Ok(digest_of(image.as_slice()))
}

/// SHA-384 of an image buffer, streamed in 64 KiB blocks
pub fn digest_of(bytes: &[u8]) -> FirmwareDigest {
    let mut hasher = Sha384::new();
    for chunk in bytes.chunks(BANK_SIZE) {
        hasher.update(chunk);
    }
    let digest = hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    FirmwareDigest {
        algorithm: HASH_ALGORITHM,
        digest,
    }
}
