//! EEPROM programming and verification
//!
//! The write pipeline quiesces the device, initializes the on-chip I2C
//! master and streams the image in 16-byte bursts, either through the main
//! micro's assist mailbox or byte-by-byte through the master CSRs. The
//! verify pipeline prefers per-bank checksums computed on-die, falling back
//! to a byte sweep with in-line rewrite recovery, with an optional
//! block-CRC audit as a cross-check.

pub mod master;
mod verify;
mod write;

pub use verify::{audit_block_crcs, verify_bytes, verify_checksum};
pub use write::{
    calc_checksum, read_block, read_byte, write_byte, write_delta, write_image, WriteMode,
};
