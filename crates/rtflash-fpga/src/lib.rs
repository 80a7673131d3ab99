//! rtflash-fpga - FPGA-mediated EEPROM programming
//!
//! On multi-retimer mainboards a satellite FPGA accepts the firmware
//! image over a dual-ported RAM and sequences the EEPROM writes to one or
//! all retimers in parallel, reporting per-retimer NACK and checksum
//! status. This crate stages images, drives the trigger registers and
//! demultiplexes the status words; it also reads installed firmware back
//! for SHA-384 attestation.
//!
//! # Example
//!
//! ```no_run
//! use rtflash_fpga::{bridge::FpgaBridge, linux::{LinuxFpgaBus, FPGA_SLAVE}, readiness};
//!
//! readiness::check_fpga_ready(12)?;
//! let bus = LinuxFpgaBus::open(12, FPGA_SLAVE)?;
//! let mut bridge = FpgaBridge::new(bus);
//! let image = std::fs::read("retimer_fw.bin")?;
//! bridge.stage_image(&image)?;
//! bridge.trigger_update(0xFF)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(rust_2018_idioms)]

pub mod bridge;
pub mod error;
pub mod hash;
pub mod linux;
pub mod readiness;
pub mod version;

#[cfg(test)]
pub(crate) mod testutil;

pub use bridge::{FpgaBridge, FpgaBus, UpdateStatus, ALL_RETIMERS};
pub use error::{FpgaError, Result};
