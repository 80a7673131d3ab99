//! rtflash-core - PCIe retimer EEPROM programming over SMBus
//!
//! This crate drives a retimer ASIC's firmware store through its side-band
//! SMBus channel: a layered transport over the 17-bit register space,
//! indirect access to the on-die microcontrollers and PMA blocks, an Intel
//! HEX / raw binary image loader, and the EEPROM write and verify
//! pipelines with their assisted and legacy paths.
//!
//! Host OS attachment is abstracted behind [`port::SmbusPort`]; see the
//! companion Linux crate for the `/dev/i2c-N` implementation.
//!
//! # Example
//!
//! ```ignore
//! use rtflash_core::{device::{Device, PartKind}, smbus::{Framing, Smbus}, update};
//!
//! fn update_one<P: rtflash_core::port::SmbusPort>(port: P) {
//!     let bus = Smbus::new(port, Framing::Short, false);
//!     let mut device = Device::new(bus, PartKind::X16);
//!     device.init().expect("init failed");
//!     let image = rtflash_core::ihex::load_image("fw.ihx".as_ref()).unwrap();
//!     update::update_firmware(&mut device, &image, &mut update::LogSink).unwrap();
//! }
//! ```

#![warn(rust_2018_idioms)]

pub mod bifurcation;
pub mod device;
pub mod eeprom;
pub mod error;
pub mod ihex;
pub mod image;
pub mod micro;
pub mod pma;
pub mod port;
pub mod regs;
pub mod smbus;
pub mod timing;
pub mod update;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Error, Result};
