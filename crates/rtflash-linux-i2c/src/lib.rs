//! rtflash-linux-i2c - Linux i2c-dev support
//!
//! Implements the rtflash-core `SmbusPort` trait over the kernel's
//! `/dev/i2c-N` character devices.
//!
//! # Example
//!
//! ```no_run
//! use rtflash_linux_i2c::LinuxI2c;
//! use rtflash_core::device::{Device, PartKind};
//! use rtflash_core::smbus::{Framing, Smbus};
//!
//! let port = LinuxI2c::open(1, 0x24)?;
//! let bus = Smbus::new(port, Framing::Short, false);
//! let mut device = Device::new(bus, PartKind::X16);
//! device.init()?;
//! println!("running firmware {}", device.fw_version);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with i2c-dev support enabled (`CONFIG_I2C_CHARDEV`)
//! - Read/write access to `/dev/i2c-N`

pub mod device;
pub mod error;

pub use device::LinuxI2c;
pub use error::{LinuxI2cError, Result};
