//! CLI argument parsing

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rtflash")]
#[command(author, version, about = "PCIe retimer firmware programmer", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// How to reach one retimer over the side-band bus
#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// I2C bus number (/dev/i2c-N)
    #[arg(short, long)]
    pub bus: u32,

    /// 7-bit retimer slave address
    #[arg(short, long, default_value = "0x24", value_parser = parse_u8)]
    pub addr: u8,

    /// Use the long (Intel) transaction framing
    #[arg(long)]
    pub intel: bool,

    /// Append a Packet Error Check byte to every write
    #[arg(long)]
    pub pec: bool,

    /// 8-lane part instead of 16-lane
    #[arg(long)]
    pub x8: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe a retimer and print its identity and firmware state
    Probe {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Program a firmware image (Intel HEX or raw binary) into the EEPROM
    Update {
        #[command(flatten)]
        device: DeviceArgs,

        /// Image file path
        #[arg(short, long)]
        image: PathBuf,

        /// Toggle the hardware reset after a successful update so the new
        /// firmware loads
        #[arg(long)]
        activate: bool,
    },

    /// Verify the EEPROM contents against an image without writing
    Verify {
        #[command(flatten)]
        device: DeviceArgs,

        /// Image file path
        #[arg(short, long)]
        image: PathBuf,

        /// Also audit the per-block CRC bytes
        #[arg(long)]
        crc: bool,
    },

    /// Read one byte from the EEPROM
    ReadByte {
        #[command(flatten)]
        device: DeviceArgs,

        /// EEPROM address (0..262144)
        #[arg(value_parser = parse_u32)]
        address: u32,
    },

    /// Program one byte of the EEPROM
    WriteByte {
        #[command(flatten)]
        device: DeviceArgs,

        /// EEPROM address (0..262144)
        #[arg(value_parser = parse_u32)]
        address: u32,

        /// Byte value
        #[arg(value_parser = parse_u8)]
        value: u8,
    },

    /// Update or read retimer firmware through the mainboard FPGA.
    /// Mode 0 updates the retimers in the mask, mode 1 reads one back.
    FpgaUpdate {
        /// I2C bus number of the FPGA
        bus: u32,

        /// Retimer index 0-7, or 8 for all
        retimer: u8,

        /// Image file path
        image: PathBuf,

        /// 0 = update, 1 = read
        mode: u8,
    },

    /// SHA-384 digest of a retimer's installed firmware, read through the
    /// mainboard FPGA
    FpgaHash {
        /// I2C bus number of the FPGA
        bus: u32,

        /// Retimer index 0-7
        retimer: u8,
    },
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let parsed = if let Some(hex) = s.strip_prefix("0x") {
        u8::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    parsed.map_err(|_| format!("invalid value: {}", s))
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = if let Some(hex) = s.strip_prefix("0x") {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    parsed.map_err(|_| format!("invalid number: {}", s))
}
