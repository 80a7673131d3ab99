//! Device-direct commands: probe, update, verify, byte access

use super::CliError;
use crate::cli::DeviceArgs;

use indicatif::{ProgressBar, ProgressStyle};
use rtflash_core::device::{Device, FwFeatures, PartKind};
use rtflash_core::eeprom::{self, WriteMode};
use rtflash_core::error::Error as CoreError;
use rtflash_core::ihex;
use rtflash_core::smbus::{Framing, Smbus};
use rtflash_core::update::{self, LogSink};
use rtflash_linux_i2c::LinuxI2c;
use std::path::Path;
use std::time::Duration;

/// Firmware reload time after a hardware-reset release
const FW_RELOAD_WAIT: Duration = Duration::from_secs(2);

/// Open the bus and initialize a device handle per the CLI arguments
pub fn open_device(args: &DeviceArgs) -> Result<Device<LinuxI2c>, CliError> {
    let port = LinuxI2c::open(args.bus, args.addr)?;
    let framing = if args.intel {
        Framing::Long
    } else {
        Framing::Short
    };
    let bus = Smbus::new(port, framing, args.pec);
    let part = if args.x8 { PartKind::X8 } else { PartKind::X16 };
    let mut device = Device::new(bus, part);
    device.init()?;
    Ok(device)
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub fn run_probe(args: &DeviceArgs) -> Result<(), CliError> {
    let mut device = open_device(args)?;

    println!("Retimer at bus {} address 0x{:02x}", args.bus, args.addr);
    println!("=====================================");
    println!();
    println!("Vendor id:        0x{:04x}", device.vendor_id);
    println!("Device id:        0x{:02x}", device.device_id);
    println!("Revision:         0x{:02x}", device.revision);
    println!("Firmware:         {}", device.fw_version);
    println!("Code load:        {}", if device.code_load_ok { "ok" } else { "INCOMPLETE" });
    println!("Heartbeat:        {}", if device.heartbeat_ok { "alive" } else { "ABSENT" });
    if device.arp_used {
        println!("Addressing:       resolved via ARP");
    }
    let chip_id: String = device.chip_id.iter().map(|b| format!("{:02x}", b)).collect();
    println!("Chip id:          {}", chip_id);
    if device.features.contains(FwFeatures::TEMP_ADC) {
        if let (Ok(now), Ok(max)) = (device.current_temp_c(), device.max_temp_c()) {
            println!("Temperature:      {:.1} C (max {:.1} C)", now, max);
        }
    }
    Ok(())
}

pub fn run_update(args: &DeviceArgs, image: &Path, activate: bool) -> Result<(), CliError> {
    let mut device = open_device(args)?;
    println!("Running firmware: {}", device.fw_version);

    let pb = spinner("Programming EEPROM (this takes a few minutes)...");
    let result = update::update_firmware_file(&mut device, image, &mut LogSink);
    match &result {
        Ok(()) => pb.finish_with_message("EEPROM programmed and verified"),
        Err(e) => pb.finish_with_message(format!("update failed: {}", e)),
    }
    result?;

    if activate {
        let pb = spinner("Resetting device to load the new firmware...");
        device.set_hw_reset(true)?;
        std::thread::sleep(Duration::from_millis(10));
        device.set_hw_reset(false)?;
        std::thread::sleep(FW_RELOAD_WAIT);
        device.init()?;
        pb.finish_with_message(format!("running firmware {}", device.fw_version));
    }
    Ok(())
}

pub fn run_verify(args: &DeviceArgs, image: &Path, crc: bool) -> Result<(), CliError> {
    let mut device = open_device(args)?;
    let image = ihex::load_image(image)?;

    let mode = if device.arp_used || !device.heartbeat_ok {
        WriteMode::Legacy
    } else {
        WriteMode::Assisted
    };

    let pb = spinner("Verifying EEPROM contents...");
    let mut result = if mode == WriteMode::Assisted && device.features.bank_checksum() {
        eeprom::verify_checksum(&mut device, &image)
    } else {
        eeprom::verify_bytes(&mut device, &image, mode)
    };
    // a checksum mismatch falls back to the byte sweep, which can repair
    if result == Err(CoreError::EepromVerify) && mode == WriteMode::Assisted {
        pb.set_message("Checksum mismatch; running byte-level verify...");
        result = eeprom::verify_bytes(&mut device, &image, mode);
    }
    result?;

    if crc {
        pb.set_message("Auditing block CRCs...");
        eeprom::audit_block_crcs(&mut device, &image)?;
    }
    pb.finish_with_message("EEPROM contents match the image");
    Ok(())
}

pub fn run_read_byte(args: &DeviceArgs, address: u32) -> Result<(), CliError> {
    let mut device = open_device(args)?;
    let value = eeprom::read_byte(&mut device, address)?;
    println!("0x{:05x}: 0x{:02x}", address, value);
    Ok(())
}

pub fn run_write_byte(args: &DeviceArgs, address: u32, value: u8) -> Result<(), CliError> {
    let mut device = open_device(args)?;
    eeprom::write_byte(&mut device, address, value)?;
    let back = eeprom::read_byte(&mut device, address)?;
    if back != value {
        log::error!(
            "read-back mismatch at 0x{:05x}: wrote 0x{:02x}, read 0x{:02x}",
            address,
            value,
            back
        );
        return Err(CoreError::EepromVerify.into());
    }
    println!("0x{:05x} <- 0x{:02x}", address, value);
    Ok(())
}
