//! EEPROM write paths

use super::master;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::image::{DeltaEntry, EepromImage, BANK_SIZE, BURST_SIZE, PAGE_SIZE};
use crate::port::SmbusPort;
use crate::regs;
use crate::smbus::Smbus;
use crate::timing;

/// How the image bytes travel to the EEPROM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// 16-byte bursts through the main micro's assist mailbox. Requires
    /// running firmware of a sufficient revision.
    Assisted,
    /// Byte-at-a-time through the master CSRs. Slow, but works with no
    /// valid firmware on the device.
    Legacy,
}

/// Program the valid portion of `image` into the EEPROM.
///
/// Leaves both reset registers asserted; the caller decides whether to
/// re-run initialization before a verify pass.
pub fn write_image<P: SmbusPort>(
    device: &mut Device<P>,
    image: &EepromImage,
    mode: WriteMode,
) -> Result<()> {
    // The feature gate is checked before the assisted path is enabled; a
    // device without the assist falls back to legacy bursts.
    let assisted = mode == WriteMode::Assisted && device.features.assisted_write();
    if mode == WriteMode::Assisted && !assisted {
        log::warn!("firmware lacks write assist; falling back to legacy bursts");
    }

    let extent = image.write_extent();

    // the page-select-then-burst sequences must not interleave with
    // another session, so the bus lock spans the whole write
    device.bus_mut().locked(|bus| {
        quiesce(bus, mode)?;
        master::init(bus)?;
        master::set_page(bus, 0)?;

        if assisted {
            log::info!("starting main-micro assisted EEPROM write");
        } else {
            log::info!("starting legacy mode EEPROM write");
        }

        let mut current_page = 0u8;
        let mut addr = 0usize;
        while addr < extent.end {
            let page = (addr / BANK_SIZE) as u8;
            if page != current_page {
                master::set_page(bus, page)?;
                current_page = page;
            }

            let addr_in_page = (addr % BANK_SIZE) as u16;
            if addr % 0x2000 == 0 {
                log::info!("slv: 0x{:02x}, reg: 0x{:04x}", 0x50 + page, addr_in_page);
            }

            let page_len = match extent.last_page_addr {
                Some(last) if addr == last => extent.last_page_len,
                _ => PAGE_SIZE,
            };

            for burst in (0..page_len).step_by(BURST_SIZE) {
                let chunk = &image.as_slice()[addr + burst..addr + burst + BURST_SIZE];
                let burst_addr = addr_in_page + burst as u16;
                if assisted {
                    master::assist_block_write(bus, burst_addr, chunk)?;
                } else {
                    master::send_byte_block(bus, burst_addr, chunk)?;
                }
                bus.delay_us(timing::DATA_BLOCK_PROGRAM_US);
            }

            addr += PAGE_SIZE;
        }
        log::info!("ending write");

        assert_resets(bus)
    })
}

/// Program only the bytes that differ from the image currently on the
/// EEPROM. Callers with more than a quarter of the image changed are
/// redirected to the full-image path by `EepromImage::delta_from`.
pub fn write_delta<P: SmbusPort>(
    device: &mut Device<P>,
    differences: &[DeltaEntry],
) -> Result<()> {
    device.bus_mut().locked(|bus| {
        quiesce(bus, WriteMode::Legacy)?;
        master::init(bus)?;
        master::set_page(bus, 0)?;

        let mut current_page = 0u8;
        for entry in differences {
            let page = (entry.address >> 16) as u8;
            if page != current_page {
                master::set_page(bus, page)?;
                current_page = page;
            }
            master::rewrite_and_verify_byte(bus, entry.address, entry.data)?;
        }

        assert_resets(bus)
    })
}

/// Read one byte from the EEPROM
pub fn read_byte<P: SmbusPort>(device: &mut Device<P>, address: u32) -> Result<u8> {
    if address as usize >= crate::image::EEPROM_SIZE {
        return Err(Error::InvalidArgument);
    }
    device.bus_mut().locked(|bus| {
        release_master(bus)?;
        let value = master::random_read(bus, address)?;
        assert_resets(bus)?;
        Ok(value)
    })
}

/// Program one byte of the EEPROM
pub fn write_byte<P: SmbusPort>(device: &mut Device<P>, address: u32, value: u8) -> Result<()> {
    if address as usize >= crate::image::EEPROM_SIZE {
        return Err(Error::InvalidArgument);
    }
    device.bus_mut().locked(|bus| {
        release_master(bus)?;
        master::set_page(bus, (address >> 16) as u8)?;
        master::send_byte_block(bus, address as u16, &[value])?;
        bus.delay_us(timing::BYTE_PROGRAM_US);
        assert_resets(bus)
    })
}

/// Stream `buf.len()` bytes starting at `start`, using legacy reads
pub fn read_block<P: SmbusPort>(device: &mut Device<P>, start: u32, buf: &mut [u8]) -> Result<()> {
    let end = start as usize + buf.len();
    if buf.is_empty() || end > crate::image::EEPROM_SIZE {
        return Err(Error::InvalidArgument);
    }
    device.bus_mut().locked(|bus| {
        release_master(bus)?;

        let mut current_page = None;
        for (i, out) in buf.iter_mut().enumerate() {
            let addr = start + i as u32;
            let page = (addr >> 16) as u8;
            if current_page != Some(page) {
                master::set_page(bus, page)?;
                master::send_byte(bus, (addr >> 8) as u8, master::FLAG_ADDR_HI)?;
                master::send_byte(bus, addr as u8, master::FLAG_ADDR_LO)?;
                current_page = Some(page);
            }
            *out = master::receive_byte(bus)?;
        }

        assert_resets(bus)
    })
}

/// 8-bit running sum over an EEPROM address range
pub fn calc_checksum<P: SmbusPort>(device: &mut Device<P>, start: u32, len: usize) -> Result<u8> {
    let mut buf = vec![0u8; len];
    read_block(device, start, &mut buf)?;
    Ok(buf.iter().fold(0u8, |sum, &b| sum.wrapping_add(b)))
}

/// Deassert the device resets, isolate the main micro per the write mode,
/// then clear any stuck EEPROM slave with a bit-banged bus reset.
pub(super) fn quiesce<P: SmbusPort>(bus: &mut Smbus<P>, mode: WriteMode) -> Result<()> {
    bus.write_block(regs::HW_RST, &[0x00, 0x00])?;
    bus.write_block(regs::SW_RST, &[0x00, 0x00])?;

    match mode {
        WriteMode::Legacy => {
            // hold the main micro in reset; the firmware is not trusted here
            bus.write_block(regs::SW_RST, &[0x00, 0x04])?;
            bus.write_block(regs::SW_RST, &[0x00, 0x06])?;
            bus.write_block(regs::SW_RST, &[0x00, 0x04])?;
        }
        WriteMode::Assisted => {
            bus.write_block(regs::SW_RST, &[0x00, 0x02])?;
            bus.write_block(regs::SW_RST, &[0x00, 0x00])?;
        }
    }

    master::soft_reset(bus)?;
    bus.delay_us(timing::RESET_SETTLE_US);
    Ok(())
}

/// Deassert the hardware reset and pulse the software reset, without
/// touching the main micro. Used by the standalone byte paths.
pub(super) fn release_master<P: SmbusPort>(bus: &mut Smbus<P>) -> Result<()> {
    bus.write_block(regs::HW_RST, &[0x00, 0x00])?;
    bus.write_block(regs::SW_RST, &[0x00, 0x02])?;
    bus.write_block(regs::SW_RST, &[0x00, 0x00])?;
    Ok(())
}

/// Leave both reset registers asserted for the I2C master interface
pub(super) fn assert_resets<P: SmbusPort>(bus: &mut Smbus<P>) -> Result<()> {
    bus.write_block(regs::HW_RST, &[0x00, 0x02])?;
    bus.write_block(regs::SW_RST, &[0x00, 0x02])?;
    bus.delay_us(timing::RESET_SETTLE_US);
    Ok(())
}
