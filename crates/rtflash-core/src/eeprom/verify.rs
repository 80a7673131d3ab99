//! EEPROM verification strategies
//!
//! Three strategies in priority order: per-bank checksums computed by the
//! main micro, a byte-level sweep with in-line rewrite recovery, and a
//! block-CRC audit cross-checking the trailing CRC byte of every image
//! block against the device.

use super::master;
use super::write::{assert_resets, quiesce, release_master, WriteMode};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::image::{
    EepromImage, BANK_SIZE, BLOCK_HEADER_LEN, BLOCK_TYPE_END, BURST_SIZE, EEPROM_SIZE,
    FIRST_BLOCK_SCAN_LIMIT, MAX_CRC_BLOCKS,
};
use crate::port::SmbusPort;
use crate::smbus::Smbus;

/// Verify the programmed image by asking the main micro to checksum each
/// bank. The bank containing the terminator is summed partially; banks
/// past it are not checked.
///
/// Requires the bank-checksum firmware feature; the caller selects this
/// strategy from the device's feature set.
pub fn verify_checksum<P: SmbusPort>(device: &mut Device<P>, image: &EepromImage) -> Result<()> {
    if !device.features.bank_checksum() {
        return Err(Error::InvalidArgument);
    }
    let extent = image.write_extent();
    let expected = image.bank_checksums(&extent);

    log::info!("starting main-micro assisted EEPROM verify via checksum");
    let all_match = device.bus_mut().locked(|bus| {
        release_master(bus)?;
        master::set_page(bus, 0)?;
        seek_page_start(bus)?;

        let mut all_match = true;
        let mut bank = 0usize;
        while bank * BANK_SIZE < extent.end {
            if bank > 0 {
                master::set_page(bus, bank as u8)?;
                seek_page_start(bus)?;
            }
            let limit = (extent.end - bank * BANK_SIZE).min(BANK_SIZE);
            let sum = if limit < BANK_SIZE {
                master::assist_checksum_partial(bus, limit as u16)?
            } else {
                master::assist_checksum(bus)?
            };
            if sum != expected[bank] {
                log::error!(
                    "bank {}: checksum mismatch (expected {}, received {})",
                    bank,
                    expected[bank],
                    sum
                );
                all_match = false;
            } else {
                log::info!("bank {}: checksums matched", bank);
            }
            bank += 1;
        }
        log::info!("ending verify");
        Ok(all_match)
    })?;

    if all_match {
        Ok(())
    } else {
        Err(Error::EepromVerify)
    }
}

/// Byte-level verify sweep with rewrite recovery.
///
/// Every mismatching byte gets one rewrite-and-verify attempt; a second
/// mismatch is recorded and the sweep continues. The aggregate outcome is
/// the worst observed one.
pub fn verify_bytes<P: SmbusPort>(
    device: &mut Device<P>,
    image: &EepromImage,
    mode: WriteMode,
) -> Result<()> {
    let assisted = mode == WriteMode::Assisted && device.features.assisted_verify();
    let seq_read = device.features.seq_read();
    let extent = image.write_extent();

    device.bus_mut().locked(|bus| {
        quiesce(bus, mode)?;
        master::set_page(bus, 0)?;
        seek_page_start(bus)?;

        let mut worst = Ok(());
        let mut mismatches = 0usize;

        if assisted {
            log::info!("starting main-micro assisted EEPROM verify");
            let mut current_page = 0u8;
            let mut addr = 0usize;
            while addr < extent.end {
                let page = (addr / BANK_SIZE) as u8;
                if page != current_page {
                    master::set_page(bus, page)?;
                    seek_page_start(bus)?;
                    current_page = page;
                }

                let addr_in_page = addr % BANK_SIZE;
                if addr_in_page % 0x2000 == 0 {
                    log::info!(
                        "slv: 0x{:02x}, reg: 0x{:04x}, mismatch count: {}",
                        0x50 + page,
                        addr_in_page,
                        mismatches
                    );
                }

                // terminate the bus transaction on the last block of each page
                // so the following page select starts clean
                let last_of_page = addr_in_page + BURST_SIZE >= BANK_SIZE;
                let mut block = [0u8; BURST_SIZE];
                master::assist_receive_block(bus, seq_read && !last_of_page, &mut block)?;

                let mut rewrote = false;
                for (i, &got) in block.iter().enumerate() {
                    let expected = image.as_slice()[addr + i];
                    if got != expected {
                        mismatches += 1;
                        log::error!(
                            "data mismatch at {}: expected 0x{:02x}, received 0x{:02x}; re-trying",
                            addr + i,
                            expected,
                            got
                        );
                        match master::rewrite_and_verify_byte(bus, (addr + i) as u32, expected) {
                            Ok(()) => {}
                            Err(Error::EepromVerify) => worst = Err(Error::EepromVerify),
                            Err(e) => return Err(e),
                        }
                        rewrote = true;
                    }
                }
                // the rewrite moved the stream pointer; put it back at the next block
                if rewrote {
                    master::send_address(bus, (addr + BURST_SIZE) as u16)?;
                }

                addr += BURST_SIZE;
            }
        } else {
            log::info!("starting legacy mode EEPROM verify");
            let mut current_page = 0u8;
            let mut first_byte = true;
            for addr in 0..extent.end {
                let page = (addr / BANK_SIZE) as u8;
                if page != current_page {
                    master::set_page(bus, page)?;
                    seek_page_start(bus)?;
                    current_page = page;
                    first_byte = true;
                }

                let addr_in_page = addr % BANK_SIZE;
                if addr_in_page % 0x2000 == 0 {
                    log::info!(
                        "slv: 0x{:02x}, reg: 0x{:04x}, mismatch count: {}",
                        0x50 + page,
                        addr_in_page,
                        mismatches
                    );
                }

                let got = if first_byte {
                    first_byte = false;
                    master::receive_byte(bus)?
                } else {
                    master::receive_continuous_byte(bus)?
                };

                let expected = image.as_slice()[addr];
                if got != expected {
                    mismatches += 1;
                    log::error!(
                        "data mismatch at {}: expected 0x{:02x}, received 0x{:02x}; re-trying",
                        addr,
                        expected,
                        got
                    );
                    match master::rewrite_and_verify_byte(bus, addr as u32, expected) {
                        Ok(()) => {}
                        Err(Error::EepromVerify) => worst = Err(Error::EepromVerify),
                        Err(e) => return Err(e),
                    }
                    // the rewrite's readback left the stream pointer at addr+1,
                    // exactly where the sweep resumes
                }
            }
        }
        log::info!("ending verify; {} mismatches", mismatches);

        assert_resets(bus)?;
        worst
    })
}

/// Block-CRC audit: walk the block chain on the device, collect each
/// block's trailing CRC byte, and compare the set against the in-memory
/// image. A count mismatch is an error even when all present bytes match.
pub fn audit_block_crcs<P: SmbusPort>(device: &mut Device<P>, image: &EepromImage) -> Result<()> {
    let image_crcs = image.collect_block_crcs()?;

    let device_crcs = device.bus_mut().locked(|bus| {
        bus.write_block(crate::regs::HW_RST, &[0x00, 0x00])?;
        bus.write_block(crate::regs::SW_RST, &[0x00, 0x00])?;
        master::init(bus)?;
        master::set_page(bus, 0)?;
        seek_page_start(bus)?;

        let device_crcs = collect_device_crcs(bus);
        assert_resets(bus)?;
        device_crcs
    })?;

    if device_crcs.len() != image_crcs.len() {
        log::error!(
            "CRC block count mismatch: EEPROM has {}, image has {}",
            device_crcs.len(),
            image_crcs.len()
        );
        return Err(Error::EepromCrcBlockNum);
    }
    for (i, (dev, img)) in device_crcs.iter().zip(image_crcs.iter()).enumerate() {
        if dev != img {
            log::error!(
                "CRC byte mismatch in block {}: EEPROM 0x{:02x}, image 0x{:02x}",
                i,
                dev,
                img
            );
            return Err(Error::EepromCrcByte);
        }
    }
    log::info!("EEPROM block CRCs match the expected image");
    Ok(())
}

fn collect_device_crcs<P: SmbusPort>(bus: &mut Smbus<P>) -> Result<Vec<u8>> {
    // the first block should start at address zero, but scan a short window
    let mut head = [0u8; FIRST_BLOCK_SCAN_LIMIT + 4];
    for b in head.iter_mut() {
        *b = master::receive_byte(bus)?;
    }
    let start = head
        .windows(4)
        .take(FIRST_BLOCK_SCAN_LIMIT)
        .position(|w| w == crate::image::BLOCK_SIGNATURE)
        .ok_or(Error::EepromCrcBlockNum)?;

    let mut crcs = Vec::new();
    let mut start = start as u32;
    while crcs.len() < MAX_CRC_BLOCKS {
        let block_type = master::random_read(bus, start + 4)?;
        if block_type == BLOCK_TYPE_END {
            break;
        }
        let len_lo = master::random_read(bus, start + 5)?;
        let len_hi = master::random_read(bus, start + 6)?;
        let len = u32::from(u16::from_le_bytes([len_lo, len_hi]));
        let crc_at = start + BLOCK_HEADER_LEN as u32 + len;
        if crc_at >= EEPROM_SIZE as u32 {
            return Err(Error::EepromCrcBlockNum);
        }
        crcs.push(master::random_read(bus, crc_at)?);
        start = crc_at + 1;
        if start as usize + BLOCK_HEADER_LEN > EEPROM_SIZE {
            break;
        }
    }
    Ok(crcs)
}

/// Rewind the EEPROM stream pointer to offset zero of the current page
fn seek_page_start<P: SmbusPort>(bus: &mut Smbus<P>) -> Result<()> {
    master::send_byte(bus, 0, master::FLAG_ADDR_HI)?;
    master::send_byte(bus, 0, master::FLAG_ADDR_LO)
}
