//! On-chip I2C master operations
//!
//! The retimer's EEPROM hangs off an on-die DesignWare-style I2C master.
//! Its CSRs are reached through a four-byte staging window: select the CSR
//! offset, stage data, latch with the command register. Byte-level bus
//! traffic goes through the IC data/command CSR with a flag byte steering
//! start/stop framing.
//!
//! The assisted operations hand whole 16-byte blocks to the main micro's
//! EEPROM mailbox instead, cutting the per-byte SMBus round-trips.

use crate::error::{Error, Result};
use crate::image::BURST_SIZE;
use crate::micro::poll_command_clear;
use crate::port::SmbusPort;
use crate::regs;
use crate::smbus::Smbus;
use crate::timing;

/// EEPROM base slave address on the master's bus
const EEPROM_SLAVE: u8 = 0x50;

/// Flag: continue the current bus transaction
const FLAG_CONT: u8 = 0;
/// Flag (as passed to `send_byte`): address low byte, end of address phase
pub const FLAG_ADDR_LO: u8 = 1;
/// Flag (as passed to `send_byte`): address high byte, start of transaction
pub const FLAG_ADDR_HI: u8 = 2;
/// Staged flag value: last byte of a write, issue stop
const FLAG_STOP: u8 = 2;
/// Staged flag value: read one byte, issue stop
const FLAG_READ: u8 = 3;

/// Write up to four bytes to a CSR of the I2C master IP
pub fn write_ctrl_reg<P: SmbusPort>(bus: &mut Smbus<P>, offset: u8, values: &[u8]) -> Result<()> {
    if values.is_empty() || values.len() > 4 {
        return Err(Error::InvalidArgument);
    }
    bus.locked(|bus| {
        bus.write_byte(regs::I2C_MST_IC_CMD, offset)?;
        let mut staged = [0u8; 4];
        staged[..values.len()].copy_from_slice(values);
        let data_regs = [
            regs::I2C_MST_DATA0,
            regs::I2C_MST_DATA1,
            regs::I2C_MST_DATA2,
            regs::I2C_MST_DATA3,
        ];
        for (reg, b) in data_regs.iter().zip(staged.iter()) {
            bus.write_byte(*reg, *b)?;
        }
        bus.write_byte(regs::I2C_MST_CMD, 1)
    })
}

/// Program the master for EEPROM write-through: disable, control word,
/// target address, FIFO thresholds, enable
pub fn init<P: SmbusPort>(bus: &mut Smbus<P>) -> Result<()> {
    write_ctrl_reg(bus, regs::IC_ENABLE, &[0])?;
    write_ctrl_reg(bus, regs::IC_CON, &[0xE5, 0x0F])?;
    write_ctrl_reg(bus, regs::IC_TAR, &[EEPROM_SLAVE])?;
    write_ctrl_reg(bus, regs::IC_RX_TL, &[0])?;
    write_ctrl_reg(bus, regs::IC_TX_TL, &[4])?;
    write_ctrl_reg(bus, regs::IC_ENABLE, &[1])
}

/// Announce a 64 KiB page: the EEPROM's page bits live in the target slave
/// address. The master must be disabled while the target changes.
pub fn set_page<P: SmbusPort>(bus: &mut Smbus<P>, page: u8) -> Result<()> {
    let tar = EEPROM_SLAVE | (page & 3);
    write_ctrl_reg(bus, regs::IC_ENABLE, &[0])?;
    write_ctrl_reg(bus, regs::IC_TAR, &[tar])?;
    write_ctrl_reg(bus, regs::IC_ENABLE, &[1])
}

/// Retune the bus clock. The supported range is 400 kHz to 1 MHz.
pub fn set_frequency<P: SmbusPort>(bus: &mut Smbus<P>, frequency_hz: u32) -> Result<()> {
    if !(400_000..=1_000_000).contains(&frequency_hz) {
        return Err(Error::InvalidArgument);
    }
    const DEFAULT_SCL_LOW_CNT: u32 = 0x28A;
    const DEFAULT_SCL_HIGH_CNT: u32 = 0x12C;
    const DEFAULT_FREQ_HZ: u32 = 935_000;

    let scale = DEFAULT_FREQ_HZ / frequency_hz;
    let low_cnt = scale * DEFAULT_SCL_LOW_CNT;
    let high_cnt = scale * DEFAULT_SCL_HIGH_CNT;

    // reset the IP before touching the counts
    bus.write_block(regs::HW_RST, &[0x00, 0x02])?;
    write_ctrl_reg(bus, regs::IC_ENABLE, &[0])?;
    bus.write_block(regs::HW_RST, &[0x00, 0x00])?;

    write_ctrl_reg(bus, regs::IC_FS_SCL_HCNT, &high_cnt.to_le_bytes()[..2])?;
    write_ctrl_reg(bus, regs::IC_FS_SCL_LCNT, &low_cnt.to_le_bytes()[..2])?;
    write_ctrl_reg(bus, regs::IC_ENABLE, &[1])
}

/// Bit-bang a start, nine clock pulses and a stop on the master's pins to
/// release any slave stuck mid-transaction
pub fn soft_reset<P: SmbusPort>(bus: &mut Smbus<P>) -> Result<()> {
    const SDA_SCL: u8 = 3;
    const SCL_ONLY: u8 = 1;
    const SDA_ONLY: u8 = 2;
    const NEITHER: u8 = 0;

    bus.locked(|bus| {
        bus.write_byte(regs::I2C_MST_BB_OUTPUT, SDA_SCL)?;
        let init_ctrl = bus.read_byte(regs::I2C_MST_INIT_CTRL)?;
        bus.write_byte(regs::I2C_MST_INIT_CTRL, init_ctrl | 1)?;

        // start
        for level in [SDA_SCL, SCL_ONLY, NEITHER, SDA_ONLY] {
            bus.write_byte(regs::I2C_MST_BB_OUTPUT, level)?;
            bus.delay_us(timing::BB_SCL_HALF_PERIOD_US);
        }
        // nine clock pulses
        for _ in 0..9 {
            bus.write_byte(regs::I2C_MST_BB_OUTPUT, SDA_SCL)?;
            bus.delay_us(timing::BB_SCL_HALF_PERIOD_US);
            bus.write_byte(regs::I2C_MST_BB_OUTPUT, SDA_ONLY)?;
            bus.delay_us(timing::BB_SCL_HALF_PERIOD_US);
        }
        // stop
        for level in [NEITHER, SCL_ONLY, SDA_SCL] {
            bus.write_byte(regs::I2C_MST_BB_OUTPUT, level)?;
            bus.delay_us(timing::BB_SCL_HALF_PERIOD_US);
        }

        bus.write_byte(regs::I2C_MST_INIT_CTRL, init_ctrl & !1)
    })
}

/// Send one byte onto the EEPROM bus through the IC data CSR.
/// `flag` is 2 for the address high byte (start), 1 for the address low byte.
pub fn send_byte<P: SmbusPort>(bus: &mut Smbus<P>, value: u8, flag: u8) -> Result<()> {
    bus.locked(|bus| {
        bus.write_byte(regs::I2C_MST_IC_CMD, regs::IC_DATA_CMD)?;
        bus.write_byte(regs::I2C_MST_DATA0, value)?;
        bus.write_byte(regs::I2C_MST_DATA1, flag << 1)?;
        bus.write_byte(regs::I2C_MST_CMD, 1)
    })
}

/// Position the EEPROM stream pointer at `address` within the current page
pub fn send_address<P: SmbusPort>(bus: &mut Smbus<P>, address: u16) -> Result<()> {
    bus.locked(|bus| {
        bus.write_byte(regs::I2C_MST_IC_CMD, regs::IC_DATA_CMD)?;
        bus.write_byte(regs::I2C_MST_DATA1, FLAG_CONT)?;
        bus.write_byte(regs::I2C_MST_DATA0, (address >> 8) as u8)?;
        bus.write_byte(regs::I2C_MST_CMD, 1)?;
        bus.write_byte(regs::I2C_MST_DATA0, address as u8)?;
        bus.write_byte(regs::I2C_MST_CMD, 1)
    })
}

/// Legacy write burst: address phase plus data bytes pushed one at a time,
/// stop flagged on the final byte
pub fn send_byte_block<P: SmbusPort>(bus: &mut Smbus<P>, address: u16, values: &[u8]) -> Result<()> {
    if values.is_empty() {
        return Err(Error::InvalidArgument);
    }
    bus.locked(|bus| {
        bus.write_byte(regs::I2C_MST_IC_CMD, regs::IC_DATA_CMD)?;
        bus.write_byte(regs::I2C_MST_DATA1, FLAG_CONT)?;
        bus.write_byte(regs::I2C_MST_DATA0, (address >> 8) as u8)?;
        bus.write_byte(regs::I2C_MST_CMD, 1)?;
        bus.write_byte(regs::I2C_MST_DATA0, address as u8)?;
        bus.write_byte(regs::I2C_MST_CMD, 1)?;

        for &b in &values[..values.len() - 1] {
            bus.write_byte(regs::I2C_MST_DATA0, b)?;
            bus.write_byte(regs::I2C_MST_CMD, 1)?;
        }
        bus.write_byte(regs::I2C_MST_DATA1, FLAG_STOP)?;
        bus.write_byte(regs::I2C_MST_DATA0, values[values.len() - 1])?;
        bus.write_byte(regs::I2C_MST_CMD, 1)
    })
}

/// Receive one byte at the stream pointer, terminating the transaction
pub fn receive_byte<P: SmbusPort>(bus: &mut Smbus<P>) -> Result<u8> {
    bus.locked(|bus| {
        bus.write_byte(regs::I2C_MST_IC_CMD, regs::IC_DATA_CMD)?;
        bus.write_byte(regs::I2C_MST_DATA1, FLAG_READ)?;
        bus.write_byte(regs::I2C_MST_CMD, 1)?;
        bus.delay_us(timing::MST_CMD_HOLD_US);
        bus.write_byte(regs::I2C_MST_CMD, 0)?;
        bus.read_byte(regs::I2C_MST_DATA0)
    })
}

/// Receive the next byte of an open read stream
pub fn receive_continuous_byte<P: SmbusPort>(bus: &mut Smbus<P>) -> Result<u8> {
    bus.locked(|bus| {
        bus.write_byte(regs::I2C_MST_CMD, 1)?;
        bus.delay_us(timing::MST_CMD_HOLD_US);
        bus.write_byte(regs::I2C_MST_CMD, 0)?;
        bus.read_byte(regs::I2C_MST_DATA0)
    })
}

/// Random read of one byte anywhere in the EEPROM: select the page, send
/// the address, fetch with stop
pub fn random_read<P: SmbusPort>(bus: &mut Smbus<P>, address: u32) -> Result<u8> {
    set_page(bus, (address >> 16) as u8)?;
    bus.locked(|bus| {
        bus.write_byte(regs::I2C_MST_IC_CMD, regs::IC_DATA_CMD)?;
        bus.write_byte(regs::I2C_MST_DATA1, FLAG_CONT)?;
        bus.write_byte(regs::I2C_MST_DATA0, (address >> 8) as u8)?;
        bus.write_byte(regs::I2C_MST_CMD, 1)?;
        bus.write_byte(regs::I2C_MST_DATA0, address as u8)?;
        bus.write_byte(regs::I2C_MST_CMD, 1)?;

        bus.write_byte(regs::I2C_MST_DATA1, FLAG_READ)?;
        bus.write_byte(regs::I2C_MST_CMD, 1)?;
        bus.delay_us(timing::MST_CMD_HOLD_US);
        bus.write_byte(regs::I2C_MST_CMD, 0)?;
        bus.read_byte(regs::I2C_MST_DATA0)
    })
}

/// Assisted write: deliver `values` (a multiple of 16 bytes) to the main
/// micro's mailbox; the micro clocks them onto the EEPROM bus
pub fn assist_block_write<P: SmbusPort>(
    bus: &mut Smbus<P>,
    address: u16,
    values: &[u8],
) -> Result<()> {
    if values.is_empty() || values.len() % BURST_SIZE != 0 {
        return Err(Error::InvalidArgument);
    }
    bus.locked(|bus| {
        // address phase over the IC data CSR
        bus.write_byte(regs::I2C_MST_IC_CMD, regs::IC_DATA_CMD)?;
        bus.write_byte(regs::I2C_MST_DATA1, FLAG_CONT)?;
        bus.write_byte(regs::I2C_MST_DATA0, (address >> 8) as u8)?;
        bus.write_byte(regs::I2C_MST_CMD, 1)?;
        bus.write_byte(regs::I2C_MST_DATA0, address as u8)?;
        bus.write_byte(regs::I2C_MST_CMD, 1)?;

        let chunks = values.chunks_exact(BURST_SIZE);
        let last = values.len() / BURST_SIZE - 1;
        for (i, chunk) in chunks.enumerate() {
            for (quad, at) in chunk.chunks_exact(4).zip((0..16u32).step_by(4)) {
                bus.write_block(regs::MM_EEPROM_ASSIST_DATA + at, quad)?;
            }
            let cmd = if i == last {
                regs::ASSIST_CMD_WRITE_END
            } else {
                regs::ASSIST_CMD_WRITE
            };
            bus.write_byte(regs::MM_EEPROM_ASSIST_CMD, cmd)?;
            wait_assist(bus, timing::MM_STATUS_POLL_TRIES)?;
        }
        Ok(())
    })
}

/// Assisted read of one 16-byte block at the stream pointer. `continuous`
/// keeps the EEPROM transaction open for the next block.
pub fn assist_receive_block<P: SmbusPort>(
    bus: &mut Smbus<P>,
    continuous: bool,
    out: &mut [u8; BURST_SIZE],
) -> Result<()> {
    let cmd = if continuous {
        regs::ASSIST_CMD_READ_CONT
    } else {
        regs::ASSIST_CMD_READ
    };
    let tries = if continuous {
        timing::MM_READ_CONT_TRIES
    } else {
        timing::MM_STATUS_POLL_TRIES
    };
    bus.locked(|bus| {
        bus.write_byte(regs::MM_EEPROM_ASSIST_CMD, cmd)?;
        bus.delay_us(timing::MM_READ_CMD_WAIT_US);
        wait_assist(bus, tries)?;
        for (quad, at) in out.chunks_exact_mut(4).zip((0..16u32).step_by(4)) {
            bus.read_block(regs::MM_EEPROM_ASSIST_DATA + at, quad)?;
        }
        Ok(())
    })
}

/// Ask the micro to sum every byte of the current EEPROM bank
pub fn assist_checksum<P: SmbusPort>(bus: &mut Smbus<P>) -> Result<u32> {
    bus.locked(|bus| {
        bus.write_byte(regs::MM_EEPROM_ASSIST_CMD, regs::ASSIST_CMD_CHECKSUM)?;
        collect_checksum(bus)
    })
}

/// Ask the micro to sum the current bank up to `end` bytes in
pub fn assist_checksum_partial<P: SmbusPort>(bus: &mut Smbus<P>, end: u16) -> Result<u32> {
    bus.locked(|bus| {
        let mut staged = [0u8; 4];
        staged[..2].copy_from_slice(&end.to_le_bytes());
        bus.write_block(regs::MM_EEPROM_ASSIST_DATA, &staged)?;
        bus.delay_us(1_000);
        bus.write_byte(
            regs::MM_EEPROM_ASSIST_CMD,
            regs::ASSIST_CMD_CHECKSUM_PARTIAL,
        )?;
        collect_checksum(bus)
    })
}

fn collect_checksum<P: SmbusPort>(bus: &mut Smbus<P>) -> Result<u32> {
    bus.delay_us(timing::MM_CHECKSUM_WAIT_US);
    let cleared = poll_command_clear(
        bus,
        regs::MM_EEPROM_ASSIST_CMD,
        timing::MM_CHECKSUM_POLL_TRIES,
        timing::MM_CHECKSUM_POLL_US,
    )?;
    if !cleared {
        return Err(Error::MicroBusy);
    }
    let mut word = [0u8; 4];
    bus.read_block(regs::MM_EEPROM_ASSIST_DATA, &mut word)?;
    Ok(u32::from_le_bytes(word))
}

fn wait_assist<P: SmbusPort>(bus: &mut Smbus<P>, tries: u32) -> Result<()> {
    let cleared = poll_command_clear(
        bus,
        regs::MM_EEPROM_ASSIST_CMD,
        tries,
        timing::MM_STATUS_POLL_US,
    )?;
    if !cleared {
        log::error!("main micro busy: assist command did not complete");
        return Err(Error::MicroBusy);
    }
    Ok(())
}

/// Program one byte and read it back through a random read
pub fn rewrite_and_verify_byte<P: SmbusPort>(
    bus: &mut Smbus<P>,
    address: u32,
    expected: u8,
) -> Result<()> {
    set_page(bus, (address >> 16) as u8)?;
    send_byte_block(bus, address as u16, &[expected])?;
    bus.delay_us(timing::BYTE_PROGRAM_US);

    send_address(bus, address as u16)?;
    let got = receive_byte(bus)?;
    if got == expected {
        log::info!("re-write of 0x{:05x} succeeded", address);
        Ok(())
    } else {
        log::info!(
            "re-write of 0x{:05x} failed: expected 0x{:02x} but got 0x{:02x}",
            address,
            expected,
            got
        );
        Err(Error::EepromVerify)
    }
}
