//! Indirect access to on-die microcontroller SRAM
//!
//! The main micro and each of the sixteen path micros expose a small
//! command/address/data window in the register map. A transfer programs the
//! target SRAM offset, latches a command, polls the command register until
//! the micro clears it, then moves bytes through the data window.
//!
//! Two indirect transactions must never interleave against the same micro;
//! the `&mut` session plus the bus lock held across each sequence enforce
//! that here.

use crate::error::{Error, Result};
use crate::port::SmbusPort;
use crate::regs;
use crate::smbus::Smbus;
use crate::timing;

/// Largest block one window transaction can move
pub const MICRO_BLOCK_MAX: usize = 8;
/// Number of path micros
pub const PATH_MICRO_COUNT: u8 = 16;

/// Command op: read one byte into the data window
const OP_READ_BYTE: u8 = 0x1;
/// Command op: read a block into the data window
const OP_READ_BLOCK: u8 = 0x2;
/// Command op: write one byte from the data window
const OP_WRITE_BYTE: u8 = 0x3;
/// Command op: write a block from the data window
const OP_WRITE_BLOCK: u8 = 0x4;
/// Command op: PMA CSR read performed by the main micro
pub(crate) const OP_PMA_READ: u8 = 0x5;
/// Command op: PMA CSR write performed by the main micro
pub(crate) const OP_PMA_WRITE: u8 = 0x6;

/// Register cluster of one micro's indirect window
#[derive(Debug, Clone, Copy)]
pub(crate) struct Window {
    pub addr_lo: u32,
    pub addr_hi: u32,
    pub data: u32,
    pub cmd: u32,
}

/// The main micro's window
pub(crate) const MAIN_WINDOW: Window = Window {
    addr_lo: regs::MM_IND_ADDR_LO,
    addr_hi: regs::MM_IND_ADDR_HI,
    data: regs::MM_IND_DATA,
    cmd: regs::MM_IND_CMD,
};

/// The window of path micro `path` (0..16)
pub(crate) fn path_window(path: u8) -> Result<Window> {
    if path >= PATH_MICRO_COUNT {
        return Err(Error::InvalidArgument);
    }
    let base = regs::PM_IND_BASE + u32::from(path) * regs::PM_IND_STRIDE;
    Ok(Window {
        addr_lo: base,
        addr_hi: base + 1,
        data: base + 2,
        cmd: base + 10,
    })
}

/// Read one byte of main-micro SRAM
pub fn read_byte_main<P: SmbusPort>(bus: &mut Smbus<P>, offset: u16) -> Result<u8> {
    let mut buf = [0u8; 1];
    transfer(bus, MAIN_WINDOW, offset, Dir::Read, &mut buf)?;
    Ok(buf[0])
}

/// Read up to 8 bytes of main-micro SRAM in one window transaction;
/// longer reads are chunked
pub fn read_block_main<P: SmbusPort>(bus: &mut Smbus<P>, offset: u16, buf: &mut [u8]) -> Result<()> {
    chunked(bus, MAIN_WINDOW, offset, Dir::Read, buf)
}

/// Write one byte of main-micro SRAM
pub fn write_byte_main<P: SmbusPort>(bus: &mut Smbus<P>, offset: u16, value: u8) -> Result<()> {
    let mut buf = [value];
    transfer(bus, MAIN_WINDOW, offset, Dir::Write, &mut buf)
}

/// Write up to 8 bytes of main-micro SRAM per window transaction
pub fn write_block_main<P: SmbusPort>(bus: &mut Smbus<P>, offset: u16, data: &[u8]) -> Result<()> {
    let mut copy = data.to_vec();
    chunked(bus, MAIN_WINDOW, offset, Dir::Write, &mut copy)
}

/// Read one byte of a path micro's SRAM
pub fn read_byte_path<P: SmbusPort>(bus: &mut Smbus<P>, path: u8, offset: u16) -> Result<u8> {
    let mut buf = [0u8; 1];
    transfer(bus, path_window(path)?, offset, Dir::Read, &mut buf)?;
    Ok(buf[0])
}

/// Read a block of a path micro's SRAM
pub fn read_block_path<P: SmbusPort>(
    bus: &mut Smbus<P>,
    path: u8,
    offset: u16,
    buf: &mut [u8],
) -> Result<()> {
    chunked(bus, path_window(path)?, offset, Dir::Read, buf)
}

/// Write one byte of a path micro's SRAM
pub fn write_byte_path<P: SmbusPort>(
    bus: &mut Smbus<P>,
    path: u8,
    offset: u16,
    value: u8,
) -> Result<()> {
    let mut buf = [value];
    transfer(bus, path_window(path)?, offset, Dir::Write, &mut buf)
}

/// Write a block of a path micro's SRAM
pub fn write_block_path<P: SmbusPort>(
    bus: &mut Smbus<P>,
    path: u8,
    offset: u16,
    data: &[u8],
) -> Result<()> {
    let mut copy = data.to_vec();
    chunked(bus, path_window(path)?, offset, Dir::Write, &mut copy)
}

#[derive(Clone, Copy, PartialEq)]
enum Dir {
    Read,
    Write,
}

fn chunked<P: SmbusPort>(
    bus: &mut Smbus<P>,
    window: Window,
    offset: u16,
    dir: Dir,
    buf: &mut [u8],
) -> Result<()> {
    if buf.is_empty() {
        return Err(Error::InvalidArgument);
    }
    let mut at = 0usize;
    while at < buf.len() {
        let len = MICRO_BLOCK_MAX.min(buf.len() - at);
        transfer(
            bus,
            window,
            offset.wrapping_add(at as u16),
            dir,
            &mut buf[at..at + len],
        )?;
        at += len;
    }
    Ok(())
}

/// One window transaction of 1..=8 bytes
fn transfer<P: SmbusPort>(
    bus: &mut Smbus<P>,
    window: Window,
    offset: u16,
    dir: Dir,
    buf: &mut [u8],
) -> Result<()> {
    debug_assert!(!buf.is_empty() && buf.len() <= MICRO_BLOCK_MAX);
    let op = match (dir, buf.len()) {
        (Dir::Read, 1) => OP_READ_BYTE,
        (Dir::Read, _) => OP_READ_BLOCK,
        (Dir::Write, 1) => OP_WRITE_BYTE,
        (Dir::Write, _) => OP_WRITE_BLOCK,
    };
    let cmd = op | ((buf.len() as u8) << 4);

    bus.locked(|bus| {
        bus.write_byte(window.addr_lo, offset as u8)?;
        bus.write_byte(window.addr_hi, (offset >> 8) as u8)?;
        if dir == Dir::Write {
            for (i, b) in buf.iter().enumerate() {
                bus.write_byte(window.data + i as u32, *b)?;
            }
        }
        issue(bus, window, cmd)?;
        if dir == Dir::Read {
            for (i, b) in buf.iter_mut().enumerate() {
                *b = bus.read_byte(window.data + i as u32)?;
            }
        }
        Ok(())
    })
}

/// Latch a command and wait for the micro to clear it
pub(crate) fn issue<P: SmbusPort>(bus: &mut Smbus<P>, window: Window, cmd: u8) -> Result<()> {
    bus.write_byte(window.cmd, cmd)?;
    let cleared = poll_command_clear(
        bus,
        window.cmd,
        timing::MM_STATUS_POLL_TRIES,
        timing::MM_STATUS_POLL_US,
    )?;
    if !cleared {
        return Err(Error::MicroBusy);
    }
    Ok(())
}

/// Poll a self-clearing command register until it reads 0
pub(crate) fn poll_command_clear<P: SmbusPort>(
    bus: &mut Smbus<P>,
    cmd_reg: u32,
    tries: u32,
    interval_us: u64,
) -> Result<bool> {
    for attempt in 0..tries {
        if bus.read_byte(cmd_reg)? == 0 {
            return Ok(true);
        }
        if attempt + 1 < tries {
            bus.delay_us(interval_us);
        }
    }
    Ok(false)
}
