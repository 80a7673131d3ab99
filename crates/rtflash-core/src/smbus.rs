//! Layered SMBus transport for the retimer's 17-bit register space
//!
//! Maps logical register reads and writes of 1..=16 bytes onto the device's
//! SMBus command protocol. Two framings are supported:
//!
//! - **Short** (default): a preparatory write to the extended-command
//!   register captures the high address bits and the transfer length; the
//!   data phase then uses the low address byte as the command code.
//! - **Long**: for hosts that cannot issue arbitrary block commands, the
//!   full address travels in-band in the command payload.
//!
//! An optional Packet Error Check byte (CRC-8, polynomial 0x07) is appended
//! to write payloads when enabled.

use crate::error::{Error, Result};
use crate::port::SmbusPort;

/// Largest register transfer a single transaction can carry
pub const TRANSFER_MAX: usize = 16;

/// Extended-command register used by the short framing
const CMD_EXT: u8 = 0x0F;
/// Long framing: read request carrying the in-band address
const CMD_LONG_READ_REQ: u8 = 0x20;
/// Long framing: write carrying the in-band address and payload
const CMD_LONG_WRITE: u8 = 0x21;
/// Long framing: read response data phase
const CMD_LONG_READ_RESP: u8 = 0x22;

/// I2C transaction framing options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Short format transactions (default)
    #[default]
    Short,
    /// Long format transactions with in-band addressing
    Long,
}

/// Compute the SMBus Packet Error Check byte: CRC-8, polynomial 0x07,
/// MSB first, zero init, no final XOR.
pub fn pec_byte(bytes: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &b in bytes {
        crc ^= b;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x07
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// One session's view of a retimer's register space
///
/// Owns the port exclusively; multi-step sequences serialize through the
/// depth-counted bus lock.
pub struct Smbus<P> {
    port: P,
    framing: Framing,
    pec_enable: bool,
    lock_depth: u32,
}

impl<P: SmbusPort> Smbus<P> {
    /// Wrap a port with the given framing and PEC setting
    pub fn new(port: P, framing: Framing, pec_enable: bool) -> Self {
        Self {
            port,
            framing,
            pec_enable,
            lock_depth: 0,
        }
    }

    /// Borrow the underlying port
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Consume the session, returning the port
    pub fn into_port(self) -> P {
        self.port
    }

    /// The framing this session uses
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Take the bus lock. Nested takes are counted; only the outermost one
    /// reaches the port.
    pub fn lock(&mut self) -> Result<()> {
        if self.lock_depth == 0 {
            self.port.lock()?;
        }
        self.lock_depth += 1;
        Ok(())
    }

    /// Release the bus lock taken by `lock`
    pub fn unlock(&mut self) {
        debug_assert!(self.lock_depth > 0);
        if self.lock_depth > 0 {
            self.lock_depth -= 1;
            if self.lock_depth == 0 {
                let _ = self.port.unlock();
            }
        }
    }

    /// Run `f` with the bus lock held, releasing it on every exit path
    pub fn locked<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.lock()?;
        let r = f(self);
        self.unlock();
        r
    }

    /// Sleep for `us` microseconds using the port's pacing hook
    pub fn delay_us(&mut self, us: u64) {
        self.port.delay_us(us);
    }

    /// Write 1..=16 bytes at a 17-bit register address
    pub fn write_block(&mut self, address: u32, values: &[u8]) -> Result<()> {
        check_access(address, values.len())?;
        match self.framing {
            Framing::Short => self.write_short(address, values),
            Framing::Long => self.write_long(address, values),
        }
    }

    /// Write a single byte at a 17-bit register address
    pub fn write_byte(&mut self, address: u32, value: u8) -> Result<()> {
        self.write_block(address, &[value])
    }

    /// Read 1..=16 bytes at a 17-bit register address
    pub fn read_block(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        check_access(address, buf.len())?;
        match self.framing {
            Framing::Short => self.read_short(address, buf),
            Framing::Long => self.read_long(address, buf),
        }
    }

    /// Read a single byte at a 17-bit register address
    pub fn read_byte(&mut self, address: u32) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_block(address, &mut buf)?;
        Ok(buf[0])
    }

    fn write_short(&mut self, address: u32, values: &[u8]) -> Result<()> {
        let ext = ext_command(address, values.len());
        let cmd = (address & 0xFF) as u8;
        self.locked(|bus| {
            bus.block_write_pec(CMD_EXT, &ext)?;
            bus.block_write_pec(cmd, values)
        })
    }

    fn read_short(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        let ext = ext_command(address, buf.len());
        let cmd = (address & 0xFF) as u8;
        self.locked(|bus| {
            bus.block_write_pec(CMD_EXT, &ext)?;
            bus.port.block_read(cmd, buf)
        })
    }

    fn write_long(&mut self, address: u32, values: &[u8]) -> Result<()> {
        let mut payload = [0u8; 4 + TRANSFER_MAX];
        let header = long_header(address, values.len());
        payload[..4].copy_from_slice(&header);
        payload[4..4 + values.len()].copy_from_slice(values);
        self.locked(|bus| bus.block_write_pec(CMD_LONG_WRITE, &payload[..4 + values.len()]))
    }

    fn read_long(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        let header = long_header(address, buf.len());
        self.locked(|bus| {
            bus.block_write_pec(CMD_LONG_READ_REQ, &header)?;
            bus.port.block_read(CMD_LONG_READ_RESP, buf)
        })
    }

    /// Block write with the PEC byte appended when enabled. The CRC covers
    /// the addressed slave (write direction), the command code and the
    /// payload, matching what the device computes on its end.
    fn block_write_pec(&mut self, cmd: u8, data: &[u8]) -> Result<()> {
        if !self.pec_enable {
            return self.port.block_write(cmd, data);
        }
        let mut framed = [0u8; 2 + TRANSFER_MAX + 4];
        framed[0] = self.port.slave_addr() << 1;
        framed[1] = cmd;
        framed[2..2 + data.len()].copy_from_slice(data);
        let crc = pec_byte(&framed[..2 + data.len()]);

        let mut payload = [0u8; TRANSFER_MAX + 5];
        payload[..data.len()].copy_from_slice(data);
        payload[data.len()] = crc;
        self.port.block_write(cmd, &payload[..data.len() + 1])
    }
}

/// Extended-command payload for the short framing: transfer length and the
/// upper address bits.
fn ext_command(address: u32, len: usize) -> [u8; 2] {
    let cfg = (((len - 1) as u8) << 1) | ((address >> 16) as u8 & 1);
    [cfg, (address >> 8) as u8]
}

/// In-band address header for the long framing
fn long_header(address: u32, len: usize) -> [u8; 4] {
    [
        len as u8,
        (address >> 16) as u8 & 1,
        (address >> 8) as u8,
        address as u8,
    ]
}

fn check_access(address: u32, len: usize) -> Result<()> {
    if address >= 1 << 17 || len == 0 || len > TRANSFER_MAX {
        return Err(Error::InvalidArgument);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Journal {
        writes: Vec<(u8, Vec<u8>)>,
        reads: Vec<(u8, usize)>,
        locks: u32,
        unlocks: u32,
    }

    struct JournalPort {
        journal: Rc<RefCell<Journal>>,
        read_data: Vec<u8>,
    }

    impl SmbusPort for JournalPort {
        fn slave_addr(&self) -> u8 {
            0x24
        }
        fn set_slave(&mut self, _addr: u8) -> Result<()> {
            Ok(())
        }
        fn block_write(&mut self, cmd: u8, data: &[u8]) -> Result<()> {
            self.journal.borrow_mut().writes.push((cmd, data.to_vec()));
            Ok(())
        }
        fn block_read(&mut self, cmd: u8, buf: &mut [u8]) -> Result<()> {
            self.journal.borrow_mut().reads.push((cmd, buf.len()));
            for (i, b) in buf.iter_mut().enumerate() {
                *b = self.read_data.get(i).copied().unwrap_or(0);
            }
            Ok(())
        }
        fn lock(&mut self) -> Result<()> {
            self.journal.borrow_mut().locks += 1;
            Ok(())
        }
        fn unlock(&mut self) -> Result<()> {
            self.journal.borrow_mut().unlocks += 1;
            Ok(())
        }
        fn delay_us(&mut self, _us: u64) {}
    }

    fn session(framing: Framing, pec: bool) -> (Smbus<JournalPort>, Rc<RefCell<Journal>>) {
        let journal = Rc::new(RefCell::new(Journal::default()));
        let port = JournalPort {
            journal: journal.clone(),
            read_data: vec![0xAB; 16],
        };
        (Smbus::new(port, framing, pec), journal)
    }

    #[test]
    fn short_write_frames_ext_then_data() {
        let (mut bus, journal) = session(Framing::Short, false);
        bus.write_block(0x1_8C05, &[0x11, 0x22, 0x33]).unwrap();

        let j = journal.borrow();
        assert_eq!(j.writes.len(), 2);
        // cfg = (len-1)<<1 | addr16 = 0b100 | 1
        assert_eq!(j.writes[0], (0x0F, vec![0x05, 0x8C]));
        assert_eq!(j.writes[1], (0x05, vec![0x11, 0x22, 0x33]));
        assert_eq!(j.locks, 1);
        assert_eq!(j.unlocks, 1);
    }

    #[test]
    fn short_read_frames_ext_then_read() {
        let (mut bus, journal) = session(Framing::Short, false);
        let mut buf = [0u8; 2];
        bus.read_block(0x0600, &mut buf).unwrap();

        let j = journal.borrow();
        assert_eq!(j.writes[0], (0x0F, vec![0x02, 0x06]));
        assert_eq!(j.reads[0], (0x00, 2));
        assert_eq!(buf, [0xAB, 0xAB]);
    }

    #[test]
    fn long_write_carries_address_in_band() {
        let (mut bus, journal) = session(Framing::Long, false);
        bus.write_block(0x1_0203, &[0x55]).unwrap();

        let j = journal.borrow();
        assert_eq!(j.writes[0], (CMD_LONG_WRITE, vec![1, 1, 0x02, 0x03, 0x55]));
    }

    #[test]
    fn long_read_is_request_then_response() {
        let (mut bus, journal) = session(Framing::Long, false);
        let mut buf = [0u8; 4];
        bus.read_block(0x0424, &mut buf).unwrap();

        let j = journal.borrow();
        assert_eq!(j.writes[0], (CMD_LONG_READ_REQ, vec![4, 0, 0x04, 0x24]));
        assert_eq!(j.reads[0], (CMD_LONG_READ_RESP, 4));
    }

    #[test]
    fn pec_appends_crc_over_slave_cmd_payload() {
        let (mut bus, journal) = session(Framing::Short, true);
        bus.write_block(0x0600, &[0x00, 0x02]).unwrap();

        let j = journal.borrow();
        let (cmd, data) = &j.writes[1];
        assert_eq!(*cmd, 0x00);
        assert_eq!(data.len(), 3);
        let expected = pec_byte(&[0x24 << 1, 0x00, 0x00, 0x02]);
        assert_eq!(data[2], expected);
    }

    #[test]
    fn pec_byte_matches_known_vector() {
        // CRC-8/SMBus of "123456789"
        assert_eq!(pec_byte(b"123456789"), 0xF4);
    }

    #[test]
    fn pec_of_message_with_its_crc_is_zero() {
        let msg = [0x48u8, 0x0F, 0x02, 0x06, 0x00];
        let crc = pec_byte(&msg);
        let mut framed = msg.to_vec();
        framed.push(crc);
        assert_eq!(pec_byte(&framed), 0);
    }

    #[test]
    fn rejects_out_of_range_access() {
        let (mut bus, _journal) = session(Framing::Short, false);
        assert_eq!(
            bus.write_block(0x2_0000, &[0]),
            Err(Error::InvalidArgument)
        );
        assert_eq!(bus.write_block(0x0, &[0u8; 17]), Err(Error::InvalidArgument));
        let mut empty: [u8; 0] = [];
        assert_eq!(bus.read_block(0x0, &mut empty), Err(Error::InvalidArgument));
    }

    #[test]
    fn nested_locks_reach_port_once() {
        let (mut bus, journal) = session(Framing::Short, false);
        bus.lock().unwrap();
        bus.write_block(0x0600, &[0, 0]).unwrap();
        bus.write_block(0x0602, &[0, 0]).unwrap();
        bus.unlock();

        let j = journal.borrow();
        assert_eq!(j.locks, 1);
        assert_eq!(j.unlocks, 1);
    }
}
