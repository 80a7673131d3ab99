//! Emulated retimer used by the crate's tests
//!
//! Implements `SmbusPort` by decoding the short framing and modeling just
//! enough device behavior for the driver paths under test: the register
//! file, the on-chip I2C master with its EEPROM, the micro-indirect
//! windows, the EEPROM-assist mailbox, the PMA window and the eFuse.

use crate::device::{Device, PartKind};
use crate::error::{Error, Result};
use crate::image::{
    EepromImage, BANK_SIZE, BLOCK_HEADER_LEN, BLOCK_SIGNATURE, BLOCK_TYPE_END, EEPROM_SIZE,
    TERMINATOR,
};
use crate::micro;
use crate::port::SmbusPort;
use crate::regs;
use crate::smbus::{Framing, Smbus};
use std::collections::{HashMap, HashSet};

/// Build an initialized device over a fresh mock advertising the given
/// firmware version
pub fn device_with_fw(major: u8, minor: u8, build: u16) -> Device<MockRetimer> {
    let mut mock = MockRetimer::new();
    mock.set_fw_version(major, minor, build);
    mock.set_reg(regs::CODE_LOAD, 0xE);
    let bus = Smbus::new(mock, Framing::Short, false);
    let mut device = Device::new(bus, PartKind::X16);
    device.init().expect("mock device init");
    device
}

/// Build an initialized device whose main micro shows no heartbeat
pub fn device_without_heartbeat() -> Device<MockRetimer> {
    let mut mock = MockRetimer::new();
    mock.heartbeat_alive = false;
    mock.set_reg(regs::CODE_LOAD, 0x0);
    let bus = Smbus::new(mock, Framing::Short, false);
    let mut device = Device::new(bus, PartKind::X16);
    device.init().expect("mock device init");
    device
}

/// Write a minimal valid block chain plus terminator at the image start.
/// Returns the per-block CRC bytes in order.
pub fn build_block_chain(image: &mut EepromImage, bodies: &[&[u8]]) -> Vec<u8> {
    let data = image.as_mut_slice();
    let mut at = 0usize;
    let mut crcs = Vec::new();
    for (i, body) in bodies.iter().enumerate() {
        data[at..at + 4].copy_from_slice(&BLOCK_SIGNATURE);
        data[at + 4] = i as u8 + 1;
        data[at + 5..at + 7].copy_from_slice(&(body.len() as u16).to_le_bytes());
        data[at + 7..at + 13].fill(0);
        data[at + 13..at + 13 + body.len()].copy_from_slice(body);
        let crc = body.iter().fold(0x5Au8, |c, b| c.wrapping_add(*b));
        data[at + 13 + body.len()] = crc;
        crcs.push(crc);
        at += BLOCK_HEADER_LEN + body.len() + 1;
    }
    // end-of-image block header, then the terminator
    data[at..at + 4].copy_from_slice(&BLOCK_SIGNATURE);
    data[at + 4] = BLOCK_TYPE_END;
    at += 5;
    data[at..at + TERMINATOR.len()].copy_from_slice(&TERMINATOR);
    crcs
}

/// EEPROM write-transaction state of the emulated I2C master
#[derive(Debug, Clone, Copy, PartialEq)]
enum WrState {
    Idle,
    GotHi(u8),
    Data,
}

pub struct MockRetimer {
    /// Register file; unset registers read 0
    regs: HashMap<u32, u8>,
    /// Pending short-framing extended command: (upper address bits, length)
    pending_ext: Option<(u32, usize)>,

    /// EEPROM behind the on-chip I2C master
    pub eeprom: Vec<u8>,
    /// I2C master CSRs, keyed by IP-internal offset
    ic_csr: HashMap<u8, [u8; 4]>,
    /// Last CSR offset written to the IC command selector
    ic_sel: u8,
    wr_state: WrState,
    /// EEPROM stream pointer (includes the page bits)
    ptr: usize,

    /// Main-micro SRAM
    pub mm_sram: Vec<u8>,
    /// Path-micro SRAMs
    pub pm_sram: Vec<Vec<u8>>,
    /// PMA CSRs keyed by (side, quad, address)
    pub pma: HashMap<(u8, u8, u16), u16>,
    /// eFuse contents
    pub efuse: Vec<u8>,

    /// Whether the heartbeat counter advances on reads
    pub heartbeat_alive: bool,
    heartbeat: u8,

    /// Number of polls a self-clearing command stays busy before clearing
    pub busy_polls: u32,
    busy_remaining: HashMap<u32, u32>,

    /// Fail every port operation once this countdown reaches zero
    pub fail_after: Option<usize>,
    /// EEPROM addresses that silently refuse programming
    pub stuck_bytes: HashSet<usize>,
    /// EEPROM addresses that refuse a number of programming attempts
    /// before recovering
    pub flaky_bytes: HashMap<usize, u32>,

    /// Writes applied to the reset registers, in order
    pub reset_writes: Vec<(u32, u8)>,
    /// Pages announced through the master's target-address CSR
    pub pages_selected: Vec<u8>,
    /// Count of EEPROM bytes programmed
    pub eeprom_bytes_written: usize,
}

impl Default for MockRetimer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRetimer {
    pub fn new() -> Self {
        Self {
            regs: HashMap::new(),
            pending_ext: None,
            eeprom: vec![0xFF; EEPROM_SIZE],
            ic_csr: HashMap::new(),
            ic_sel: 0,
            wr_state: WrState::Idle,
            ptr: 0,
            mm_sram: vec![0; 0x1_0000],
            pm_sram: vec![vec![0; 0x4000]; 16],
            pma: HashMap::new(),
            efuse: vec![0; 128],
            heartbeat_alive: true,
            heartbeat: 0,
            busy_polls: 0,
            busy_remaining: HashMap::new(),
            fail_after: None,
            stuck_bytes: HashSet::new(),
            flaky_bytes: HashMap::new(),
            reset_writes: Vec::new(),
            pages_selected: Vec::new(),
            eeprom_bytes_written: 0,
        }
    }

    /// Set the advertised firmware version in main-micro SRAM
    pub fn set_fw_version(&mut self, major: u8, minor: u8, build: u16) {
        let base = regs::MM_FW_INFO as usize;
        self.mm_sram[base + regs::MM_FW_VERSION_MAJOR as usize] = major;
        self.mm_sram[base + regs::MM_FW_VERSION_MINOR as usize] = minor;
        let b = build.to_le_bytes();
        self.mm_sram[base + regs::MM_FW_VERSION_BUILD as usize] = b[0];
        self.mm_sram[base + regs::MM_FW_VERSION_BUILD as usize + 1] = b[1];
        // firmware that publishes the link-path struct size reports 38
        self.mm_sram[regs::MM_LINK_PATH_STRUCT_SIZE as usize] = 38;
    }

    pub fn reg(&self, address: u32) -> u8 {
        *self.regs.get(&address).unwrap_or(&0)
    }

    pub fn set_reg(&mut self, address: u32, value: u8) {
        self.regs.insert(address, value);
    }

    fn current_page(&self) -> usize {
        (self.ic_csr.get(&regs::IC_TAR).map_or(0x50, |v| v[0]) & 3) as usize
    }

    fn check_fault(&mut self) -> Result<()> {
        if let Some(n) = self.fail_after {
            if n == 0 {
                return Err(Error::Transport(5));
            }
            self.fail_after = Some(n - 1);
        }
        Ok(())
    }

    fn program_eeprom(&mut self, at: usize, value: u8) {
        let at = at % EEPROM_SIZE;
        self.eeprom_bytes_written += 1;
        if self.stuck_bytes.contains(&at) {
            return;
        }
        if let Some(left) = self.flaky_bytes.get_mut(&at) {
            if *left > 0 {
                *left -= 1;
                return;
            }
        }
        self.eeprom[at] = value;
    }

    fn write_reg(&mut self, address: u32, value: u8) {
        if (regs::HW_RST..=regs::SW_RST + 1).contains(&address) {
            self.reset_writes.push((address, value));
        }
        self.regs.insert(address, value);
        match address {
            regs::I2C_MST_IC_CMD => self.ic_sel = value,
            regs::I2C_MST_CMD => {
                if value == 1 {
                    self.master_command();
                }
            }
            regs::MM_EEPROM_ASSIST_CMD => self.assist_command(value),
            regs::MM_IND_CMD => self.micro_command(address, value, MicroKind::Main),
            regs::PMA_CMD => self.pma_command(value),
            _ => {
                if let Some(path) = self.path_for_cmd_reg(address) {
                    self.micro_command(address, value, MicroKind::Path(path));
                }
            }
        }
    }

    fn read_reg(&mut self, address: u32) -> u8 {
        if address == regs::MM_HEARTBEAT {
            if self.heartbeat_alive {
                self.heartbeat = self.heartbeat.wrapping_add(1);
            }
            return self.heartbeat;
        }
        if address == regs::EFUSE_DATA {
            let sel = self.reg(regs::EFUSE_ADDR) as usize;
            return self.efuse.get(sel).copied().unwrap_or(0);
        }
        // self-clearing command registers hold their value for busy_polls reads
        if let Some(left) = self.busy_remaining.get_mut(&address) {
            if *left > 0 {
                *left -= 1;
                return self.reg(address);
            }
            self.busy_remaining.remove(&address);
            self.regs.insert(address, 0);
            return 0;
        }
        self.reg(address)
    }

    fn path_for_cmd_reg(&self, address: u32) -> Option<u8> {
        for path in 0..micro::PATH_MICRO_COUNT {
            let base = regs::PM_IND_BASE + u32::from(path) * regs::PM_IND_STRIDE;
            if address == base + 10 {
                return Some(path);
            }
        }
        None
    }

    /// A self-clearing command register: either clears immediately or after
    /// `busy_polls` reads.
    fn settle_command(&mut self, cmd_reg: u32) {
        if self.busy_polls == 0 {
            self.regs.insert(cmd_reg, 0);
        } else {
            self.busy_remaining.insert(cmd_reg, self.busy_polls);
        }
    }

    /// Byte-level I2C master operation staged through IC_DATA_CMD
    fn master_command(&mut self) {
        if self.ic_sel != regs::IC_DATA_CMD {
            // plain CSR write: commit the four staged data bytes
            let staged = [
                self.reg(regs::I2C_MST_DATA0),
                self.reg(regs::I2C_MST_DATA1),
                self.reg(regs::I2C_MST_DATA2),
                self.reg(regs::I2C_MST_DATA3),
            ];
            if self.ic_sel == regs::IC_TAR {
                self.pages_selected.push(staged[0] & 3);
            }
            self.ic_csr.insert(self.ic_sel, staged);
            return;
        }
        let data0 = self.reg(regs::I2C_MST_DATA0);
        let flag = self.reg(regs::I2C_MST_DATA1);
        match flag {
            // read with stop: fetch at the stream pointer
            3 => {
                let b = self.eeprom[self.ptr % EEPROM_SIZE];
                self.regs.insert(regs::I2C_MST_DATA0, b);
                self.ptr += 1;
                self.wr_state = WrState::Idle;
            }
            // start + high address byte
            4 => self.wr_state = WrState::GotHi(data0),
            // continue (0) or final byte (2)
            0 | 2 => {
                match self.wr_state {
                    WrState::Idle => self.wr_state = WrState::GotHi(data0),
                    WrState::GotHi(hi) => {
                        let page = self.current_page();
                        self.ptr = page * BANK_SIZE + ((hi as usize) << 8) + data0 as usize;
                        self.wr_state = WrState::Data;
                    }
                    WrState::Data => {
                        self.program_eeprom(self.ptr, data0);
                        self.ptr += 1;
                    }
                }
                if flag == 2 && self.wr_state == WrState::Data {
                    // a write may end right after the address phase
                    self.wr_state = WrState::Idle;
                }
            }
            _ => {}
        }
    }

    /// EEPROM-assist mailbox serviced by the emulated main micro
    fn assist_command(&mut self, cmd: u8) {
        let mailbox: Vec<u8> = (0..16)
            .map(|i| self.reg(regs::MM_EEPROM_ASSIST_DATA + i))
            .collect();
        match cmd {
            regs::ASSIST_CMD_WRITE | regs::ASSIST_CMD_WRITE_END => {
                for (i, b) in mailbox.iter().enumerate() {
                    self.program_eeprom(self.ptr + i, *b);
                }
                self.ptr += 16;
                if cmd == regs::ASSIST_CMD_WRITE_END {
                    self.wr_state = WrState::Idle;
                }
            }
            regs::ASSIST_CMD_READ | regs::ASSIST_CMD_READ_CONT => {
                for i in 0..16u32 {
                    let b = self.eeprom[(self.ptr + i as usize) % EEPROM_SIZE];
                    self.regs.insert(regs::MM_EEPROM_ASSIST_DATA + i, b);
                }
                self.ptr += 16;
                self.wr_state = WrState::Idle;
            }
            regs::ASSIST_CMD_CHECKSUM | regs::ASSIST_CMD_CHECKSUM_PARTIAL => {
                let bank = self.current_page();
                let limit = if cmd == regs::ASSIST_CMD_CHECKSUM_PARTIAL {
                    u16::from_le_bytes([mailbox[0], mailbox[1]]) as usize
                } else {
                    BANK_SIZE
                };
                let start = bank * BANK_SIZE;
                let sum: u32 = self.eeprom[start..start + limit.min(BANK_SIZE)]
                    .iter()
                    .fold(0u32, |s, &b| s.wrapping_add(b as u32));
                for (i, b) in sum.to_le_bytes().iter().enumerate() {
                    self.regs.insert(regs::MM_EEPROM_ASSIST_DATA + i as u32, *b);
                }
            }
            _ => {}
        }
        self.settle_command(regs::MM_EEPROM_ASSIST_CMD);
    }

    fn micro_command(&mut self, cmd_reg: u32, cmd: u8, kind: MicroKind) {
        let window_base = cmd_reg - 10;
        let addr = (self.reg(window_base) as usize) | ((self.reg(window_base + 1) as usize) << 8);
        let data_base = window_base + 2;
        let op = cmd & 0xF;
        let len = (cmd >> 4) as usize;
        match op {
            0x1 | 0x2 => {
                for i in 0..len.max(1) {
                    let b = self.sram(kind, addr + i);
                    self.regs.insert(data_base + i as u32, b);
                }
            }
            0x3 | 0x4 => {
                for i in 0..len.max(1) {
                    let b = self.reg(data_base + i as u32);
                    self.set_sram(kind, addr + i, b);
                }
            }
            micro::OP_PMA_READ => {
                let side = self.reg(data_base) >> 4;
                let quad = self.reg(data_base) & 0xF;
                let a = u16::from_le_bytes([self.reg(data_base + 2), self.reg(data_base + 3)]);
                let v = *self.pma.get(&(side, quad, a)).unwrap_or(&0);
                self.regs.insert(data_base + 4, v as u8);
                self.regs.insert(data_base + 5, (v >> 8) as u8);
            }
            micro::OP_PMA_WRITE => {
                let side = self.reg(data_base) >> 4;
                let quad = self.reg(data_base) & 0xF;
                let a = u16::from_le_bytes([self.reg(data_base + 2), self.reg(data_base + 3)]);
                let v = u16::from_le_bytes([self.reg(data_base + 4), self.reg(data_base + 5)]);
                self.pma.insert((side, quad, a), v);
            }
            _ => {}
        }
        self.settle_command(cmd_reg);
    }

    fn pma_command(&mut self, cmd: u8) {
        let side = self.reg(regs::PMA_SEL) >> 4;
        let quad = self.reg(regs::PMA_SEL) & 0xF;
        let addr = u16::from_le_bytes([self.reg(regs::PMA_ADDR_LO), self.reg(regs::PMA_ADDR_HI)]);
        match cmd {
            1 => {
                let v = *self.pma.get(&(side, quad, addr)).unwrap_or(&0);
                self.regs.insert(regs::PMA_DATA_LO, v as u8);
                self.regs.insert(regs::PMA_DATA_HI, (v >> 8) as u8);
            }
            2 => {
                let v = u16::from_le_bytes([
                    self.reg(regs::PMA_DATA_LO),
                    self.reg(regs::PMA_DATA_HI),
                ]);
                self.pma.insert((side, quad, addr), v);
            }
            _ => {}
        }
        self.settle_command(regs::PMA_CMD);
    }

    fn sram(&self, kind: MicroKind, addr: usize) -> u8 {
        match kind {
            MicroKind::Main => self.mm_sram.get(addr).copied().unwrap_or(0),
            MicroKind::Path(p) => self.pm_sram[p as usize].get(addr).copied().unwrap_or(0),
        }
    }

    fn set_sram(&mut self, kind: MicroKind, addr: usize, value: u8) {
        match kind {
            MicroKind::Main => {
                if addr < self.mm_sram.len() {
                    self.mm_sram[addr] = value;
                }
            }
            MicroKind::Path(p) => {
                if addr < self.pm_sram[p as usize].len() {
                    self.pm_sram[p as usize][addr] = value;
                }
            }
        }
    }
}

#[derive(Clone, Copy)]
enum MicroKind {
    Main,
    Path(u8),
}

impl SmbusPort for MockRetimer {
    fn slave_addr(&self) -> u8 {
        0x24
    }

    fn set_slave(&mut self, _addr: u8) -> Result<()> {
        Ok(())
    }

    fn block_write(&mut self, cmd: u8, data: &[u8]) -> Result<()> {
        self.check_fault()?;
        if cmd == 0x0F && data.len() == 2 {
            let len = ((data[0] >> 1) as usize) + 1;
            let upper = (((data[0] & 1) as u32) << 16) | ((data[1] as u32) << 8);
            self.pending_ext = Some((upper, len));
            return Ok(());
        }
        let (upper, len) = self.pending_ext.take().ok_or(Error::Transport(22))?;
        if data.len() != len {
            return Err(Error::Transport(22));
        }
        let base = upper | cmd as u32;
        for (i, b) in data.iter().enumerate() {
            self.write_reg(base + i as u32, *b);
        }
        Ok(())
    }

    fn block_read(&mut self, cmd: u8, buf: &mut [u8]) -> Result<()> {
        self.check_fault()?;
        let (upper, len) = self.pending_ext.take().ok_or(Error::Transport(22))?;
        if buf.len() != len {
            return Err(Error::Transport(22));
        }
        let base = upper | cmd as u32;
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.read_reg(base + i as u32);
        }
        Ok(())
    }

    fn lock(&mut self) -> Result<()> {
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        Ok(())
    }

    fn delay_us(&mut self, _us: u64) {}
}
