//! Emulated FPGA staging window used by the crate's tests

use crate::bridge::{FpgaBus, CHKSUM_REG, IMG_SIZE_REG, READ_STATUS_REG, UPDATE_STATUS_REG};
use crate::error::Result;
use rtflash_core::image::EEPROM_SIZE;
use std::collections::{HashMap, VecDeque};

pub struct MockFpga {
    /// Staged image bytes
    pub dpram: Vec<u8>,
    /// The four-byte control registers above the staging area
    regs: HashMap<u32, [u8; 4]>,
    /// Status words returned for successive update triggers; empty means
    /// a clean completion
    pub update_responses: VecDeque<[u8; 4]>,
    current_update: [u8; 4],
    /// Status words returned for successive read triggers
    pub read_responses: VecDeque<[u8; 4]>,
    current_read: [u8; 4],
    /// Masks written to the update trigger, in order
    pub update_triggers: Vec<u8>,
    /// Bytes written to the read trigger, in order
    pub read_triggers: Vec<u8>,
    /// Firmware images the emulated retimers hold
    pub retimer_images: HashMap<u8, Vec<u8>>,
}

impl Default for MockFpga {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFpga {
    pub fn new() -> Self {
        Self {
            dpram: vec![0; EEPROM_SIZE],
            regs: HashMap::new(),
            update_responses: VecDeque::new(),
            current_update: [0; 4],
            read_responses: VecDeque::new(),
            current_read: [0; 4],
            update_triggers: Vec::new(),
            read_triggers: Vec::new(),
            retimer_images: HashMap::new(),
        }
    }

    pub fn reg(&self, address: u32) -> [u8; 4] {
        *self.regs.get(&address).unwrap_or(&[0; 4])
    }

    fn decode_addr(buf: &[u8]) -> u32 {
        (u32::from(buf[0]) << 16) | (u32::from(buf[1]) << 8) | u32::from(buf[2])
    }
}

impl FpgaBus for MockFpga {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let address = Self::decode_addr(data);
        let payload = &data[3..];
        match address {
            UPDATE_STATUS_REG => {
                self.update_triggers.push(payload[0]);
                self.current_update = self.update_responses.pop_front().unwrap_or([0; 4]);
            }
            READ_STATUS_REG => {
                self.read_triggers.push(payload[0]);
                if payload[0] & 1 != 0 {
                    let retimer = payload[0] >> 4;
                    if let Some(image) = self.retimer_images.get(&retimer) {
                        let n = image.len().min(self.dpram.len());
                        self.dpram[..n].copy_from_slice(&image[..n]);
                    }
                }
                self.current_read = self.read_responses.pop_front().unwrap_or([0; 4]);
            }
            IMG_SIZE_REG | CHKSUM_REG => {
                let mut word = [0u8; 4];
                word[..payload.len().min(4)].copy_from_slice(&payload[..payload.len().min(4)]);
                self.regs.insert(address, word);
            }
            _ => {
                let at = address as usize;
                self.dpram[at..at + payload.len()].copy_from_slice(payload);
            }
        }
        Ok(())
    }

    fn write_read(&mut self, wbuf: &[u8], rbuf: &mut [u8]) -> Result<()> {
        let address = Self::decode_addr(wbuf);
        match address {
            UPDATE_STATUS_REG => {
                rbuf.copy_from_slice(&self.current_update[..rbuf.len()]);
            }
            READ_STATUS_REG => {
                rbuf.copy_from_slice(&self.current_read[..rbuf.len()]);
            }
            IMG_SIZE_REG | CHKSUM_REG => {
                rbuf.copy_from_slice(&self.reg(address)[..rbuf.len()]);
            }
            _ => {
                let at = address as usize;
                rbuf.copy_from_slice(&self.dpram[at..at + rbuf.len()]);
            }
        }
        Ok(())
    }

    fn delay_us(&mut self, _us: u64) {}
}
