//! FPGA DPRAM staging and per-retimer sequencing
//!
//! On multi-retimer mainboards a satellite FPGA fronts up to eight
//! retimers. The host stages the firmware image in the FPGA's dual-ported
//! RAM, writes the image size and CRC-32, then triggers the FPGA to
//! sequence the EEPROM writes itself, reporting per-retimer status words
//! back through the same window.
//!
//! DPRAM transfers are raw I2C messages (three address bytes plus
//! payload), not the retimer's SMBus command protocol.

use crate::error::{FpgaError, Result};
use crc::{Crc, CRC_32_MPEG_2};
use rtflash_core::image::{EepromImage, EEPROM_SIZE, PAGE_SIZE};
use rtflash_core::update::EepromProgrammer;

/// DPRAM register: image size, 4 bytes little-endian
pub const IMG_SIZE_REG: u32 = 0x04_0000;
/// DPRAM register: image CRC-32, 4 bytes little-endian
pub const CHKSUM_REG: u32 = 0x04_0004;
/// DPRAM register: update trigger and status
pub const UPDATE_STATUS_REG: u32 = 0x04_0008;
/// DPRAM register: read trigger and status
pub const READ_STATUS_REG: u32 = 0x04_000C;

/// Broadcast mask addressing every retimer
pub const ALL_RETIMERS: u8 = 0xFF;
/// Retimers behind one FPGA
pub const RETIMER_COUNT: u8 = 8;

/// Low bit of the read trigger requesting a firmware read
const READ_REQUEST: u8 = 0x01;
/// Mask of the read-status busy bit
const READ_STATUS_MASK: u8 = 0x01;
/// Mask of the read-status NACK bit
const READ_NACK_MASK: u8 = 0x01;

/// Status polls at 1 Hz before an attempt times out
const STATUS_POLL_TRIES: u32 = 60;
/// Pacing between status polls
const STATUS_POLL_US: u64 = 1_000_000;
/// Update attempts, the retries narrowed to still-failing retimers
const UPDATE_ATTEMPTS: u32 = 2;

/// CRC-32 variant the FPGA computes over the staged image
/// (polynomial 0x04C11DB7, init 0xFFFFFFFF, no reflection, no final XOR)
pub const IMAGE_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Raw I2C attachment to the FPGA's DPRAM window
pub trait FpgaBus {
    /// One write message: the bytes go out verbatim
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// A write message followed by a read from the same slave
    fn write_read(&mut self, wbuf: &[u8], rbuf: &mut [u8]) -> Result<()>;

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u64);
}

/// Per-retimer status tuple read back from a trigger register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateStatus {
    /// 0 when the FPGA has finished the whole sequence
    pub verification: u8,
    /// Bit-mask of retimers that NACKed the write
    pub write_nack: u8,
    /// Bit-mask of retimers that NACKed the read-back
    pub read_nack: u8,
    /// Bit-mask of retimers whose post-write checksum mismatched
    pub checksum: u8,
}

impl UpdateStatus {
    fn from_word(word: [u8; 4]) -> Self {
        Self {
            verification: word[0],
            write_nack: word[1],
            read_nack: word[2],
            checksum: word[3],
        }
    }

    /// Union of the per-class failure masks
    pub fn failing_mask(&self) -> u8 {
        self.write_nack | self.read_nack | self.checksum
    }

    /// Restrict the per-retimer outcome bits to the triggered mask
    pub fn masked(&self, mask: u8) -> Self {
        Self {
            verification: self.verification,
            write_nack: self.write_nack & mask,
            read_nack: self.read_nack & mask,
            checksum: self.checksum & mask,
        }
    }
}

/// Driver for one FPGA's staging window
pub struct FpgaBridge<B: FpgaBus> {
    bus: B,
    /// Retimers addressed by `EepromProgrammer::program`
    pub target_mask: u8,
}

impl<B: FpgaBus> FpgaBridge<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            target_mask: ALL_RETIMERS,
        }
    }

    /// Borrow the underlying bus
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    fn write_dpram(&mut self, address: u32, payload: &[u8]) -> Result<()> {
        let mut buf = Vec::with_capacity(3 + payload.len());
        buf.push((address >> 16) as u8);
        buf.push((address >> 8) as u8);
        buf.push(address as u8);
        buf.extend_from_slice(payload);
        self.bus.write(&buf)
    }

    fn read_dpram(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        let addr = [(address >> 16) as u8, (address >> 8) as u8, address as u8];
        self.bus.write_read(&addr, buf)
    }

    fn read_status_word(&mut self, reg: u32) -> Result<[u8; 4]> {
        let mut word = [0u8; 4];
        self.read_dpram(reg, &mut word)?;
        Ok(word)
    }

    /// Copy the image into DPRAM in 256-byte pages and publish its size
    /// and CRC-32. Returns the computed CRC.
    pub fn stage_image(&mut self, image: &[u8]) -> Result<u32> {
        if image.is_empty() || image.len() > EEPROM_SIZE {
            return Err(FpgaError::InvalidArgument(format!(
                "image size {} exceeds the staging area",
                image.len()
            )));
        }
        let crc = IMAGE_CRC.checksum(image);
        log::info!("staging {} bytes, crc32 0x{:08x}", image.len(), crc);

        for (page, chunk) in image.chunks(PAGE_SIZE).enumerate() {
            self.write_dpram((page * PAGE_SIZE) as u32, chunk)?;
        }
        self.write_dpram(IMG_SIZE_REG, &(image.len() as u32).to_le_bytes())?;
        self.write_dpram(CHKSUM_REG, &crc.to_le_bytes())?;

        // read both back so a mis-staged length is caught before triggering
        let size_back = self.read_status_word(IMG_SIZE_REG)?;
        let crc_back = self.read_status_word(CHKSUM_REG)?;
        if u32::from_le_bytes(size_back) != image.len() as u32
            || u32::from_le_bytes(crc_back) != crc
        {
            return Err(FpgaError::InvalidArgument(
                "staging readback mismatch".into(),
            ));
        }
        Ok(crc)
    }

    /// Trigger an EEPROM update for the retimers in `mask` and poll it to
    /// completion. Failed retimers are retried once, with the trigger
    /// narrowed to the still-failing set.
    pub fn trigger_update(&mut self, mask: u8) -> Result<()> {
        if mask == 0 {
            return Err(FpgaError::InvalidArgument("empty retimer mask".into()));
        }
        let mut current_mask = mask;
        let mut last_status = UpdateStatus::from_word([0xFF; 4]);

        for attempt in 0..UPDATE_ATTEMPTS {
            log::info!(
                "triggering firmware update, mask 0x{:02x} (attempt {})",
                current_mask,
                attempt + 1
            );
            self.write_dpram(UPDATE_STATUS_REG, &[current_mask, 0, 0, 0])?;

            let mut word = [0xFFu8; 4];
            for _ in 0..STATUS_POLL_TRIES {
                self.bus.delay_us(STATUS_POLL_US);
                word = self.read_status_word(UPDATE_STATUS_REG)?;
                log::debug!(
                    "update status: {:02x} {:02x} {:02x} {:02x}",
                    word[0],
                    word[1],
                    word[2],
                    word[3]
                );
                if word[0] == 0 {
                    break;
                }
            }
            let status = UpdateStatus::from_word(word).masked(current_mask);

            if status.verification == 0 {
                if attempt > 0 {
                    log::info!(
                        "update completed after retry of retimer(s) 0x{:02x}",
                        current_mask
                    );
                }
                return Ok(());
            }

            let failing = status.failing_mask();
            log::error!(
                "update incomplete: write_nack 0x{:02x} read_nack 0x{:02x} checksum 0x{:02x}",
                status.write_nack,
                status.read_nack,
                status.checksum
            );
            last_status = status;
            if failing == 0 {
                // busy past the poll budget with no per-retimer cause
                return Err(FpgaError::Timeout);
            }
            current_mask = failing;
        }

        if last_status.checksum != 0 {
            Err(FpgaError::Checksum(last_status.checksum))
        } else if last_status.read_nack != 0 {
            Err(FpgaError::ReadNack(last_status.read_nack))
        } else {
            Err(FpgaError::WriteNack(last_status.write_nack))
        }
    }

    /// Ask the FPGA to read one retimer's EEPROM back into DPRAM
    pub fn trigger_read(&mut self, retimer: u8) -> Result<()> {
        if retimer >= RETIMER_COUNT {
            return Err(FpgaError::InvalidArgument(format!(
                "retimer index {} out of range",
                retimer
            )));
        }
        for attempt in 0..UPDATE_ATTEMPTS {
            log::info!("triggering read of retimer {} (attempt {})", retimer, attempt + 1);
            let trigger = (retimer << 4) | READ_REQUEST;
            self.write_dpram(READ_STATUS_REG, &[trigger, 0, 0, 0])?;

            let mut word = [0xFFu8; 4];
            for _ in 0..STATUS_POLL_TRIES {
                self.bus.delay_us(STATUS_POLL_US);
                word = self.read_status_word(READ_STATUS_REG)?;
                if word[0] & READ_STATUS_MASK == 0 {
                    break;
                }
            }
            if word[0] & READ_STATUS_MASK != 0 {
                log::error!("read still pending for retimer {}", retimer);
                return Err(FpgaError::Timeout);
            }
            if word[1] & READ_NACK_MASK != 0 {
                log::error!("read NACK from retimer {}", retimer);
                continue;
            }
            return Ok(());
        }
        Err(FpgaError::ReadNack(1 << retimer))
    }

    /// Copy the staged image bytes back out of DPRAM
    pub fn drain_image(&mut self) -> Result<EepromImage> {
        let mut image = EepromImage::new();
        for page in 0..EEPROM_SIZE / PAGE_SIZE {
            let at = page * PAGE_SIZE;
            self.read_dpram(at as u32, &mut image.as_mut_slice()[at..at + PAGE_SIZE])?;
        }
        Ok(image)
    }
}

impl<B: FpgaBus> EepromProgrammer for FpgaBridge<B> {
    fn program(&mut self, image: &EepromImage) -> rtflash_core::Result<()> {
        let mask = self.target_mask;
        let staged = (|| {
            self.stage_image(image.as_slice())?;
            self.trigger_update(mask)
        })();
        staged.map_err(|e| {
            log::error!("FPGA update failed: {}", e);
            match e {
                FpgaError::Checksum(_) | FpgaError::ReadNack(_) => {
                    rtflash_core::Error::EepromVerify
                }
                FpgaError::WriteNack(_) => rtflash_core::Error::EepromWrite,
                FpgaError::Io(_) => rtflash_core::Error::Transport(0),
                FpgaError::Core(e) => e,
                _ => rtflash_core::Error::EepromWrite,
            }
        })
    }

    fn read_back(&mut self) -> rtflash_core::Result<EepromImage> {
        let retimer = self.target_mask.trailing_zeros().min(7) as u8;
        let zero = vec![0u8; EEPROM_SIZE];
        let drained = (|| {
            self.stage_image(&zero)?;
            self.trigger_read(retimer)?;
            self.drain_image()
        })();
        drained.map_err(|e| {
            log::error!("FPGA read-back failed: {}", e);
            rtflash_core::Error::EepromVerify
        })
    }
}
