//! Linux i2c-dev attachment to the FPGA
//!
//! DPRAM traffic is raw I2C messaging (`I2C_RDWR`), not SMBus block
//! commands: a write message carries three address bytes plus up to a full
//! 256-byte page, and reads are a write/read message pair.

use crate::bridge::FpgaBus;
use crate::error::{FpgaError, Result};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;

/// I2C slave address of the FPGA's staging controller
pub const FPGA_SLAVE: u8 = 0x62;

const I2C_RDWR: libc::c_ulong = 0x0707;
const I2C_M_RD: u16 = 0x0001;

/// Must match the kernel's `struct i2c_msg`
#[repr(C)]
struct I2cMsg {
    addr: u16,
    flags: u16,
    len: u16,
    buf: *mut u8,
}

/// Must match the kernel's `struct i2c_rdwr_ioctl_data`
#[repr(C)]
struct I2cRdwrIoctlData {
    msgs: *mut I2cMsg,
    nmsgs: u32,
}

/// Raw I2C master handle used for DPRAM transfers
pub struct LinuxFpgaBus {
    file: File,
    slave: u8,
}

impl LinuxFpgaBus {
    /// Open `/dev/i2c-N` for raw messaging with `slave`
    pub fn open(bus: u32, slave: u8) -> Result<Self> {
        let path = format!("/dev/i2c-{}", bus);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(FpgaError::Io)?;
        log::debug!("fpga: opened {} (slave 0x{:02x})", path, slave);
        Ok(Self { file, slave })
    }

    /// One combined write(+read) transaction
    pub fn transfer(&mut self, wbuf: &[u8], rbuf: &mut [u8]) -> Result<()> {
        let mut msgs = [
            I2cMsg {
                addr: self.slave as u16,
                flags: 0,
                len: wbuf.len() as u16,
                buf: wbuf.as_ptr() as *mut u8,
            },
            I2cMsg {
                addr: self.slave as u16,
                flags: I2C_M_RD,
                len: rbuf.len() as u16,
                buf: rbuf.as_mut_ptr(),
            },
        ];
        let nmsgs = if rbuf.is_empty() { 1 } else { 2 };
        let mut args = I2cRdwrIoctlData {
            msgs: msgs.as_mut_ptr(),
            nmsgs,
        };
        let r = unsafe { libc::ioctl(self.file.as_raw_fd(), I2C_RDWR, &mut args) };
        if r < 0 {
            return Err(FpgaError::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl FpgaBus for LinuxFpgaBus {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.transfer(data, &mut [])
    }

    fn write_read(&mut self, wbuf: &[u8], rbuf: &mut [u8]) -> Result<()> {
        self.transfer(wbuf, rbuf)
    }

    fn delay_us(&mut self, us: u64) {
        std::thread::sleep(std::time::Duration::from_micros(us));
    }
}
