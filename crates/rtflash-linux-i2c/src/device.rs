//! Linux i2c-dev port implementation
//!
//! Implements the core `SmbusPort` trait on top of the kernel's
//! `/dev/i2c-N` character devices, using SMBus I2C-block transfers through
//! the `I2C_SMBUS` ioctl and an advisory write lock on the device file to
//! serialize sessions.

use crate::error::{LinuxI2cError, Result};

use rtflash_core::error::{Error as CoreError, Result as CoreResult};
use rtflash_core::port::{SmbusPort, BLOCK_MAX};

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;

/// Attempts to take the bus-file lock before giving up
const LOCK_RETRIES: u32 = 100;
/// Back-off between lock attempts
const LOCK_RETRY_DELAY_US: u64 = 1_000;

/// Linux i2c-dev ioctl constants
mod ioctl {
    use nix::ioctl_write_int_bad;

    /// Latch the 7-bit slave address for subsequent transfers
    ioctl_write_int_bad!(i2c_set_slave, 0x0703);

    /// SMBus-level transfer
    pub const I2C_SMBUS: libc::c_ulong = 0x0720;

    pub const I2C_SMBUS_READ: u8 = 1;
    pub const I2C_SMBUS_WRITE: u8 = 0;
    /// Transaction type: I2C block data (no SMBus count byte on the wire)
    pub const I2C_SMBUS_I2C_BLOCK_DATA: u32 = 8;

    /// Data union of the kernel's `i2c_smbus_ioctl_data`: block[0] is the
    /// length, block[1..] the payload
    #[repr(C)]
    pub union I2cSmbusData {
        pub byte: u8,
        pub word: u16,
        pub block: [u8; 34],
    }

    /// Argument to the I2C_SMBUS ioctl; must match the kernel layout
    #[repr(C)]
    pub struct I2cSmbusIoctlData {
        pub read_write: u8,
        pub command: u8,
        pub size: u32,
        pub data: *mut I2cSmbusData,
    }
}

/// One retimer's bus attachment through Linux i2c-dev
pub struct LinuxI2c {
    file: File,
    slave: u8,
    /// Held while a multi-step sequence owns the bus
    locked: bool,
}

impl LinuxI2c {
    /// Open bus `bus` and latch `slave`. Tries `/dev/i2c/N` first, then
    /// `/dev/i2c-N`.
    pub fn open(bus: u32, slave: u8) -> Result<Self> {
        let candidates = [format!("/dev/i2c/{}", bus), format!("/dev/i2c-{}", bus)];
        let mut last_err = None;
        for path in &candidates {
            match OpenOptions::new().read(true).write(true).open(path) {
                Ok(file) => {
                    log::debug!("linux_i2c: opened {}", path);
                    let mut port = Self {
                        file,
                        slave,
                        locked: false,
                    };
                    port.latch_slave(slave).map_err(|e| {
                        LinuxI2cError::SetSlaveFailed {
                            addr: slave,
                            source: std::io::Error::from_raw_os_error(errno_of(&e)),
                        }
                    })?;
                    return Ok(port);
                }
                Err(e) => last_err = Some((path.clone(), e)),
            }
        }
        let (path, source) = last_err.expect("candidate list is non-empty");
        Err(LinuxI2cError::OpenFailed { path, source })
    }

    fn latch_slave(&mut self, addr: u8) -> CoreResult<()> {
        let fd = self.file.as_raw_fd();
        unsafe { ioctl::i2c_set_slave(fd, addr as i32) }
            .map_err(|e| CoreError::Transport(e as i32))?;
        Ok(())
    }

    fn smbus_transfer(&mut self, read: bool, cmd: u8, buf: &mut [u8]) -> CoreResult<()> {
        debug_assert!(!buf.is_empty() && buf.len() <= BLOCK_MAX);
        let mut data = ioctl::I2cSmbusData { block: [0; 34] };
        unsafe {
            data.block[0] = buf.len() as u8;
            if !read {
                data.block[1..1 + buf.len()].copy_from_slice(buf);
            }
        }
        let mut args = ioctl::I2cSmbusIoctlData {
            read_write: if read {
                ioctl::I2C_SMBUS_READ
            } else {
                ioctl::I2C_SMBUS_WRITE
            },
            command: cmd,
            size: ioctl::I2C_SMBUS_I2C_BLOCK_DATA,
            data: &mut data,
        };

        let fd = self.file.as_raw_fd();
        let r = unsafe { libc::ioctl(fd, ioctl::I2C_SMBUS, &mut args) };
        if r < 0 {
            let errno = last_errno();
            log::debug!(
                "linux_i2c: SMBus {} cmd 0x{:02x} failed (errno {})",
                if read { "read" } else { "write" },
                cmd,
                errno
            );
            return Err(CoreError::Transport(errno));
        }
        if read {
            unsafe {
                let got = data.block[0] as usize;
                let take = got.min(buf.len());
                buf[..take].copy_from_slice(&data.block[1..1 + take]);
            }
        }
        Ok(())
    }

    /// Take a whole-file write lock on the bus device, retrying with
    /// back-off. Released by `unlock_file` or when the process exits.
    fn lock_file(&mut self) -> CoreResult<()> {
        let fd = self.file.as_raw_fd();
        for attempt in 0..LOCK_RETRIES {
            let mut fl = libc::flock {
                l_type: libc::F_WRLCK as libc::c_short,
                l_whence: libc::SEEK_SET as libc::c_short,
                l_start: 0,
                l_len: 0,
                l_pid: 0,
            };
            let r = unsafe { libc::fcntl(fd, libc::F_SETLK, &mut fl) };
            if r == 0 {
                return Ok(());
            }
            if attempt + 1 < LOCK_RETRIES {
                std::thread::sleep(std::time::Duration::from_micros(LOCK_RETRY_DELAY_US));
            }
        }
        log::warn!("linux_i2c: could not lock the bus file");
        Err(CoreError::BusBusy)
    }

    fn unlock_file(&mut self) {
        let fd = self.file.as_raw_fd();
        let mut fl = libc::flock {
            l_type: libc::F_UNLCK as libc::c_short,
            l_whence: libc::SEEK_SET as libc::c_short,
            l_start: 0,
            l_len: 0,
            l_pid: 0,
        };
        unsafe {
            libc::fcntl(fd, libc::F_SETLK, &mut fl);
        }
    }
}

impl Drop for LinuxI2c {
    fn drop(&mut self) {
        if self.locked {
            self.unlock_file();
        }
    }
}

impl SmbusPort for LinuxI2c {
    fn slave_addr(&self) -> u8 {
        self.slave
    }

    fn set_slave(&mut self, addr: u8) -> CoreResult<()> {
        self.latch_slave(addr)?;
        self.slave = addr;
        Ok(())
    }

    fn block_write(&mut self, cmd: u8, data: &[u8]) -> CoreResult<()> {
        if data.is_empty() || data.len() > BLOCK_MAX {
            return Err(CoreError::InvalidArgument);
        }
        let mut copy = [0u8; BLOCK_MAX];
        copy[..data.len()].copy_from_slice(data);
        self.smbus_transfer(false, cmd, &mut copy[..data.len()])
    }

    fn block_read(&mut self, cmd: u8, buf: &mut [u8]) -> CoreResult<()> {
        if buf.is_empty() || buf.len() > BLOCK_MAX {
            return Err(CoreError::InvalidArgument);
        }
        self.smbus_transfer(true, cmd, buf)
    }

    fn lock(&mut self) -> CoreResult<()> {
        if !self.locked {
            self.lock_file()?;
            self.locked = true;
        }
        Ok(())
    }

    fn unlock(&mut self) -> CoreResult<()> {
        if self.locked {
            self.unlock_file();
            self.locked = false;
        }
        Ok(())
    }

    fn delay_us(&mut self, us: u64) {
        std::thread::sleep(std::time::Duration::from_micros(us));
    }
}

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

fn errno_of(e: &CoreError) -> i32 {
    match e {
        CoreError::Transport(errno) => *errno,
        _ => 0,
    }
}
