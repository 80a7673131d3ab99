//! Command implementations

pub mod device;
pub mod fpga;

use thiserror::Error;

/// Top-level command error, carrying the process exit code policy
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] rtflash_core::Error),

    #[error(transparent)]
    Port(#[from] rtflash_linux_i2c::LinuxI2cError),

    #[error(transparent)]
    Fpga(#[from] rtflash_fpga::FpgaError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code: 0 success, 100-110 argument errors, 110-120
    /// transport errors, 200-499 per-retimer verify errors, 0xFF generic
    pub fn exit_code(&self) -> i32 {
        use rtflash_core::Error as Core;
        match self {
            Self::InvalidArgument(_) => 100,
            Self::Io(_) => 105,
            Self::Port(_) => 109,
            Self::Fpga(e) => e.exit_code(),
            Self::Core(e) => match e {
                Core::InvalidArgument => 100,
                Core::HexParse { .. } | Core::BinaryReadUnderflow { .. } => 106,
                Core::Io(_) => 105,
                Core::BusBusy => 109,
                Core::Transport(_) | Core::ArpUnsuccessful => 110,
                _ => 0xFF,
            },
        }
    }
}
