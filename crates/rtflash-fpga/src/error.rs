//! Error types for the FPGA-mediated update path

use thiserror::Error;

/// Errors of the FPGA staging and sequencing protocol
#[derive(Debug, Error)]
pub enum FpgaError {
    /// The mainboard readiness gate failed
    #[error("FPGA is not ready for firmware update")]
    NotReady,

    /// Bus or device-file failure
    #[error("I2C transfer failed: {0}")]
    Io(#[source] std::io::Error),

    /// The FPGA did not signal completion within the poll budget
    #[error("timed out waiting for the FPGA to complete")]
    Timeout,

    /// One or more retimers NACKed the EEPROM write
    #[error("write NACK from retimer(s) 0x{0:02x}")]
    WriteNack(u8),

    /// One or more retimers NACKed the EEPROM read-back
    #[error("read NACK from retimer(s) 0x{0:02x}")]
    ReadNack(u8),

    /// Post-write checksum mismatch on one or more retimers
    #[error("checksum failure on retimer(s) 0x{0:02x}")]
    Checksum(u8),

    /// Invalid staging input
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Image loading or core driver failure
    #[error(transparent)]
    Core(#[from] rtflash_core::Error),
}

impl FpgaError {
    /// Process exit code for the CLI front-end. Verify errors partition
    /// per class and retimer: 200-299 write NACK, 300-399 checksum,
    /// 400-499 read NACK.
    pub fn exit_code(&self) -> i32 {
        fn retimer_offset(mask: u8) -> i32 {
            if mask == 0xFF || mask.count_ones() > 1 {
                8
            } else {
                mask.trailing_zeros() as i32
            }
        }
        match self {
            Self::WriteNack(mask) => 200 + retimer_offset(*mask),
            Self::Checksum(mask) => 300 + retimer_offset(*mask),
            Self::ReadNack(mask) => 400 + retimer_offset(*mask),
            Self::NotReady => 117,
            Self::Io(_) => 110,
            Self::InvalidArgument(_) => 100,
            Self::Timeout | Self::Core(_) => 0xFF,
        }
    }
}

/// Result type for FPGA operations
pub type Result<T> = std::result::Result<T, FpgaError>;
