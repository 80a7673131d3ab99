//! Error types for Linux I2C operations

use thiserror::Error;

/// Linux i2c-dev specific errors
#[derive(Debug, Error)]
pub enum LinuxI2cError {
    /// Failed to open device
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to latch the slave address
    #[error("Failed to set slave address to 0x{addr:02x}: {source}")]
    SetSlaveFailed {
        addr: u8,
        #[source]
        source: std::io::Error,
    },

    /// Could not take the advisory lock on the bus file
    #[error("Bus is busy: could not lock the device file")]
    BusBusy,

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for Linux I2C operations
pub type Result<T> = std::result::Result<T, LinuxI2cError>;
