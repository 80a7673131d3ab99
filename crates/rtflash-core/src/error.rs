//! Error types for rtflash-core

use core::fmt;

/// Core error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Transport errors
    /// The underlying SMBus block operation failed; carries the OS errno
    Transport(i32),
    /// The bus lock could not be acquired within the retry budget
    BusBusy,
    /// Address-resolution fallback did not produce a responding device
    ArpUnsuccessful,

    // Input errors
    /// File I/O failure while loading an image; carries the OS errno
    Io(i32),
    /// Out-of-range or inconsistent argument
    InvalidArgument,
    /// Malformed Intel HEX input; line and byte position are 1-based
    HexParse { line: usize, position: usize },
    /// Raw binary image shorter than the full EEPROM size
    BinaryReadUnderflow { got: usize },

    // On-die micro errors
    /// A micro did not clear its command register within the retry budget
    MicroBusy,

    // EEPROM operation errors
    /// The write path could not proceed
    EepromWrite,
    /// One or more bytes or bank checksums mismatched after recovery
    EepromVerify,
    /// Block-CRC audit found a differing number of blocks
    EepromCrcBlockNum,
    /// Block-CRC audit found a differing CRC byte
    EepromCrcByte,

    // Link configuration
    /// Requested start lane has no link in the current bifurcation mode
    LinkConfigInvalid,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(errno) => write!(f, "SMBus transfer failed (errno {})", errno),
            Self::BusBusy => write!(f, "could not acquire bus lock"),
            Self::ArpUnsuccessful => write!(f, "address resolution failed"),
            Self::Io(errno) => write!(f, "file I/O failed (errno {})", errno),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::HexParse { line, position } => {
                write!(f, "HEX parse error at line {}, position {}", line, position)
            }
            Self::BinaryReadUnderflow { got } => write!(
                f,
                "binary image too short: got {} bytes, expected {}",
                got,
                crate::image::EEPROM_SIZE
            ),
            Self::MicroBusy => write!(f, "on-die micro busy: command did not complete"),
            Self::EepromWrite => write!(f, "EEPROM write could not proceed"),
            Self::EepromVerify => write!(f, "EEPROM verify failed: data mismatch"),
            Self::EepromCrcBlockNum => write!(f, "EEPROM block CRC audit: block count mismatch"),
            Self::EepromCrcByte => write!(f, "EEPROM block CRC audit: CRC byte mismatch"),
            Self::LinkConfigInvalid => {
                write!(f, "start lane does not map to a link in this bifurcation")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
