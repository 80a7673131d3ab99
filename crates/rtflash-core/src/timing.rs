//! Pacing constants for hardware operations
//!
//! All delays are routed through `SmbusPort::delay_us` so tests can run
//! without wall-clock sleeps.

/// Settle time after toggling a reset register
pub const RESET_SETTLE_US: u64 = 2_000;

/// EEPROM page-program time honored after each 16-byte burst
pub const DATA_BLOCK_PROGRAM_US: u64 = 5_000;

/// Program time honored after a single-byte rewrite
pub const BYTE_PROGRAM_US: u64 = 5_000;

/// Interval between polls of a micro-assist command register
pub const MM_STATUS_POLL_US: u64 = 100;

/// Poll attempts before a micro-assist command is declared stuck
pub const MM_STATUS_POLL_TRIES: u32 = 30;

/// Wait after issuing an assisted read before the first status poll
pub const MM_READ_CMD_WAIT_US: u64 = 500;

/// Poll attempts for an assisted continuous read (data is usually ready)
pub const MM_READ_CONT_TRIES: u32 = 3;

/// Wait after requesting a bank checksum before the first status poll
pub const MM_CHECKSUM_WAIT_US: u64 = 2_000_000;

/// Interval between polls of a bank-checksum command
pub const MM_CHECKSUM_POLL_US: u64 = 100_000;

/// Poll attempts before a bank-checksum command is declared stuck
pub const MM_CHECKSUM_POLL_TRIES: u32 = 100;

/// Hold time between latching and clearing the master command register
/// during a byte receive
pub const MST_CMD_HOLD_US: u64 = 100;

/// Half-period of a bit-banged SCL pulse during bus soft reset
pub const BB_SCL_HALF_PERIOD_US: u64 = 5;
