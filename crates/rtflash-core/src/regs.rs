//! Register map of the retimer's 17-bit SMBus-visible address space
//!
//! Addresses below 0x1_0000 are hard CSRs; addresses at or above 0x1_0000
//! map into main-micro SRAM. Window register numbers are per product
//! revision and named symbolically here.

/// Global parameters (bifurcation, max data rate), 4 bytes
pub const GLB_PARAM: u32 = 0x000;
/// Vendor/device/revision identification, 4 bytes
pub const DEVICE_ID: u32 = 0x004;

/// Hardware reset, 2 bytes
pub const HW_RST: u32 = 0x600;
/// Software reset, 2 bytes
pub const SW_RST: u32 = 0x602;
/// Per-link PCIe protocol reset, one bit per link
pub const PCIE_LINK_RST: u32 = 0x604;
/// Code-load progress written by the boot ROM
pub const CODE_LOAD: u32 = 0x60C;

/// Maximum observed temperature ADC code, 2 bytes
pub const TEMP_MAX_ADC: u32 = 0x424;
/// Current averaged temperature ADC code, 2 bytes
pub const TEMP_AVG_ADC: u32 = 0x42C;

/// eFuse control, 5 bytes
pub const EFUSE_CTRL: u32 = 0x8EC;
/// eFuse address select
pub const EFUSE_ADDR: u32 = 0x8F6;
/// eFuse data readback
pub const EFUSE_DATA: u32 = 0x8F7;

/// Main-micro SRAM self-check control/status
pub const MM_SRAM_STATUS: u32 = 0x920;
/// Free-running heartbeat counter updated by main-micro firmware
pub const MM_HEARTBEAT: u32 = 0x923;

// On-die I2C master window. The master is a DesignWare-style IP whose CSRs
// are reached by writing the CSR offset to IC_CMD, staging up to four bytes
// in DATA0..DATA3, and latching with CMD.
/// CSR offset selector
pub const I2C_MST_IC_CMD: u32 = 0xD04;
/// Staging data byte 0
pub const I2C_MST_DATA0: u32 = 0xD05;
/// Staging data byte 1
pub const I2C_MST_DATA1: u32 = 0xD06;
/// Staging data byte 2
pub const I2C_MST_DATA2: u32 = 0xD07;
/// Staging data byte 3
pub const I2C_MST_DATA3: u32 = 0xD08;
/// Command latch; writing 1 commits the staged access
pub const I2C_MST_CMD: u32 = 0xD09;
/// Bit-bang override of the SDA/SCL outputs (bit 0 = SCL, bit 1 = SDA)
pub const I2C_MST_BB_OUTPUT: u32 = 0xD0A;
/// Master init control; bit 0 enables bit-bang mode
pub const I2C_MST_INIT_CTRL: u32 = 0xD0B;

// CSR offsets inside the I2C master IP, selected through I2C_MST_IC_CMD.
/// Control register
pub const IC_CON: u8 = 0x00;
/// Target slave address
pub const IC_TAR: u8 = 0x04;
/// Data/command register used for byte-level bus transactions
pub const IC_DATA_CMD: u8 = 0x10;
/// Fast-mode SCL high count
pub const IC_FS_SCL_HCNT: u8 = 0x1C;
/// Fast-mode SCL low count
pub const IC_FS_SCL_LCNT: u8 = 0x20;
/// RX FIFO threshold
pub const IC_RX_TL: u8 = 0x38;
/// TX FIFO threshold
pub const IC_TX_TL: u8 = 0x3C;
/// Master enable
pub const IC_ENABLE: u8 = 0x6C;

// Main-micro indirect window: offset registers, an 8-byte data window and a
// self-clearing command register.
/// Main-micro window: SRAM offset low byte
pub const MM_IND_ADDR_LO: u32 = 0xD20;
/// Main-micro window: SRAM offset high byte
pub const MM_IND_ADDR_HI: u32 = 0xD21;
/// Main-micro window: first of eight data bytes
pub const MM_IND_DATA: u32 = 0xD22;
/// Main-micro window: command register
pub const MM_IND_CMD: u32 = 0xD2A;

/// Base of the path-micro indirect windows; each path micro owns a 16-register
/// stride with the same layout as the main-micro window
pub const PM_IND_BASE: u32 = 0xE00;
/// Register stride between consecutive path-micro windows
pub const PM_IND_STRIDE: u32 = 0x10;

// PMA direct-access window (test mode only).
/// PMA select: (side << 4) | quad-slice
pub const PMA_SEL: u32 = 0xD60;
/// PMA lane select within the quad slice
pub const PMA_LANE: u32 = 0xD61;
/// PMA CSR address low byte
pub const PMA_ADDR_LO: u32 = 0xD62;
/// PMA CSR address high byte
pub const PMA_ADDR_HI: u32 = 0xD63;
/// PMA data low byte
pub const PMA_DATA_LO: u32 = 0xD64;
/// PMA data high byte
pub const PMA_DATA_HI: u32 = 0xD65;
/// PMA command: 1 = read, 2 = write; self-clears
pub const PMA_CMD: u32 = 0xD66;

// Main-micro firmware info block, reached through the micro-indirect window.
/// Base SRAM offset of the firmware info block
pub const MM_FW_INFO: u16 = 0x2180;
/// Offset of the major version byte within the info block
pub const MM_FW_VERSION_MAJOR: u16 = 0;
/// Offset of the minor version byte
pub const MM_FW_VERSION_MINOR: u16 = 1;
/// Offset of the 16-bit build number
pub const MM_FW_VERSION_BUILD: u16 = 2;
/// SRAM offset holding the size of one per-link path state struct,
/// published by firmware 1.1.52 and later
pub const MM_LINK_PATH_STRUCT_SIZE: u16 = 0x2190;

// EEPROM-assist mailbox, SRAM-mapped into the upper half of the register
// space and written with plain block transactions.
/// 16-byte assist data region
pub const MM_EEPROM_ASSIST_DATA: u32 = 0x1_8C00;
/// Assist command register; self-clears when the micro has serviced it
pub const MM_EEPROM_ASSIST_CMD: u32 = 0x1_8C10;

/// Assist command: latch a 16-byte block, more to follow
pub const ASSIST_CMD_WRITE: u8 = 1;
/// Assist command: latch a 16-byte block and end the bus transaction
pub const ASSIST_CMD_WRITE_END: u8 = 2;
/// Assist command: read a 16-byte block and end the bus transaction
pub const ASSIST_CMD_READ: u8 = 3;
/// Assist command: read a 16-byte block, keep the stream open
pub const ASSIST_CMD_READ_CONT: u8 = 4;
/// Assist command: sum all bytes of the current EEPROM bank
pub const ASSIST_CMD_CHECKSUM: u8 = 5;
/// Assist command: sum bytes of the current bank up to a staged end offset
pub const ASSIST_CMD_CHECKSUM_PARTIAL: u8 = 6;
