//! Mainboard readiness gate
//!
//! Before any staging traffic, the platform must confirm the FPGA is out
//! of reset and reachable. Two platform variants exist: the host BMC
//! checks a mid-plane CPLD register, the HMC exposes a sentinel file.

use crate::error::{FpgaError, Result};
use crate::linux::LinuxFpgaBus;
use std::path::Path;

/// Bus number the host BMC reaches its FPGA on
pub const HOST_BMC_FPGA_BUS: u32 = 12;
/// Bus number the HMC reaches its FPGA on
pub const HMC_FPGA_BUS: u32 = 3;

/// CPLD location on the host BMC platform
const CPLD_BUS: u32 = 2;
const CPLD_SLAVE: u8 = 0x3C;
const CPLD_GB_OFFSET: u8 = 0x2B;

/// Active-low baseboard-present signal
const GPU_BASE_PRSNT_N_MASK: u8 = 0x01;
/// CPLD-ready flag
const GPU_BASE_CPLD_READY_MASK: u8 = 0x04;

/// Sentinel file whose presence asserts FPGA_READY on the HMC
pub const FPGA_SENTINEL: &str = "/tmp/FPGA_ON";

/// Decode the CPLD status byte: baseboard present (active low) and CPLD
/// ready must both hold
pub fn cpld_reports_ready(status: u8) -> bool {
    status & GPU_BASE_PRSNT_N_MASK == 0 && status & GPU_BASE_CPLD_READY_MASK != 0
}

/// Gate an update on the platform's readiness signal for the FPGA behind
/// `bus_index`
pub fn check_fpga_ready(bus_index: u32) -> Result<()> {
    match bus_index {
        HOST_BMC_FPGA_BUS => {
            let mut cpld = LinuxFpgaBus::open(CPLD_BUS, CPLD_SLAVE)?;
            let mut status = [0u8; 1];
            cpld.transfer(&[CPLD_GB_OFFSET], &mut status)?;
            if cpld_reports_ready(status[0]) {
                log::info!("mid-plane CPLD reports FPGA ready (0x{:02x})", status[0]);
                Ok(())
            } else {
                log::error!("mid-plane CPLD not ready (0x{:02x})", status[0]);
                Err(FpgaError::NotReady)
            }
        }
        HMC_FPGA_BUS => {
            if Path::new(FPGA_SENTINEL).exists() {
                log::info!("HMC FPGA ready");
                Ok(())
            } else {
                log::error!("HMC FPGA not ready: {} absent", FPGA_SENTINEL);
                Err(FpgaError::NotReady)
            }
        }
        _ => Err(FpgaError::NotReady),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpld_ready_needs_present_and_ready_bits() {
        assert!(cpld_reports_ready(0x04));
        assert!(cpld_reports_ready(0x06));
        // baseboard absent
        assert!(!cpld_reports_ready(0x05));
        // CPLD not ready
        assert!(!cpld_reports_ready(0x00));
    }

    #[test]
    fn unknown_bus_is_not_ready() {
        assert!(matches!(check_fpga_ready(7), Err(FpgaError::NotReady)));
    }
}
