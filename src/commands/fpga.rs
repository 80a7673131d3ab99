//! FPGA-mediated commands for multi-retimer mainboards

use super::CliError;

use indicatif::{ProgressBar, ProgressStyle};
use rtflash_fpga::bridge::{FpgaBridge, ALL_RETIMERS, RETIMER_COUNT};
use rtflash_fpga::hash::{self, HASH_STAGING_DIR};
use rtflash_fpga::linux::{LinuxFpgaBus, FPGA_SLAVE};
use rtflash_fpga::readiness;
use rtflash_fpga::version::fw_version_from_filename;
use std::path::Path;
use std::time::Duration;

const MODE_UPDATE: u8 = 0;
const MODE_READ: u8 = 1;

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn open_bridge(bus: u32) -> Result<FpgaBridge<LinuxFpgaBus>, CliError> {
    readiness::check_fpga_ready(bus)?;
    let port = LinuxFpgaBus::open(bus, FPGA_SLAVE)?;
    Ok(FpgaBridge::new(port))
}

pub fn run_fpga_update(bus: u32, retimer: u8, image: &Path, mode: u8) -> Result<(), CliError> {
    if retimer > RETIMER_COUNT {
        return Err(CliError::InvalidArgument(format!(
            "retimer index {} out of range (0-7, 8 for all)",
            retimer
        )));
    }
    let mut bridge = open_bridge(bus)?;

    let bytes = std::fs::read(image)?;
    if let Some(version) = image
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(fw_version_from_filename)
    {
        log::info!("image version {}", version);
    }

    match mode {
        MODE_UPDATE => {
            let mask = if retimer >= RETIMER_COUNT {
                ALL_RETIMERS
            } else {
                1 << retimer
            };
            let pb = spinner("Staging image in FPGA DPRAM...");
            bridge.stage_image(&bytes)?;
            pb.set_message("Updating retimer EEPROMs...");
            let result = bridge.trigger_update(mask);
            match &result {
                Ok(()) => pb.finish_with_message("update complete"),
                Err(e) => pb.finish_with_message(format!("update failed: {}", e)),
            }
            result?;
        }
        MODE_READ => {
            if retimer >= RETIMER_COUNT {
                return Err(CliError::InvalidArgument(
                    "read mode addresses a single retimer".into(),
                ));
            }
            let pb = spinner("Clearing FPGA DPRAM...");
            bridge.stage_image(&bytes)?;
            pb.set_message(format!("Reading firmware of retimer {}...", retimer));
            bridge.trigger_read(retimer)?;
            let drained = bridge.drain_image()?;

            let out = image.with_extension("readback");
            std::fs::write(&out, drained.as_slice())?;
            pb.finish_with_message(format!("firmware written to {}", out.display()));
        }
        _ => {
            return Err(CliError::InvalidArgument(format!(
                "mode must be 0 (update) or 1 (read), got {}",
                mode
            )))
        }
    }
    Ok(())
}

pub fn run_fpga_hash(bus: u32, retimer: u8) -> Result<(), CliError> {
    if retimer >= RETIMER_COUNT {
        return Err(CliError::InvalidArgument(format!(
            "retimer index {} out of range",
            retimer
        )));
    }
    std::fs::create_dir_all(HASH_STAGING_DIR)?;
    let mut bridge = open_bridge(bus)?;

    let pb = spinner(&format!("Hashing firmware of retimer {}...", retimer));
    let digest = hash::read_firmware_hash(&mut bridge, retimer)?;
    pb.finish_and_clear();

    println!("{} {}", digest.algorithm, digest.digest);
    Ok(())
}
