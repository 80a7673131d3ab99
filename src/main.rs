//! rtflash - PCIe retimer firmware programmer
//!
//! Programs, verifies and introspects retimer EEPROMs over the side-band
//! SMBus channel, directly or through a mainboard FPGA.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.verbose {
        0 => {}
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let result = match cli.command {
        Commands::Probe { device } => commands::device::run_probe(&device),
        Commands::Update {
            device,
            image,
            activate,
        } => commands::device::run_update(&device, &image, activate),
        Commands::Verify { device, image, crc } => {
            commands::device::run_verify(&device, &image, crc)
        }
        Commands::ReadByte { device, address } => {
            commands::device::run_read_byte(&device, address)
        }
        Commands::WriteByte {
            device,
            address,
            value,
        } => commands::device::run_write_byte(&device, address, value),
        Commands::FpgaUpdate {
            bus,
            retimer,
            image,
            mode,
        } => commands::fpga::run_fpga_update(bus, retimer, &image, mode),
        Commands::FpgaHash { bus, retimer } => commands::fpga::run_fpga_hash(bus, retimer),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}
