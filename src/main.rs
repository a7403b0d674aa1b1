//! nxflasher - Host front end for the netX bootloader flasher
//!
//! Drives the flasher's command dispatcher against emulated parallel and
//! SPI flash devices described by a board file. Every invocation is one
//! dispatcher call, the same as one entry from the bootloader:
//!
//! - `detect` queries a bus and saves the device descriptor to a file
//! - the other device commands load that descriptor and pass it along
//! - `board-info` lists the buses and units the board reports
//!
//! Devices with a backing image are loaded from and written back to disk, so
//! a sequence of invocations behaves like a session with a real board.

mod cli;
mod commands;
mod config;
mod session;

use clap::Parser;
use cli::{Cli, Commands};
use config::BoardConfig;
use nxflasher_core::DescriptorPolicy;
use session::Session;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config = match &cli.board {
        Some(path) => BoardConfig::from_file(path)?,
        None => BoardConfig::default(),
    };
    log::debug!(
        "Board '{}' with {} device(s)",
        config.name,
        config.devices.len()
    );

    let policy = if cli.strict {
        DescriptorPolicy::Strict
    } else {
        DescriptorPolicy::Permissive
    };
    let mut session = Session::open(config)?
        .with_policy(policy)
        .with_param_version(cli.param_version);

    // Every command but detect works on the saved device
    let descriptor = match cli.command {
        Commands::Detect { .. } | Commands::BoardInfo { .. } | Commands::Raw { .. } => None,
        _ => session::load_descriptor(&cli.descriptor)?,
    };
    let device = descriptor.as_ref();

    match cli.command {
        Commands::Detect {
            bus,
            unit,
            chip_select,
        } => commands::run_detect(&mut session, &cli.descriptor, bus, unit, chip_select),
        Commands::Flash { input, start } => {
            commands::run_flash(&mut session, device, &input, start)
        }
        Commands::Erase { start, end } => commands::run_erase(&mut session, device, start, end),
        Commands::Read {
            start,
            length,
            output,
        } => commands::run_read(&mut session, device, start, length, &output),
        Commands::Verify { input, start } => {
            commands::run_verify(&mut session, device, &input, start)
        }
        #[cfg(feature = "checksum")]
        Commands::Checksum { start, end } => {
            commands::run_checksum(&mut session, device, start, end)
        }
        Commands::IsErased { start, end } => {
            commands::run_is_erased(&mut session, device, start, end)
        }
        Commands::EraseArea { start, end } => {
            commands::run_erase_area(&mut session, device, start, end)
        }
        Commands::BoardInfo {
            bus,
            unit,
            capacity,
        } => commands::run_board_info(&mut session, bus, unit, capacity),
        Commands::Raw { code } => commands::run_raw(&mut session, code),
    }
}
