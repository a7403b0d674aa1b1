//! CLI argument parsing

use clap::{Parser, Subcommand};
use nxflasher_core::{BusType, ALL, PARAM_VERSION};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
pub(crate) fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a bus name ("parallel", "spi") or a raw bus tag
fn parse_bus(s: &str) -> Result<u32, String> {
    match s.to_ascii_lowercase().as_str() {
        "parallel" | "pflash" => Ok(BusType::ParallelFlash.raw()),
        "spi" | "sflash" => Ok(BusType::Spi.raw()),
        _ => parse_hex_u32(s),
    }
}

/// Parse "all" or a hex or decimal id
fn parse_id_or_all(s: &str) -> Result<u32, String> {
    if s.eq_ignore_ascii_case("all") {
        Ok(ALL)
    } else {
        parse_bus(s)
    }
}

#[derive(Parser)]
#[command(name = "nxflasher")]
#[command(author, version, about = "netX bootloader flasher", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Board file (TOML) describing buses, units and emulated devices
    #[arg(short, long, global = true)]
    pub board: Option<PathBuf>,

    /// Device descriptor written by `detect` and read by the other commands
    #[arg(short, long, global = true, default_value = "nxflasher.desc")]
    pub descriptor: PathBuf,

    /// Reject calls whose device descriptor fails validation
    #[arg(long, global = true)]
    pub strict: bool,

    /// Parameter block version to send
    #[arg(long, global = true, value_parser = parse_hex_u32, default_value_t = PARAM_VERSION)]
    pub param_version: u32,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detect a flash device and save its descriptor
    Detect {
        /// Bus to search (parallel, spi or a raw tag)
        #[arg(long, value_parser = parse_bus)]
        bus: u32,

        /// Unit on the bus
        #[arg(short, long, value_parser = parse_hex_u32, default_value = "0")]
        unit: u32,

        /// Chip select on the unit
        #[arg(short, long, value_parser = parse_hex_u32, default_value = "0")]
        chip_select: u32,
    },

    /// Program a file into flash
    Flash {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Start address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32, default_value = "0")]
        start: u32,
    },

    /// Erase an address range
    Erase {
        /// Start address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        start: u32,

        /// End address, exclusive (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        end: u32,
    },

    /// Read an address range to a file
    Read {
        /// Start address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32, default_value = "0")]
        start: u32,

        /// Number of bytes to read (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        length: u32,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Compare flash contents against a file
    Verify {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Start address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32, default_value = "0")]
        start: u32,
    },

    /// Compute the SHA-1 of an address range
    #[cfg(feature = "checksum")]
    Checksum {
        /// Start address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        start: u32,

        /// End address, exclusive (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        end: u32,
    },

    /// Check whether an address range is erased
    IsErased {
        /// Start address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        start: u32,

        /// End address, exclusive (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        end: u32,
    },

    /// Show the erase blocks covering an address range
    EraseArea {
        /// Start address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        start: u32,

        /// End address, exclusive (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        end: u32,
    },

    /// List the board's buses, or the units of one bus
    BoardInfo {
        /// Bus to describe, or "all" for the bus table
        #[arg(long, value_parser = parse_id_or_all, default_value = "all")]
        bus: u32,

        /// Unit to describe, or "all" for the unit table
        #[arg(short, long, value_parser = parse_id_or_all, default_value = "all")]
        unit: u32,

        /// Size of the reply buffer in bytes
        #[arg(long, default_value_t = 4096)]
        capacity: usize,
    },

    /// Send an operation code with no parameters
    Raw {
        /// Operation code (hex or decimal)
        #[arg(value_parser = parse_hex_u32)]
        code: u32,
    },
}
