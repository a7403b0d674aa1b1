//! nxflasher-core - Command dispatcher for a bootloader-resident flasher
//!
//! The host loader hands the flasher a single versioned parameter block.
//! This crate validates that block, checks the device descriptor the host
//! carries between calls, and routes each operation to the back end that
//! drives the addressed memory technology (parallel NOR or SPI flash).
//!
//! The hardware I/O itself lives behind the [`FlashBackend`] trait; the
//! dispatcher only owns validation, routing and the success/failure
//! protocol. It is `no_std` so it can run inside the bootloader.
//!
//! # Features
//!
//! - `checksum` - SHA-1 checksum operation (enabled by default)
//! - `std` - `std::error::Error` implementations
//!
//! # Example
//!
//! ```ignore
//! use nxflasher_core::{BusRouter, BusType, Board, Dispatcher};
//! use nxflasher_core::params::{ConsoleParams, InputParameters, Operation};
//!
//! let mut router = BusRouter::new();
//! router.register(BusType::Spi, &mut spi_backend);
//!
//! let mut dispatcher = Dispatcher::new(router, Board::default());
//! let mut params = InputParameters::new(Operation::Detect(detect));
//! let mut console = ConsoleParams::new(&mut params);
//! dispatcher.run(&mut platform, &mut led, &mut console)?;
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "std")]
extern crate std;

pub mod backend;
#[cfg(feature = "checksum")]
pub mod checksum;
pub mod device;
pub mod dispatcher;
pub mod error;
mod handlers;
pub mod params;
pub mod status;
pub mod units;

#[cfg(test)]
mod testing;

pub use backend::{BusRouter, FlashBackend};
pub use device::{BusType, DescriptorPolicy, DeviceDescription};
pub use dispatcher::Dispatcher;
pub use error::{DescriptorError, Error, Result};
pub use status::{Platform, StatusIndicator, StatusSignal};
pub use units::Board;

/// The only parameter block version this flasher accepts (`0002.0000`)
pub const PARAM_VERSION: u32 = 0x0002_0000;

/// Interface version stamped into every device description
pub const FLASHER_INTERFACE_VERSION: u32 = 0x0003_0000;

/// Sentinel identifier selecting "enumerate all" in board info queries
pub const ALL: u32 = 0xFFFF_FFFF;
