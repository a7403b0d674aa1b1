//! nxflasher-emu - In-memory flash emulator back ends
//!
//! This crate provides a flash back end that emulates a parallel NOR or SPI
//! flash device in memory, plus stand-ins for the board hooks. It's useful
//! for testing the dispatcher and for driving it from the host without real
//! hardware.

mod board;
mod flash;

pub use board::{EmuPlatform, LedLog};
pub use flash::{EmuConfig, EmulatedFlash, Faults};
