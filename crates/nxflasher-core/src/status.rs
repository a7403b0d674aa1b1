//! Status indicator and platform hooks
//!
//! The board's ready/run LED is the only result an operator without a
//! console can see. The dispatcher drives it through [`StatusIndicator`],
//! which the caller passes in explicitly.

use crate::error::Result;

/// Externally visible call state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSignal {
    /// Work in progress
    Off,
    /// Last operation succeeded
    Green,
    /// Last operation failed
    Red,
}

/// Hardware that displays a [`StatusSignal`]
pub trait StatusIndicator {
    /// Show `signal`
    fn set(&mut self, signal: StatusSignal);
}

/// Board bring-up run before every call
pub trait Platform {
    /// Initialize clocks, pins and console
    fn init(&mut self) -> Result<()>;
}
